//! `draft-sections`: the article body, one section at a time.
//!
//! Drafting is the only step without a local substitute: if every model
//! fails, the step fails and so does the job. It is also the only step
//! the revision loop re-runs, in which case the context carries a
//! [`RevisionPlan`].

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

use super::context::{StepContext, StepOutput};
use super::types::{ArticleOutline, DraftedArticle, ThemeReport};
use super::{text_chain, Step, BUILD_OUTLINE, DRAFT_SECTIONS, EXTRACT_THEMES};
use crate::core::{ArticleSection, HeadingLevel};
use crate::errors::StepError;
use crate::providers::{CompletionRequest, LanguageModel};
use crate::quality::word_count;
use crate::resilience::FallbackPolicy;
use crate::revision::RevisionPlan;

/// Words reserved for the H1 introduction.
pub const INTRO_BUDGET: usize = 200;

/// Drafts per section before the closest attempt is kept.
pub const MAX_SECTION_ATTEMPTS: u32 = 3;

const MIN_BLOCK_BUDGET: usize = 180;
const MIN_H2_BUDGET: usize = 110;
const MIN_H3_BUDGET: usize = 100;
const MAX_H3_BUDGET: usize = 140;
const MAX_H3_PER_H2: usize = 2;

const GENERIC_ATTRIBUTIONS: [&str; 5] = [
    "industry leaders",
    "experts often",
    "experts say",
    "thought leaders",
    "studies show",
];

const SYSTEM_PROMPT: &str = "You are an expert content writer. Write naturally, never \
robotic or formulaic. Use each secondary keyword at most once or twice per section, vary \
sentence structure, avoid repeating phrases and never write in the first person.";

const SECTION_GUIDANCE: [(&[&str], &str); 7] = [
    (
        &["perspective", "professional", "expert"],
        "Describe how practising professionals use this day to day, in a neutral voice.",
    ),
    (
        &["future", "prediction", "trend"],
        "Focus on developments over the next five years, not what exists today.",
    ),
    (
        &["comparison", "compare", "versus"],
        "Compare named options concretely, with differences, pros and cons.",
    ),
    (
        &["application", "use case", "implementation"],
        "Give specific current examples or scenarios in the present tense.",
    ),
    (
        &["technology", "tool", "system"],
        "Describe specific tools or systems and how they work.",
    ),
    (
        &["guide", "tutorial", "how to"],
        "Give practical step-by-step instructions.",
    ),
    (
        &["challenge", "pitfall", "problem"],
        "Discuss obstacles and limitations honestly.",
    ),
];

#[allow(clippy::expect_used)]
static DATA_POINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d+([.,]\d+)?(%|x|\+)?\b").expect("valid data point regex")
});

/// One section to draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftItem {
    /// Heading text.
    pub heading: String,
    /// Heading level.
    pub level: HeadingLevel,
    /// Planned words.
    pub budget: usize,
    /// The enclosing H2, for H3 items.
    pub parent: Option<String>,
}

/// Allowed deviation from a section budget: 5% or 8 words, whichever is
/// larger.
#[must_use]
pub fn section_tolerance(budget: usize) -> usize {
    (budget * 5 / 100).max(8)
}

/// Expands an outline into per-section budgets.
///
/// Each H2 block keeps its outline budget (at least 180 words). When a
/// block has H3s, they share roughly 40% of it, 100-140 words each, and
/// the H2 paragraph takes the rest.
#[must_use]
pub fn plan_sections(outline: &ArticleOutline, intro_budget: usize) -> Vec<DraftItem> {
    let mut plan = vec![DraftItem {
        heading: outline.h1.clone(),
        level: HeadingLevel::H1,
        budget: intro_budget,
        parent: None,
    }];

    for section in &outline.sections {
        let h3s: Vec<&String> = section.h3s.iter().take(MAX_H3_PER_H2).collect();
        let block = section.word_budget.max(MIN_BLOCK_BUDGET);

        if h3s.is_empty() {
            plan.push(DraftItem {
                heading: section.h2.clone(),
                level: HeadingLevel::H2,
                budget: block,
                parent: None,
            });
            continue;
        }

        let count = h3s.len();
        let tentative = (block * 2 / 5).clamp(MIN_H3_BUDGET * count, MAX_H3_BUDGET * count);
        let h2_budget = block.saturating_sub(tentative).max(MIN_H2_BUDGET);
        let h3_total = block.saturating_sub(h2_budget).max(MIN_H3_BUDGET * count);
        let per_h3 = (h3_total / count).max(MIN_H3_BUDGET);
        let drift = block as i64 - (h2_budget + per_h3 * count) as i64;
        let h2_budget = (h2_budget as i64 + drift).max(1) as usize;

        plan.push(DraftItem {
            heading: section.h2.clone(),
            level: HeadingLevel::H2,
            budget: h2_budget,
            parent: None,
        });
        plan.extend(h3s.into_iter().map(|h3| DraftItem {
            heading: h3.clone(),
            level: HeadingLevel::H3,
            budget: per_h3,
            parent: Some(section.h2.clone()),
        }));
    }
    plan
}

fn has_generic_attribution(content_lower: &str) -> bool {
    GENERIC_ATTRIBUTIONS
        .iter()
        .any(|phrase| content_lower.contains(phrase))
}

fn has_data_point(content: &str) -> bool {
    DATA_POINT.is_match(content)
}

fn section_guidance(heading: &str, parent: &str) -> String {
    let heading_lower = heading.to_lowercase();
    SECTION_GUIDANCE
        .iter()
        .find(|(keys, _)| keys.iter().any(|k| heading_lower.contains(k)))
        .map_or_else(
            || {
                format!(
                    "This H3 '{heading}' sits under '{parent}'. Cover what is specific to \
                     it rather than general information."
                )
            },
            |(_, guidance)| (*guidance).to_string(),
        )
}

fn preview(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

/// Drafts the article with language models.
#[derive(Clone)]
pub struct DraftSectionsStep {
    models: Vec<Arc<dyn LanguageModel>>,
    policy: FallbackPolicy,
}

impl std::fmt::Debug for DraftSectionsStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftSectionsStep")
            .field("models", &self.models.len())
            .field("policy", &self.policy)
            .finish()
    }
}

struct SectionRequest<'a> {
    topic: &'a str,
    item: &'a DraftItem,
    budget: usize,
    primary_keyword: &'a str,
    keywords: &'a [String],
    drafted: &'a [ArticleSection],
    revision: Option<&'a RevisionPlan>,
    previous: Option<&'a ArticleSection>,
}

impl DraftSectionsStep {
    /// Creates the step.
    pub fn new(models: Vec<Arc<dyn LanguageModel>>, policy: FallbackPolicy) -> Self {
        Self { models, policy }
    }

    fn request(section: &SectionRequest<'_>) -> CompletionRequest {
        let item = section.item;
        let budget = section.budget;
        let mut keyword_line = format!(
            "Primary keyword: {} (use naturally, 1-2 times).",
            section.primary_keyword
        );
        if !section.keywords.is_empty() {
            keyword_line.push_str(&format!(
                " Secondary keywords (each at most once): {}.",
                section.keywords.join(", ")
            ));
        }

        let mut user_prompt = format!(
            "Write the '{}' section of an article about '{}'.\n\n\
             Target {budget} words, within ±{} words.\n\n{keyword_line}\n\n\
             Avoid filler openings, keyword stuffing and vague attributions such as \
             \"experts say\". Support claims with a named tool, example or specific number. \
             Return only the section text, without the heading.",
            item.heading,
            section.topic,
            section_tolerance(budget)
        );
        if let Some(parent) = &item.parent {
            user_prompt.push_str("\n\n");
            user_prompt.push_str(&section_guidance(&item.heading, parent));
        }
        if !section.drafted.is_empty() {
            user_prompt.push_str("\n\nPrevious sections (do not repeat them):");
            for prior in section.drafted.iter().rev().take(2).rev() {
                user_prompt.push_str(&format!(
                    "\n{}\n{}...",
                    prior.heading_text,
                    preview(&prior.content, 150)
                ));
            }
        }

        let mut avoid_phrases = Vec::new();
        let mut revision_attempt = 0;
        if let Some(plan) = section.revision {
            user_prompt.push_str("\n\n");
            user_prompt.push_str(&plan.prompt_block());
            if let Some(previous) = section.previous {
                user_prompt.push_str(&format!(
                    "\n\nPrevious version of this section:\n{}...",
                    preview(&previous.content, 300)
                ));
            }
            avoid_phrases.clone_from(&plan.avoid_phrases);
            revision_attempt = plan.attempt;
        }

        CompletionRequest::new(DRAFT_SECTIONS, SYSTEM_PROMPT, user_prompt)
            .with_hint("heading", item.heading.clone())
            .with_hint("level", item.level.to_string())
            .with_hint("budget", budget)
            .with_hint("primary_keyword", section.primary_keyword)
            .with_hint("keywords", section.keywords.to_vec())
            .with_hint("avoid_phrases", avoid_phrases)
            .with_hint("revision", revision_attempt)
    }

    async fn draft_section(
        &self,
        policy: &FallbackPolicy,
        section: &SectionRequest<'_>,
    ) -> Result<ArticleSection, StepError> {
        let item = section.item;
        let budget = section.budget;
        let tolerance = section_tolerance(budget);
        let mut request = Self::request(section);
        let mut content = String::new();
        let mut words = 0;

        for attempt in 1..=MAX_SECTION_ATTEMPTS {
            let outcome = policy.execute(text_chain(&self.models, &request)).await?;
            content = outcome.value.trim().to_string();
            words = word_count(&content);

            let lower = content.to_lowercase();
            let generic = has_generic_attribution(&lower);
            let missing_data = item.level == HeadingLevel::H2 && !has_data_point(&content);
            if words.abs_diff(budget) <= tolerance && !generic && !missing_data {
                break;
            }

            debug!(
                heading = %item.heading,
                attempt,
                words,
                budget,
                generic,
                missing_data,
                "section outside constraints"
            );
            if attempt == MAX_SECTION_ATTEMPTS {
                break;
            }
            let direction = if words > budget { "exceeds" } else { "is below" };
            request.amend(&format!(
                "IMPORTANT: Your previous attempt was {words} words, which {direction} the \
                 {budget} target. Revise to {budget} words within ±{tolerance} words."
            ));
            if generic {
                request.amend(
                    "IMPORTANT: Remove vague attributions such as 'experts say' unless you \
                     name the source.",
                );
            }
            if missing_data {
                request.amend(
                    "IMPORTANT: Add at least one concrete data point (price, percentage, \
                     count or timeline).",
                );
            }
        }

        Ok(ArticleSection {
            heading_level: item.level,
            heading_text: item.heading.clone(),
            content,
            word_count: words,
        })
    }
}

#[async_trait]
impl Step for DraftSectionsStep {
    fn name(&self) -> &str {
        DRAFT_SECTIONS
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        let themes: ThemeReport = ctx.input(EXTRACT_THEMES)?;
        let outline: ArticleOutline = ctx.input(BUILD_OUTLINE)?;
        let revision = ctx.revision();
        let policy = ctx.policy(&self.policy);

        let mut plan = plan_sections(&outline, INTRO_BUDGET);
        if let Some(revision) = revision {
            for item in &mut plan {
                item.budget = revision.scale_budget(item.budget);
            }
        }

        let mut rotation: Vec<String> = revision
            .map(|r| r.include_keywords.clone())
            .unwrap_or_default();
        for keyword in &themes.secondary_keywords {
            if !rotation.iter().any(|k| k.eq_ignore_ascii_case(keyword)) {
                rotation.push(keyword.clone());
            }
        }
        let keyword_limit = revision
            .and_then(|r| r.keyword_limit)
            .map_or(usize::MAX, |limit| limit as usize);

        let mut remaining = plan.iter().map(|item| item.budget).sum::<usize>() as i64;
        let mut used: HashSet<String> = HashSet::new();
        let mut sections: Vec<ArticleSection> = Vec::with_capacity(plan.len());

        for (index, item) in plan.iter().enumerate() {
            let items_left = (plan.len() - index) as i64;
            let floor = if item.level == HeadingLevel::H1 { 120 } else { 80 };
            let max_allowed = remaining - (items_left - 1) * 80;
            let budget = (item.budget as i64).min(max_allowed).max(floor) as usize;

            let mut available: Vec<String> = rotation
                .iter()
                .filter(|k| !used.contains(&k.to_lowercase()))
                .cloned()
                .collect();
            if available.is_empty() {
                available.clone_from(&rotation);
                used.clear();
            }
            let take = if item.level == HeadingLevel::H1 { 2 } else { 3 };
            available.truncate(take.min(keyword_limit));

            let previous = ctx
                .previous_sections()
                .iter()
                .find(|s| s.heading_text == item.heading);
            let section = self
                .draft_section(&policy, &SectionRequest {
                    topic: &ctx.params().topic,
                    item,
                    budget,
                    primary_keyword: &themes.primary_keyword,
                    keywords: &available,
                    drafted: &sections,
                    revision,
                    previous,
                })
                .await?;

            remaining -= section.word_count as i64;
            used.extend(available.iter().map(|k| k.to_lowercase()));
            sections.push(section);
        }

        let article = DraftedArticle { sections };
        info!(
            job_id = %ctx.job_id(),
            sections = article.sections.len(),
            words = article.word_count(),
            revision = revision.map_or(0, |r| r.attempt),
            "article drafted"
        );
        StepOutput::from_value(&article)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JobId, JobParams};
    use crate::errors::ProviderError;
    use crate::steps::types::OutlineSection;
    use crate::testing::FixtureLanguageModel;
    use pretty_assertions::assert_eq;

    fn outline() -> ArticleOutline {
        ArticleOutline {
            h1: "Remote Work Tools: A Practical Guide".to_string(),
            sections: vec![
                OutlineSection {
                    h2: "Video Conferencing".to_string(),
                    word_budget: 400,
                    h3s: vec!["Recording Tools".to_string(), "Future Trends".to_string()],
                },
                OutlineSection {
                    h2: "Project Tracking".to_string(),
                    word_budget: 300,
                    h3s: Vec::new(),
                },
                OutlineSection {
                    h2: "Security".to_string(),
                    word_budget: 100,
                    h3s: Vec::new(),
                },
            ],
        }
    }

    fn themes() -> ThemeReport {
        ThemeReport {
            primary_keyword: "remote work tools".to_string(),
            secondary_keywords: vec![
                "video conferencing".to_string(),
                "project tracking".to_string(),
                "async communication".to_string(),
            ],
            main_subtopics: Vec::new(),
            search_intent: crate::steps::SearchIntent::Informational,
            content_gaps: Vec::new(),
            unique_angles: Vec::new(),
        }
    }

    fn ctx() -> StepContext {
        StepContext::new(JobId::from("j"), JobParams::new("remote work tools"), DRAFT_SECTIONS)
            .with_output(EXTRACT_THEMES, StepOutput::from_value(&themes()).unwrap())
            .with_output(BUILD_OUTLINE, StepOutput::from_value(&outline()).unwrap())
    }

    fn budgets(plan: &[DraftItem]) -> Vec<(HeadingLevel, usize)> {
        plan.iter().map(|i| (i.level, i.budget)).collect()
    }

    #[test]
    fn test_plan_splits_blocks_with_h3s() {
        let plan = plan_sections(&outline(), INTRO_BUDGET);
        assert_eq!(
            budgets(&plan),
            vec![
                (HeadingLevel::H1, 200),
                (HeadingLevel::H2, 200),
                (HeadingLevel::H3, 100),
                (HeadingLevel::H3, 100),
                (HeadingLevel::H2, 300),
                (HeadingLevel::H2, 180),
            ]
        );
        assert_eq!(plan[2].parent.as_deref(), Some("Video Conferencing"));
    }

    #[test]
    fn test_tolerance() {
        assert_eq!(section_tolerance(100), 8);
        assert_eq!(section_tolerance(400), 20);
    }

    #[test]
    fn test_section_guidance_matches_heading() {
        assert!(section_guidance("Future Trends", "Video").contains("five years"));
        assert!(section_guidance("Odd Heading", "Video").contains("sits under 'Video'"));
    }

    #[tokio::test]
    async fn test_drafts_every_planned_section_on_budget() {
        let model: Arc<dyn LanguageModel> = Arc::new(FixtureLanguageModel::new());
        let step = DraftSectionsStep::new(vec![model], FallbackPolicy::new(DRAFT_SECTIONS));

        let output = step.execute(&ctx()).await.unwrap();
        let article: DraftedArticle = output.decode(DRAFT_SECTIONS).unwrap();

        assert_eq!(article.sections.len(), 6);
        assert_eq!(article.sections[0].heading_level, HeadingLevel::H1);
        assert_eq!(article.word_count(), 1080);
        for section in &article.sections {
            assert_eq!(section.word_count, word_count(&section.content));
        }
    }

    #[tokio::test]
    async fn test_off_budget_sections_are_retried_then_kept() {
        let model = Arc::new(FixtureLanguageModel::new().with_length_factor(1.5));
        let dyn_model: Arc<dyn LanguageModel> = model.clone();
        let step = DraftSectionsStep::new(vec![dyn_model], FallbackPolicy::new(DRAFT_SECTIONS));

        let output = step.execute(&ctx()).await.unwrap();
        let article: DraftedArticle = output.decode(DRAFT_SECTIONS).unwrap();

        assert_eq!(model.calls_for(DRAFT_SECTIONS), 6 * MAX_SECTION_ATTEMPTS as usize);
        assert_eq!(article.sections[0].word_count, 300);
    }

    #[tokio::test]
    async fn test_revision_scales_budgets() {
        let model: Arc<dyn LanguageModel> = Arc::new(FixtureLanguageModel::new());
        let step = DraftSectionsStep::new(vec![model], FallbackPolicy::new(DRAFT_SECTIONS));
        let plan = RevisionPlan {
            attempt: 1,
            length_scale: Some(0.5),
            ..RevisionPlan::default()
        };

        let output = step.execute(&ctx().with_revision(plan, Vec::new())).await.unwrap();
        let article: DraftedArticle = output.decode(DRAFT_SECTIONS).unwrap();
        // H1 holds its 120-word floor; later sections shrink to fit what is left.
        assert_eq!(article.sections[0].word_count, 120);
        assert_eq!(article.sections[1].word_count, 100);
        assert_eq!(article.sections[4].word_count, 80);
    }

    #[tokio::test]
    async fn test_model_failure_fails_step() {
        let model: Arc<dyn LanguageModel> = Arc::new(
            FixtureLanguageModel::new().failing_task(DRAFT_SECTIONS, ProviderError::auth("revoked")),
        );
        let step = DraftSectionsStep::new(vec![model], FallbackPolicy::new(DRAFT_SECTIONS));

        let err = step.execute(&ctx()).await.unwrap_err();
        assert!(matches!(err, StepError::Exhausted { ref operation, .. } if operation == DRAFT_SECTIONS));
        assert!(!err.is_retryable());
    }
}
