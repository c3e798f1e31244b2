//! `build-outline`: headings and word budgets.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::context::{StepContext, StepOutput};
use super::draft::INTRO_BUDGET;
use super::types::{ArticleOutline, OutlineSection, ThemeReport};
use super::{json_chain, title_case, Step, BUILD_OUTLINE, EXTRACT_THEMES};
use crate::errors::StepError;
use crate::providers::{CompletionRequest, LanguageModel};
use crate::resilience::FallbackPolicy;

/// Smallest budget any H2 block may have.
pub const MIN_SECTION_BUDGET: usize = 80;

const MAX_SECTIONS: usize = 6;

const SYSTEM_PROMPT: &str = "You are a senior content strategist specialising in \
SEO-optimised article structure. Return valid JSON matching the specified schema.";

/// Asks a model for an outline and forces its budgets to add up.
#[derive(Clone)]
pub struct BuildOutlineStep {
    models: Vec<Arc<dyn LanguageModel>>,
    policy: FallbackPolicy,
}

impl std::fmt::Debug for BuildOutlineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOutlineStep")
            .field("models", &self.models.len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl BuildOutlineStep {
    /// Creates the step.
    pub fn new(models: Vec<Arc<dyn LanguageModel>>, policy: FallbackPolicy) -> Self {
        Self { models, policy }
    }

    fn request(topic: &str, themes: &ThemeReport, target: usize, budget: usize) -> CompletionRequest {
        let subtopics = themes
            .main_subtopics
            .iter()
            .take(5)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let user_prompt = format!(
            "Create an article outline for '{topic}' that:\n\
             - targets these subtopics: {subtopics}\n\
             - uses the primary keyword '{}' in the H1\n\
             - has 4-6 H2 sections with at most 2 H3s each\n\
             - targets {target} words in total\n\n\
             The introduction is written separately and uses {INTRO_BUDGET} words, so the \
             section budgets must sum to exactly {budget}.\n\n\
             Return JSON: {{\"h1\": string, \"sections\": [{{\"h2\": string, \
             \"word_budget\": number, \"h3s\": [string]}}]}}",
            themes.primary_keyword
        );
        CompletionRequest::new(BUILD_OUTLINE, SYSTEM_PROMPT, user_prompt)
            .json()
            .with_hint("primary_keyword", themes.primary_keyword.clone())
            .with_hint("subtopics", themes.main_subtopics.clone())
            .with_hint("section_budget", budget)
    }
}

/// A template outline over the first subtopics.
pub(crate) fn substitute_outline(themes: &ThemeReport, budget: usize) -> ArticleOutline {
    let title = title_case(&themes.primary_keyword);
    let mut headings: Vec<String> = themes.main_subtopics.iter().take(5).cloned().collect();
    for fallback in ["Getting Started", "Choosing the Right Option", "Next Steps"] {
        if headings.len() >= 4 {
            break;
        }
        headings.push(fallback.to_string());
    }

    let per = budget / headings.len();
    let sections = headings
        .into_iter()
        .enumerate()
        .map(|(i, h2)| OutlineSection {
            h3s: if i == 0 {
                vec![format!("How {title} Work"), format!("Who Benefits From {title}")]
            } else {
                Vec::new()
            },
            h2,
            word_budget: per,
        })
        .collect();

    enforce_budget(
        ArticleOutline {
            h1: format!("{title}: A Practical Guide"),
            sections,
        },
        budget,
    )
}

/// Adjusts section budgets so they sum to exactly `target`.
///
/// Budgets are scaled proportionally, rounding drift goes to the largest
/// section, and no section drops below [`MIN_SECTION_BUDGET`] unless the
/// target itself is too small to allow it.
#[must_use]
pub fn enforce_budget(mut outline: ArticleOutline, target: usize) -> ArticleOutline {
    let current = outline.total_budget();
    if current == target || outline.sections.is_empty() {
        return outline;
    }

    if current == 0 {
        let per = target / outline.sections.len();
        for section in &mut outline.sections {
            section.word_budget = per;
        }
    } else {
        let scale = target as f64 / current as f64;
        for section in &mut outline.sections {
            section.word_budget =
                MIN_SECTION_BUDGET.max((section.word_budget as f64 * scale).round() as usize);
        }
    }

    let drift = target as i64 - outline.total_budget() as i64;
    if drift != 0 {
        if let Some(largest) = largest_section(&mut outline.sections) {
            largest.word_budget =
                (MIN_SECTION_BUDGET as i64).max(largest.word_budget as i64 + drift) as usize;
        }
    }

    for section in &mut outline.sections {
        section.word_budget = section.word_budget.max(MIN_SECTION_BUDGET);
    }

    let total = outline.total_budget();
    if total < target {
        if let Some(largest) = largest_section(&mut outline.sections) {
            largest.word_budget += target - total;
        }
    } else if total > target {
        let mut remaining = total - target;
        let mut order: Vec<usize> = (0..outline.sections.len()).collect();
        order.sort_by(|a, b| {
            outline.sections[*b]
                .word_budget
                .cmp(&outline.sections[*a].word_budget)
        });
        for index in order {
            let section = &mut outline.sections[index];
            let delta = section
                .word_budget
                .saturating_sub(MIN_SECTION_BUDGET)
                .min(remaining);
            section.word_budget -= delta;
            remaining -= delta;
            if remaining == 0 {
                break;
            }
        }
    }

    debug!(
        proposed = current,
        adjusted = outline.total_budget(),
        target,
        "outline budget enforced"
    );
    outline
}

fn largest_section(sections: &mut [OutlineSection]) -> Option<&mut OutlineSection> {
    // First of equals, to keep the choice stable.
    let index = sections
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, usize)>, (i, s)| match best {
            Some((_, budget)) if budget >= s.word_budget => best,
            _ => Some((i, s.word_budget)),
        })?
        .0;
    sections.get_mut(index)
}

#[async_trait]
impl Step for BuildOutlineStep {
    fn name(&self) -> &str {
        BUILD_OUTLINE
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        let themes: ThemeReport = ctx.input(EXTRACT_THEMES)?;
        let target = ctx.params().target_word_count as usize;
        let budget = target.saturating_sub(INTRO_BUDGET);
        let request = Self::request(&ctx.params().topic, &themes, target, budget);

        let chain = json_chain::<ArticleOutline>(&self.models, &request)
            .substitute("template-outline", || substitute_outline(&themes, budget));
        let outcome = ctx.policy(&self.policy).execute(chain).await?;

        let mut outline = outcome.value;
        if outline.sections.is_empty() {
            return Err(StepError::retryable("outline has no sections"));
        }
        outline.sections.truncate(MAX_SECTIONS);
        for section in &mut outline.sections {
            section.h3s.truncate(2);
        }
        if outline.h1.trim().is_empty() {
            outline.h1 = title_case(&themes.primary_keyword);
        }
        let outline = enforce_budget(outline, budget);

        info!(
            job_id = %ctx.job_id(),
            provider = %outcome.provider,
            sections = outline.sections.len(),
            budget,
            "outline built"
        );
        Ok(StepOutput::from_value(&outline)?
            .with_degraded(outcome.degraded)
            .with_provider(outcome.provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JobId, JobParams};
    use crate::steps::themes::substitute_themes;
    use crate::steps::types::SearchContext;
    use pretty_assertions::assert_eq;

    fn outline(budgets: &[usize]) -> ArticleOutline {
        ArticleOutline {
            h1: "Title".to_string(),
            sections: budgets
                .iter()
                .enumerate()
                .map(|(i, b)| OutlineSection {
                    h2: format!("Section {i}"),
                    word_budget: *b,
                    h3s: Vec::new(),
                })
                .collect(),
        }
    }

    fn budgets(outline: &ArticleOutline) -> Vec<usize> {
        outline.sections.iter().map(|s| s.word_budget).collect()
    }

    #[test]
    fn test_exact_budget_untouched() {
        let adjusted = enforce_budget(outline(&[300, 300, 300, 400]), 1300);
        assert_eq!(budgets(&adjusted), vec![300, 300, 300, 400]);
    }

    #[test]
    fn test_scales_to_target() {
        let adjusted = enforce_budget(outline(&[400, 400, 400, 400]), 1300);
        assert_eq!(adjusted.total_budget(), 1300);
        assert_eq!(budgets(&adjusted), vec![325, 325, 325, 325]);
    }

    #[test]
    fn test_rounding_drift_goes_to_largest() {
        let adjusted = enforce_budget(outline(&[100, 100, 100]), 1000);
        assert_eq!(budgets(&adjusted), vec![334, 333, 333]);
    }

    #[test]
    fn test_floor_is_respected() {
        let adjusted = enforce_budget(outline(&[10, 1000, 1000]), 1300);
        assert_eq!(adjusted.total_budget(), 1300);
        assert!(adjusted.sections.iter().all(|s| s.word_budget >= MIN_SECTION_BUDGET));
    }

    #[test]
    fn test_zero_budgets_distributed() {
        let adjusted = enforce_budget(outline(&[0, 0, 0, 0]), 1300);
        assert_eq!(adjusted.total_budget(), 1300);
    }

    #[tokio::test]
    async fn test_substitute_outline_when_no_models() {
        let search = SearchContext {
            query: "remote work tools".to_string(),
            results: Vec::new(),
        };
        let themes = substitute_themes("remote work tools", &search);
        let ctx = StepContext::new(
            JobId::from("j"),
            JobParams::new("remote work tools").with_target_word_count(1500),
            BUILD_OUTLINE,
        )
        .with_output(EXTRACT_THEMES, StepOutput::from_value(&themes).unwrap());

        let step = BuildOutlineStep::new(Vec::new(), FallbackPolicy::new(BUILD_OUTLINE));
        let output = step.execute(&ctx).await.unwrap();
        let outline: ArticleOutline = output.decode(BUILD_OUTLINE).unwrap();

        assert!(output.degraded);
        assert_eq!(outline.total_budget(), 1300);
        assert_eq!(outline.sections.len(), 5);
        assert_eq!(outline.sections[0].h3s.len(), 2);
    }
}
