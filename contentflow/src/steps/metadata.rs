//! `build-metadata`: title tag and meta description.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::context::{StepContext, StepOutput};
use super::types::{DraftedArticle, ThemeReport};
use super::{json_chain, title_case, Step, BUILD_METADATA, DRAFT_SECTIONS, EXTRACT_THEMES};
use crate::core::SeoMetadata;
use crate::errors::StepError;
use crate::providers::{CompletionRequest, LanguageModel};
use crate::resilience::FallbackPolicy;

/// Model calls before the last reply is normalized as-is.
pub const MAX_METADATA_ATTEMPTS: u32 = 3;

const TITLE_MIN: usize = 50;
const TITLE_MAX: usize = 60;
const DESCRIPTION_MIN: usize = 150;
const DESCRIPTION_MAX: usize = 160;

const TITLE_SUFFIXES: [&str; 3] = [" | Practical Guide", " Guide", " Tips"];
const DESCRIPTION_PADDING: &str = " Practical insights for better decisions.";
const DESCRIPTION_FILLERS: [&str; 3] = [" Learn more.", " Explore options.", " Read now."];

const SYSTEM_PROMPT: &str = "You are an SEO expert. Generate compelling, keyword-optimized \
metadata. Return valid JSON matching the specified schema. Be precise with character limits.";

#[derive(Debug, Clone, Deserialize)]
struct MetadataReply {
    title_tag: String,
    meta_description: String,
    #[serde(default)]
    primary_keyword: String,
    #[serde(default)]
    secondary_keywords: Vec<String>,
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn trim_separators(text: &str) -> &str {
    text.trim_end_matches([' ', ',', ';', ':', '-'])
}

fn trim_terminal(text: &str) -> &str {
    text.trim_end_matches(['.', '!', '?'])
}

/// Clamps a title to 50-60 characters.
///
/// Long titles are cut at 60 characters; short ones gain a suffix when
/// one fits.
#[must_use]
pub fn normalize_title(raw: &str) -> String {
    let mut title = collapse_whitespace(raw);
    if char_len(&title) > TITLE_MAX {
        title = trim_separators(&truncate_chars(&title, TITLE_MAX)).to_string();
    }
    if char_len(&title) < TITLE_MIN {
        for suffix in TITLE_SUFFIXES {
            if char_len(&title) + char_len(suffix) <= TITLE_MAX {
                title.push_str(suffix);
                if char_len(&title) >= TITLE_MIN {
                    break;
                }
            }
        }
    }
    title
}

/// Clamps a meta description to 150-160 characters and makes sure it
/// mentions `primary_keyword` and ends as a sentence.
#[must_use]
pub fn normalize_description(raw: &str, primary_keyword: &str) -> String {
    let mut desc = collapse_whitespace(raw);
    if !desc.to_lowercase().contains(&primary_keyword.to_lowercase()) {
        desc = format!("{primary_keyword}: {desc}");
    }

    if char_len(&desc) > DESCRIPTION_MAX {
        let cut = truncate_chars(&desc, DESCRIPTION_MAX);
        let cut = cut.trim_end();
        let cut = cut.rfind(' ').map_or(cut, |space| &cut[..space]);
        desc = format!("{}.", trim_separators(cut));
    }

    if (DESCRIPTION_MIN - 5..DESCRIPTION_MIN).contains(&char_len(&desc)) {
        for suffix in [" Learn more.", " Get started."] {
            if char_len(&desc) + char_len(suffix) <= DESCRIPTION_MAX {
                desc = format!("{}{suffix}", trim_terminal(&desc));
                break;
            }
        }
    }

    if char_len(&desc) < DESCRIPTION_MIN
        && char_len(&desc) + char_len(DESCRIPTION_PADDING) + 1 <= DESCRIPTION_MAX
    {
        desc = format!("{}.{DESCRIPTION_PADDING}", trim_terminal(&desc));
    }
    if char_len(&desc) < DESCRIPTION_MIN {
        for filler in DESCRIPTION_FILLERS {
            if char_len(&desc) + char_len(filler) <= DESCRIPTION_MAX {
                desc = format!("{}{filler}", trim_terminal(&desc));
            }
            if char_len(&desc) >= DESCRIPTION_MIN {
                break;
            }
        }
    }

    if char_len(&desc) > DESCRIPTION_MAX {
        desc = trim_separators(&truncate_chars(&desc, DESCRIPTION_MAX)).to_string();
    }
    if !desc.is_empty() && !desc.ends_with(['.', '!', '?']) && char_len(&desc) < DESCRIPTION_MAX {
        desc.push('.');
    }
    desc
}

fn substitute_metadata(themes: &ThemeReport) -> MetadataReply {
    let keyword = &themes.primary_keyword;
    MetadataReply {
        title_tag: format!("{}: A Practical Guide for Modern Teams", title_case(keyword)),
        meta_description: format!(
            "Compare {keyword} by features, pricing and rollout effort, with concrete \
             examples and a checklist for choosing the right option for your team."
        ),
        primary_keyword: keyword.clone(),
        secondary_keywords: themes.secondary_keywords.iter().take(5).cloned().collect(),
    }
}

fn within_limits(reply: &MetadataReply) -> bool {
    (TITLE_MIN..=TITLE_MAX).contains(&char_len(reply.title_tag.trim()))
        && (DESCRIPTION_MIN..=DESCRIPTION_MAX).contains(&char_len(reply.meta_description.trim()))
}

/// Generates metadata with a language model and normalizes its lengths.
#[derive(Clone)]
pub struct BuildMetadataStep {
    models: Vec<Arc<dyn LanguageModel>>,
    policy: FallbackPolicy,
}

impl std::fmt::Debug for BuildMetadataStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildMetadataStep")
            .field("models", &self.models.len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl BuildMetadataStep {
    /// Creates the step.
    pub fn new(models: Vec<Arc<dyn LanguageModel>>, policy: FallbackPolicy) -> Self {
        Self { models, policy }
    }

    fn request(topic: &str, themes: &ThemeReport, article: &DraftedArticle) -> CompletionRequest {
        let preview: String = article
            .sections
            .iter()
            .take(3)
            .map(|s| format!("{}\n{}", s.heading_text, s.content.chars().take(300).collect::<String>()))
            .collect::<Vec<_>>()
            .join("\n")
            .chars()
            .take(500)
            .collect();
        let secondary = themes
            .secondary_keywords
            .iter()
            .take(5)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let user_prompt = format!(
            "Generate SEO metadata for an article about '{topic}'.\n\n\
             Primary keyword: {}\nSecondary keywords: {secondary}\n\n\
             Article preview:\n{preview}...\n\n\
             Return JSON: {{\"title_tag\": string (50-60 characters, includes the primary \
             keyword), \"meta_description\": string (150-160 characters, includes the primary \
             keyword), \"primary_keyword\": string, \"secondary_keywords\": [string]}}\n\n\
             CRITICAL: title_tag must be 50-60 characters. meta_description must be 150-160 \
             characters.",
            themes.primary_keyword
        );
        CompletionRequest::new(BUILD_METADATA, SYSTEM_PROMPT, user_prompt)
            .json()
            .with_hint("primary_keyword", themes.primary_keyword.clone())
    }
}

#[async_trait]
impl Step for BuildMetadataStep {
    fn name(&self) -> &str {
        BUILD_METADATA
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        let themes: ThemeReport = ctx.input(EXTRACT_THEMES)?;
        let article: DraftedArticle = ctx.input(DRAFT_SECTIONS)?;
        let mut request = Self::request(&ctx.params().topic, &themes, &article);

        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            let chain = json_chain::<MetadataReply>(&self.models, &request)
                .substitute("template-metadata", || substitute_metadata(&themes));
            let outcome = ctx.policy(&self.policy).execute(chain).await?;
            if outcome.degraded || within_limits(&outcome.value) || attempt >= MAX_METADATA_ATTEMPTS {
                break outcome;
            }

            let title_len = char_len(outcome.value.title_tag.trim());
            let desc_len = char_len(outcome.value.meta_description.trim());
            debug!(attempt, title_len, desc_len, "metadata outside length limits");
            request.amend(&format!(
                "REVISION REQUIRED:\n\
                 - Your title_tag was {title_len} characters: \"{}\". It must be 50-60 \
                   characters while keeping the primary keyword natural.\n\
                 - Your meta_description was {desc_len} characters. It must be 150-160 \
                   characters and include the primary keyword.\n\
                 Count characters carefully before responding.",
                outcome.value.title_tag
            ));
        };

        let reply = &outcome.value;
        let primary_keyword = if reply.primary_keyword.trim().is_empty() {
            themes.primary_keyword.clone()
        } else {
            reply.primary_keyword.trim().to_string()
        };
        let secondary_keywords = if reply.secondary_keywords.is_empty() {
            themes.secondary_keywords.clone()
        } else {
            reply.secondary_keywords.clone()
        };
        let metadata = SeoMetadata {
            title_tag: normalize_title(&reply.title_tag),
            meta_description: normalize_description(&reply.meta_description, &themes.primary_keyword),
            primary_keyword,
            secondary_keywords,
        };

        info!(
            job_id = %ctx.job_id(),
            provider = %outcome.provider,
            attempts = attempt,
            title_len = char_len(&metadata.title_tag),
            description_len = char_len(&metadata.meta_description),
            "metadata built"
        );
        Ok(StepOutput::from_value(&metadata)?
            .with_degraded(outcome.degraded)
            .with_provider(outcome.provider.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArticleSection, HeadingLevel, JobId, JobParams};
    use crate::steps::SearchIntent;
    use crate::testing::FixtureLanguageModel;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_long_title_is_cut() {
        let title = normalize_title(
            "Remote Work Tools: The Complete, Exhaustive, Definitive Guide for Every Team",
        );
        assert!(char_len(&title) <= 60);
        assert!(!title.ends_with(','));
    }

    #[test]
    fn test_short_title_gains_suffix() {
        let title = normalize_title("Remote Work Tools for Distributed Teams");
        assert_eq!(title, "Remote Work Tools for Distributed Teams | Practical Guide");
        assert!((50..=60).contains(&char_len(&title)));
    }

    #[test]
    fn test_title_whitespace_collapsed() {
        assert_eq!(
            normalize_title("  Remote   Work Tools:   What to Buy and How to Roll It Out "),
            "Remote Work Tools: What to Buy and How to Roll It Out"
        );
    }

    #[test]
    fn test_description_keyword_prefixed_and_padded() {
        let desc = normalize_description("Compare the leading options for your team.", "remote work tools");
        assert!(desc.starts_with("remote work tools: "));
        assert!(desc.ends_with('.'));
        assert!(char_len(&desc) <= 160);
    }

    #[test]
    fn test_long_description_cut_at_word() {
        let raw = "Remote work tools ".repeat(12);
        let desc = normalize_description(&raw, "remote work tools");
        assert!((150..=160).contains(&char_len(&desc)), "{desc}");
        assert!(desc.ends_with('.'));
        assert!(!desc.contains("Tool."));
    }

    #[test]
    fn test_near_miss_description_gets_suffix() {
        let raw = format!("Remote work tools {}", "x".repeat(127));
        assert_eq!(char_len(&raw), 145);
        let desc = normalize_description(&raw, "remote work tools");
        assert!(desc.ends_with(" Learn more."));
        assert_eq!(char_len(&desc), 157);
    }

    fn ctx() -> StepContext {
        let themes = ThemeReport {
            primary_keyword: "remote work tools".to_string(),
            secondary_keywords: vec!["video conferencing".to_string()],
            main_subtopics: Vec::new(),
            search_intent: SearchIntent::Informational,
            content_gaps: Vec::new(),
            unique_angles: Vec::new(),
        };
        let article = DraftedArticle {
            sections: vec![ArticleSection {
                heading_level: HeadingLevel::H1,
                heading_text: "Remote Work Tools".to_string(),
                content: "Remote work tools help teams.".to_string(),
                word_count: 5,
            }],
        };
        StepContext::new(JobId::from("j"), JobParams::new("remote work tools"), BUILD_METADATA)
            .with_output(EXTRACT_THEMES, StepOutput::from_value(&themes).unwrap())
            .with_output(DRAFT_SECTIONS, StepOutput::from_value(&article).unwrap())
    }

    #[tokio::test]
    async fn test_model_metadata_within_limits() {
        let model: Arc<dyn LanguageModel> = Arc::new(FixtureLanguageModel::new());
        let step = BuildMetadataStep::new(vec![model], FallbackPolicy::new(BUILD_METADATA));

        let output = step.execute(&ctx()).await.unwrap();
        let metadata: SeoMetadata = output.decode(BUILD_METADATA).unwrap();
        assert!(!output.degraded);
        assert!((50..=60).contains(&char_len(&metadata.title_tag)));
        assert!((150..=160).contains(&char_len(&metadata.meta_description)));
        assert_eq!(metadata.primary_keyword, "remote work tools");
    }

    #[tokio::test]
    async fn test_short_title_is_retried_then_normalized() {
        let model = Arc::new(FixtureLanguageModel::new().with_short_title());
        let dyn_model: Arc<dyn LanguageModel> = model.clone();
        let step = BuildMetadataStep::new(vec![dyn_model], FallbackPolicy::new(BUILD_METADATA));

        step.execute(&ctx()).await.unwrap();
        assert_eq!(model.calls_for(BUILD_METADATA), MAX_METADATA_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn test_no_models_uses_template() {
        let step = BuildMetadataStep::new(Vec::new(), FallbackPolicy::new(BUILD_METADATA));
        let output = step.execute(&ctx()).await.unwrap();
        let metadata: SeoMetadata = output.decode(BUILD_METADATA).unwrap();

        assert!(output.degraded);
        assert_eq!(metadata.title_tag, "Remote Work Tools: A Practical Guide for Modern Teams");
        assert!((150..=160).contains(&char_len(&metadata.meta_description)));
        assert_eq!(metadata.secondary_keywords, vec!["video conferencing".to_string()]);
    }
}
