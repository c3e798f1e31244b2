//! `extract-themes`: keywords, subtopics and intent from search results.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::context::{StepContext, StepOutput};
use super::types::{SearchContext, SearchIntent, ThemeReport};
use super::{json_chain, title_case, Step, EXTRACT_THEMES, FETCH_CONTEXT};
use crate::errors::StepError;
use crate::providers::{CompletionRequest, LanguageModel};
use crate::resilience::FallbackPolicy;

const SYSTEM_PROMPT: &str = "You are an SEO strategist. Analyze search result data and \
extract content themes. Return valid JSON matching the specified schema.";

/// Extracts a theme report with a language model, falling back to one
/// derived from the topic alone.
#[derive(Clone)]
pub struct ExtractThemesStep {
    models: Vec<Arc<dyn LanguageModel>>,
    policy: FallbackPolicy,
}

impl std::fmt::Debug for ExtractThemesStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractThemesStep")
            .field("models", &self.models.len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl ExtractThemesStep {
    /// Creates the step.
    pub fn new(models: Vec<Arc<dyn LanguageModel>>, policy: FallbackPolicy) -> Self {
        Self { models, policy }
    }

    fn request(topic: &str, search: &SearchContext) -> CompletionRequest {
        let results = serde_json::to_string_pretty(&search.results).unwrap_or_default();
        let user_prompt = format!(
            "Given these top search results for '{topic}':\n\n{results}\n\n\
             Return JSON with:\n\
             - primary_keyword: string\n\
             - secondary_keywords: string[] (8-12 queries people actually type, not \
               generic labels such as \"expert insights\")\n\
             - main_subtopics: string[] (5-8 recurring themes)\n\
             - search_intent: informational | commercial | transactional | navigational\n\
             - content_gaps: string[]\n\
             - unique_angles: string[] (3-5 actionable angles competitors rarely cover)"
        );
        CompletionRequest::new(EXTRACT_THEMES, SYSTEM_PROMPT, user_prompt)
            .json()
            .with_hint("topic", topic)
    }
}

/// A theme report built from the topic and result titles only.
pub(crate) fn substitute_themes(topic: &str, search: &SearchContext) -> ThemeReport {
    let topic = topic.trim().to_lowercase();
    let title = title_case(&topic);
    let mut secondary_keywords = vec![
        format!("best {topic}"),
        format!("{topic} pricing"),
        format!("{topic} for small teams"),
        format!("{topic} comparison"),
        format!("{topic} alternatives"),
        format!("free {topic}"),
        format!("{topic} security"),
        format!("how to choose {topic}"),
    ];
    secondary_keywords.dedup();

    let mut main_subtopics = vec![
        format!("What {title} Cover"),
        "Key Features to Compare".to_string(),
        "Pricing and Plans".to_string(),
        format!("Rolling Out {title}"),
        "Common Pitfalls".to_string(),
    ];
    if let Some(first) = search.results.first() {
        main_subtopics.push(first.title.clone());
    }

    ThemeReport {
        primary_keyword: topic,
        secondary_keywords,
        main_subtopics,
        search_intent: SearchIntent::Informational,
        content_gaps: vec![
            "cost of switching".to_string(),
            "measuring adoption".to_string(),
        ],
        unique_angles: vec![
            "total cost over three years".to_string(),
            "rollout checklist for the first month".to_string(),
        ],
    }
}

#[async_trait]
impl Step for ExtractThemesStep {
    fn name(&self) -> &str {
        EXTRACT_THEMES
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        let search: SearchContext = ctx.input(FETCH_CONTEXT)?;
        let topic = ctx.params().topic.as_str();
        let request = Self::request(topic, &search);

        let chain = json_chain::<ThemeReport>(&self.models, &request)
            .substitute("derived-themes", || substitute_themes(topic, &search));
        let mut outcome = ctx.policy(&self.policy).execute(chain).await?;

        if outcome.value.primary_keyword.trim().is_empty() {
            outcome.value.primary_keyword = topic.trim().to_lowercase();
        }
        info!(
            job_id = %ctx.job_id(),
            provider = %outcome.provider,
            keywords = outcome.value.secondary_keywords.len(),
            subtopics = outcome.value.main_subtopics.len(),
            "themes extracted"
        );
        StepOutput::from_outcome(&outcome)
    }
}
