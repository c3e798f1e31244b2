//! The seven-step content sequence.

use std::sync::Arc;

use super::sequence::StepSequence;
use crate::config::ContentflowConfig;
use crate::errors::ContentflowError;
use crate::providers::{LanguageModel, SearchProvider};
use crate::steps::{
    BuildFaqStep, BuildLinksStep, BuildMetadataStep, BuildOutlineStep, DraftSectionsStep,
    ExtractThemesStep, FetchContextStep, Step, StepDescriptor, BUILD_FAQ, BUILD_LINKS,
    BUILD_METADATA, BUILD_OUTLINE, DRAFT_SECTIONS, EXTRACT_THEMES, FETCH_CONTEXT,
};

/// Search providers and language models in priority order.
#[derive(Clone, Default)]
pub struct StepProviders {
    /// Search APIs, primary first.
    pub search: Vec<Arc<dyn SearchProvider>>,
    /// Language models, primary first.
    pub models: Vec<Arc<dyn LanguageModel>>,
}

impl std::fmt::Debug for StepProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepProviders")
            .field("search", &self.search.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("models", &self.models.iter().map(|m| m.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl StepProviders {
    /// Creates an empty set; every step then runs on its local substitute,
    /// except drafting, which fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a search provider.
    #[must_use]
    pub fn with_search(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search.push(provider);
        self
    }

    /// Appends a language model.
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.models.push(model);
        self
    }

    /// Builds the HTTP providers for which keys are configured: the
    /// SerpAPI-compatible service first, TinyFish second, and the OpenAI
    /// chat model.
    #[cfg(feature = "http")]
    pub fn from_config(config: &ContentflowConfig) -> Result<Self, crate::errors::ProviderError> {
        use crate::providers::{
            OpenAiChatModel, SerpApiFlavor, SerpApiSearchProvider, TinyFishSearchProvider,
        };

        let settings = &config.providers;
        let mut providers = Self::new();
        if let Some(key) = &settings.serp_api_key {
            let flavor = SerpApiFlavor::from_name(&settings.serp_provider).unwrap_or_default();
            providers = providers.with_search(Arc::new(SerpApiSearchProvider::new(key, flavor)?));
        }
        if let Some(key) = &settings.serp_fallback_api_key {
            providers = providers.with_search(Arc::new(TinyFishSearchProvider::new(key)?));
        }
        if let Some(key) = &settings.openai_api_key {
            let model = OpenAiChatModel::new(key)?
                .with_model(settings.llm_model.clone())
                .with_temperature(settings.llm_temperature)
                .with_max_tokens(settings.llm_max_tokens);
            providers = providers.with_model(Arc::new(model));
        }
        Ok(providers)
    }
}

/// Builds fetch-context, extract-themes, build-outline, draft-sections,
/// build-metadata, build-links and build-faq, in that order.
///
/// Drafting is fallback-required and carries the drafting role used by
/// the revision loop.
pub fn standard_sequence(
    config: &ContentflowConfig,
    providers: &StepProviders,
) -> Result<StepSequence, ContentflowError> {
    let models = || providers.models.clone();
    let describe = |step: Arc<dyn Step>| {
        StepDescriptor::new(step)
            .with_timeout(config.step_timeout())
            .with_max_attempts(config.step_max_attempts)
    };

    StepSequence::new(vec![
        describe(Arc::new(FetchContextStep::new(
            providers.search.clone(),
            config.search_policy(FETCH_CONTEXT),
        ))),
        describe(Arc::new(ExtractThemesStep::new(
            models(),
            config.model_policy(EXTRACT_THEMES),
        ))),
        describe(Arc::new(BuildOutlineStep::new(
            models(),
            config.model_policy(BUILD_OUTLINE),
        ))),
        describe(Arc::new(DraftSectionsStep::new(
            models(),
            config.model_policy(DRAFT_SECTIONS),
        )))
        .with_fallback_required(true)
        .drafting(),
        describe(Arc::new(BuildMetadataStep::new(
            models(),
            config.model_policy(BUILD_METADATA),
        ))),
        describe(Arc::new(BuildLinksStep::new(
            models(),
            config.model_policy(BUILD_LINKS),
        ))),
        describe(Arc::new(BuildFaqStep::new(models(), config.model_policy(BUILD_FAQ)))),
    ])
}
