//! `fetch-context`: top search results for the topic.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::context::{StepContext, StepOutput};
use super::types::SearchContext;
use super::{Step, FETCH_CONTEXT};
use crate::errors::StepError;
use crate::providers::{fixture_search_results, SearchProvider};
use crate::resilience::{FallbackPolicy, ProviderChain};

/// Results requested from each provider.
pub const RESULT_LIMIT: usize = 10;

/// Searches the topic across providers in priority order, falling back to
/// fixture results.
#[derive(Clone)]
pub struct FetchContextStep {
    providers: Vec<Arc<dyn SearchProvider>>,
    policy: FallbackPolicy,
}

impl std::fmt::Debug for FetchContextStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchContextStep")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("policy", &self.policy)
            .finish()
    }
}

impl FetchContextStep {
    /// Creates the step.
    pub fn new(providers: Vec<Arc<dyn SearchProvider>>, policy: FallbackPolicy) -> Self {
        Self { providers, policy }
    }
}

#[async_trait]
impl Step for FetchContextStep {
    fn name(&self) -> &str {
        FETCH_CONTEXT
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        let query = ctx.params().topic.trim().to_string();
        let topic = query.as_str();

        let chain = self
            .providers
            .iter()
            .fold(ProviderChain::new(), |chain, provider| {
                chain.provider(provider.name().to_string(), move || {
                    provider.search(topic, RESULT_LIMIT)
                })
            })
            .substitute("fixture", || fixture_search_results(topic, RESULT_LIMIT));

        let outcome = ctx.policy(&self.policy).execute(chain).await?;
        if outcome.degraded {
            warn!(job_id = %ctx.job_id(), "search unavailable, using fixture results");
        }
        info!(
            job_id = %ctx.job_id(),
            provider = %outcome.provider,
            attempts = outcome.attempts,
            results = outcome.value.len(),
            "search context fetched"
        );

        let context = SearchContext {
            query: query.clone(),
            results: outcome.value,
        };
        Ok(StepOutput::from_value(&context)?
            .with_degraded(outcome.degraded)
            .with_provider(outcome.provider))
    }
}
