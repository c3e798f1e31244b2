//! Pipeline steps.
//!
//! A step is a function of the job parameters and the outputs of earlier
//! steps. Steps never touch the ledger; the orchestrator persists what
//! they return.
//!
//! The seven content steps run in this order:
//!
//! | index | name | fallback-required |
//! |---|---|---|
//! | 0 | `fetch-context` | no |
//! | 1 | `extract-themes` | no |
//! | 2 | `build-outline` | no |
//! | 3 | `draft-sections` | yes |
//! | 4 | `build-metadata` | no |
//! | 5 | `build-links` | no |
//! | 6 | `build-faq` | no |

mod context;
mod descriptor;
mod draft;
mod faq;
mod fetch;
mod links;
mod metadata;
mod outline;
mod themes;
mod types;

pub use context::{StepContext, StepOutput};
pub use descriptor::{StepDescriptor, StepRole};
pub use draft::{plan_sections, section_tolerance, DraftItem, DraftSectionsStep, INTRO_BUDGET};
pub use faq::{is_generic_question, BuildFaqStep, MAX_FAQ_ITEMS};
pub use fetch::FetchContextStep;
pub use links::{resolve_publisher_url, BuildLinksStep};
pub use metadata::{normalize_description, normalize_title, BuildMetadataStep};
pub use outline::{enforce_budget, BuildOutlineStep};
pub use themes::ExtractThemesStep;
pub use types::{
    ArticleOutline, DraftedArticle, FaqSet, LinkStrategy, OutlineSection, SearchContext,
    SearchIntent, ThemeReport,
};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;

use crate::errors::StepError;
use crate::providers::{complete_json, CompletionRequest, LanguageModel};
use crate::resilience::ProviderChain;

/// Name of the search step.
pub const FETCH_CONTEXT: &str = "fetch-context";
/// Name of the theme extraction step.
pub const EXTRACT_THEMES: &str = "extract-themes";
/// Name of the outline step.
pub const BUILD_OUTLINE: &str = "build-outline";
/// Name of the drafting step.
pub const DRAFT_SECTIONS: &str = "draft-sections";
/// Name of the metadata step.
pub const BUILD_METADATA: &str = "build-metadata";
/// Name of the link step.
pub const BUILD_LINKS: &str = "build-links";
/// Name of the FAQ step.
pub const BUILD_FAQ: &str = "build-faq";

/// Step names in execution order.
pub const STEP_NAMES: [&str; 7] = [
    FETCH_CONTEXT,
    EXTRACT_THEMES,
    BUILD_OUTLINE,
    DRAFT_SECTIONS,
    BUILD_METADATA,
    BUILD_LINKS,
    BUILD_FAQ,
];

/// One unit of pipeline work.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns the name of the step.
    fn name(&self) -> &str;

    /// Runs the step.
    ///
    /// A [`StepError::Retryable`] lets the orchestrator attempt the step
    /// again; any other error fails the job.
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, StepError>;
}

/// A step backed by a plain function.
pub struct FnStep<F>
where
    F: Fn(&StepContext) -> Result<StepOutput, StepError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(&StepContext) -> Result<StepOutput, StepError> + Send + Sync,
{
    /// Creates a new function-based step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStep<F>
where
    F: Fn(&StepContext) -> Result<StepOutput, StepError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&StepContext) -> Result<StepOutput, StepError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        (self.func)(ctx)
    }
}

/// Builds a chain that asks each model in turn for a JSON reply.
pub(crate) fn json_chain<'a, T>(
    models: &'a [Arc<dyn LanguageModel>],
    request: &'a CompletionRequest,
) -> ProviderChain<'a, T>
where
    T: DeserializeOwned + Send + 'a,
{
    models.iter().fold(ProviderChain::new(), |chain, model| {
        chain.provider(model.name().to_string(), move || {
            complete_json::<T>(model.as_ref(), request)
        })
    })
}

/// Builds a chain that asks each model in turn for plain text.
pub(crate) fn text_chain<'a>(
    models: &'a [Arc<dyn LanguageModel>],
    request: &'a CompletionRequest,
) -> ProviderChain<'a, String> {
    models.iter().fold(ProviderChain::new(), |chain, model| {
        chain.provider(model.name().to_string(), move || model.complete(request))
    })
}

/// Title-cases `text` word by word.
pub(crate) fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
