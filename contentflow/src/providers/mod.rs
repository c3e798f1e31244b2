//! External service seams: web search and language models.
//!
//! Steps depend only on the [`SearchProvider`] and [`LanguageModel`]
//! traits. HTTP implementations live behind the `http` feature; the
//! [`crate::testing`] module carries deterministic stand-ins.

mod fixtures;
#[cfg(feature = "http")]
mod http;
mod json;

pub use fixtures::fixture_search_results;
#[cfg(feature = "http")]
pub use http::{OpenAiChatModel, SerpApiFlavor, SerpApiSearchProvider, TinyFishSearchProvider};
pub use json::{extract_json, parse_json_response};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// 1-based position.
    pub rank: u32,
    /// Result URL.
    pub url: String,
    /// Page title.
    pub title: String,
    /// Snippet text.
    pub snippet: String,
}

/// A web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name used in logs and fallback outcomes.
    fn name(&self) -> &str;

    /// Returns up to `limit` organic results for `query`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ProviderError>;
}

/// A chat-style completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// What the request is for, e.g. `extract-themes`.
    pub task: String,
    /// System prompt.
    pub system_prompt: String,
    /// User prompt.
    pub user_prompt: String,
    /// Whether the caller expects a JSON object back.
    #[serde(default)]
    pub expects_json: bool,
    /// Structured parameters behind the prompt (budgets, headings,
    /// keywords). Remote models ignore these.
    #[serde(default)]
    pub hints: serde_json::Map<String, serde_json::Value>,
}

impl CompletionRequest {
    /// Creates a plain-text request.
    pub fn new(
        task: impl Into<String>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            task: task.into(),
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            expects_json: false,
            hints: serde_json::Map::new(),
        }
    }

    /// Marks the request as expecting a JSON object.
    #[must_use]
    pub fn json(mut self) -> Self {
        self.expects_json = true;
        self
    }

    /// Adds a structured hint.
    #[must_use]
    pub fn with_hint(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.hints.insert(key.to_string(), value.into());
        self
    }

    /// Appends text to the user prompt.
    pub fn amend(&mut self, text: &str) {
        self.user_prompt.push_str("\n\n");
        self.user_prompt.push_str(text);
    }
}

/// A text generation backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model name used in logs and fallback outcomes.
    fn name(&self) -> &str;

    /// Returns the raw completion text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}

/// Runs a request and decodes the reply as JSON.
///
/// A reply that does not decode is an [`ProviderError::InvalidResponse`],
/// which is retryable.
pub async fn complete_json<T: DeserializeOwned>(
    model: &dyn LanguageModel,
    request: &CompletionRequest,
) -> Result<T, ProviderError> {
    let raw = model.complete(request).await?;
    parse_json_response(&raw)
}
