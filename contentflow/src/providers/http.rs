//! HTTP-backed providers.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{CompletionRequest, LanguageModel, SearchProvider, SearchResult};
use crate::errors::ProviderError;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const SERPAPI_URL: &str = "https://serpapi.com/search";
const VALUESERP_URL: &str = "https://api.valueserp.com/search";
const TINYFISH_URL: &str = "https://agent.tinyfish.ai/v1/automation/run-sse";

fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::network(format!("failed to build HTTP client: {e}")))
}

fn map_transport_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout { timeout_ms: 0 }
    } else if err.is_decode() {
        ProviderError::invalid_response(err.to_string())
    } else {
        ProviderError::network(err.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    Err(ProviderError::from_status(status.as_u16(), message))
}

/// Which SerpAPI-compatible service to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerpApiFlavor {
    /// serpapi.com; results carry `link`.
    #[default]
    SerpApi,
    /// valueserp.com; results carry `url`.
    ValueSerp,
}

impl SerpApiFlavor {
    /// Parses a provider name such as `serpapi` or `valueserp`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "serpapi" => Some(Self::SerpApi),
            "valueserp" => Some(Self::ValueSerp),
            _ => None,
        }
    }

    const fn endpoint(self) -> &'static str {
        match self {
            Self::SerpApi => SERPAPI_URL,
            Self::ValueSerp => VALUESERP_URL,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::SerpApi => "serpapi",
            Self::ValueSerp => "valueserp",
        }
    }
}

#[derive(Debug, Deserialize)]
struct OrganicResults {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

/// Search through SerpAPI or ValueSERP.
#[derive(Debug, Clone)]
pub struct SerpApiSearchProvider {
    client: Client,
    api_key: String,
    flavor: SerpApiFlavor,
    endpoint: String,
}

impl SerpApiSearchProvider {
    /// Creates a provider for `flavor`.
    pub fn new(api_key: impl Into<String>, flavor: SerpApiFlavor) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(Duration::from_secs(30))?,
            api_key: api_key.into(),
            flavor,
            endpoint: flavor.endpoint().to_string(),
        })
    }

    /// Points the provider at a different endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for SerpApiSearchProvider {
    fn name(&self) -> &str {
        self.flavor.label()
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ProviderError> {
        let num = limit.to_string();
        let mut params = vec![("q", query), ("api_key", self.api_key.as_str()), ("num", num.as_str())];
        if self.flavor == SerpApiFlavor::SerpApi {
            params.push(("engine", "google"));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;
        let body: OrganicResults = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(e.to_string()))?;

        let results: Vec<SearchResult> = body
            .organic_results
            .into_iter()
            .take(limit)
            .zip(1u32..)
            .map(|(item, rank)| SearchResult {
                rank,
                url: item.link.or(item.url).unwrap_or_default(),
                title: item.title,
                snippet: item.snippet,
            })
            .collect();
        debug!(provider = self.name(), count = results.len(), "search results received");
        Ok(results)
    }
}

#[derive(Debug, Deserialize)]
struct TinyFishResults {
    results: Vec<TinyFishResult>,
}

#[derive(Debug, Deserialize)]
struct TinyFishResult {
    #[serde(default)]
    position: Option<u32>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

/// Search through the TinyFish browser agent.
///
/// The agent answers with a server-sent event stream; the first payload
/// holding a `results` array wins.
#[derive(Debug, Clone)]
pub struct TinyFishSearchProvider {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl TinyFishSearchProvider {
    /// Creates a provider.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(Duration::from_secs(20))?,
            api_key: api_key.into(),
            endpoint: TINYFISH_URL.to_string(),
        })
    }

    fn find_results(value: &serde_json::Value) -> Option<&serde_json::Value> {
        match value {
            serde_json::Value::Object(map) => {
                if map.get("results").is_some_and(serde_json::Value::is_array) {
                    return Some(value);
                }
                map.values().find_map(Self::find_results)
            }
            serde_json::Value::Array(items) => items.iter().find_map(Self::find_results),
            _ => None,
        }
    }

    fn parse_stream(body: &str) -> Option<TinyFishResults> {
        body.lines()
            .map(|line| line.trim().strip_prefix("data:").map_or(line.trim(), str::trim))
            .take_while(|payload| *payload != "[DONE]")
            .filter(|payload| !payload.is_empty())
            .filter_map(|payload| serde_json::from_str::<serde_json::Value>(payload).ok())
            .find_map(|value| {
                Self::find_results(&value)
                    .and_then(|found| serde_json::from_value(found.clone()).ok())
            })
    }
}

#[async_trait]
impl SearchProvider for TinyFishSearchProvider {
    fn name(&self) -> &str {
        "tinyfish"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ProviderError> {
        let goal = format!(
            "Go to google.com and search for \"{query}\" and return, for non-sponsored results \
             on pages 1 and 2: ranking positions (1-10), page titles, snippets and source URLs"
        );
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-Key", &self.api_key)
            .json(&serde_json::json!({ "url": "https://example.com/task", "goal": goal }))
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;
        let body = check_status(response)
            .await?
            .text()
            .await
            .map_err(|e| map_transport_error(&e))?;

        let parsed = Self::parse_stream(&body).ok_or_else(|| {
            let preview: String = body.chars().take(200).collect();
            ProviderError::invalid_response(format!("no results in stream: {preview}"))
        })?;

        let mut results: Vec<SearchResult> = parsed
            .results
            .into_iter()
            .take(limit)
            .zip(1u32..)
            .map(|(item, index)| SearchResult {
                rank: item.position.unwrap_or(index),
                url: item.url,
                title: item.title,
                snippet: item.snippet,
            })
            .collect();
        results.sort_by_key(|r| r.rank);
        Ok(results)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// An OpenAI chat-completions model.
#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    client: Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    endpoint: String,
}

impl OpenAiChatModel {
    /// Creates a model client with `gpt-4o` defaults.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(Duration::from_secs(120))?,
            api_key: api_key.into(),
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            endpoint: OPENAI_URL.to_string(),
        })
    }

    /// Sets the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the completion token cap.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Points the client at a compatible endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            response_format: request
                .expects_json
                .then(|| serde_json::json!({ "type": "json_object" })),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;
        let reply: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(e.to_string()))?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::invalid_response("empty completion"))?;
        debug!(model = %self.model, task = %request.task, chars = content.len(), "completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_from_name() {
        assert_eq!(SerpApiFlavor::from_name("SerpAPI"), Some(SerpApiFlavor::SerpApi));
        assert_eq!(SerpApiFlavor::from_name("valueserp"), Some(SerpApiFlavor::ValueSerp));
        assert_eq!(SerpApiFlavor::from_name("bing"), None);
    }

    #[test]
    fn test_tinyfish_stream_parsing() {
        let body = "event: progress\n\
                    data: {\"status\": \"working\"}\n\
                    data: {\"type\": \"COMPLETE\", \"resultJson\": {\"results\": [\
                    {\"position\": 2, \"url\": \"https://b\", \"title\": \"B\", \"snippet\": \"b\"},\
                    {\"position\": 1, \"url\": \"https://a\", \"title\": \"A\", \"snippet\": \"a\"}]}}\n\
                    data: [DONE]\n";
        let parsed = TinyFishSearchProvider::parse_stream(body).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[1].url, "https://a");
    }

    #[test]
    fn test_tinyfish_stream_without_results() {
        assert!(TinyFishSearchProvider::parse_stream("data: {\"status\": 1}\ndata: [DONE]").is_none());
    }

    #[test]
    fn test_organic_results_accept_link_or_url() {
        let body: OrganicResults = serde_json::from_str(
            r#"{"organic_results": [{"link": "https://a", "title": "A"}, {"url": "https://b", "snippet": "s"}]}"#,
        )
        .unwrap();
        let urls: Vec<_> = body
            .organic_results
            .into_iter()
            .map(|r| r.link.or(r.url).unwrap_or_default())
            .collect();
        assert_eq!(urls, vec!["https://a", "https://b"]);
    }
}
