//! Runtime configuration.
//!
//! Every field has a serde default, so an empty JSON object is a valid
//! configuration. Environment variables override file values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigError;
use crate::quality::QualityConfig;
use crate::resilience::{FallbackPolicy, RetryConfig};

const SERP_PROVIDERS: [&str; 2] = ["serpapi", "valueserp"];

fn default_operation_timeout() -> u64 {
    60
}

fn default_search_timeout() -> u64 {
    20
}

fn default_step_timeout() -> u64 {
    600
}

fn default_step_max_attempts() -> u32 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o".to_string()
}

fn default_llm_temperature() -> f32 {
    0.7
}

fn default_llm_max_tokens() -> u32 {
    4096
}

fn default_serp_provider() -> String {
    "serpapi".to_string()
}

/// Credentials and model settings for the external providers.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// OpenAI API key. Without it no language model is configured.
    #[serde(default)]
    pub openai_api_key: Option<String>,
    /// Chat model name.
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    /// Sampling temperature.
    #[serde(default = "default_llm_temperature")]
    pub llm_temperature: f32,
    /// Completion token cap.
    #[serde(default = "default_llm_max_tokens")]
    pub llm_max_tokens: u32,
    /// Key for the primary search API.
    #[serde(default)]
    pub serp_api_key: Option<String>,
    /// Primary search API: `serpapi` or `valueserp`.
    #[serde(default = "default_serp_provider")]
    pub serp_provider: String,
    /// Key for the secondary search API.
    #[serde(default)]
    pub serp_fallback_api_key: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            llm_model: default_llm_model(),
            llm_temperature: default_llm_temperature(),
            llm_max_tokens: default_llm_max_tokens(),
            serp_api_key: None,
            serp_provider: default_serp_provider(),
            serp_fallback_api_key: None,
        }
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("ProviderSettings")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("llm_model", &self.llm_model)
            .field("llm_temperature", &self.llm_temperature)
            .field("llm_max_tokens", &self.llm_max_tokens)
            .field("serp_api_key", &redact(&self.serp_api_key))
            .field("serp_provider", &self.serp_provider)
            .field("serp_fallback_api_key", &redact(&self.serp_fallback_api_key))
            .finish()
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentflowConfig {
    /// Retry settings for every provider call.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Timeout for one language model call.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_seconds: u64,
    /// Timeout for one search call.
    #[serde(default = "default_search_timeout")]
    pub search_timeout_seconds: u64,
    /// Overall timeout for one step attempt.
    #[serde(default = "default_step_timeout")]
    pub step_timeout_seconds: u64,
    /// Attempts per step for retryable step errors.
    #[serde(default = "default_step_max_attempts")]
    pub step_max_attempts: u32,
    /// Quality gate and revision settings.
    #[serde(default)]
    pub quality: QualityConfig,
    /// Provider credentials.
    #[serde(default)]
    pub providers: ProviderSettings,
    /// Directory for the file-backed ledger; in-memory when absent.
    #[serde(default)]
    pub ledger_dir: Option<PathBuf>,
    /// Default log filter.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON log lines.
    #[serde(default)]
    pub log_json: bool,
}

impl Default for ContentflowConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            operation_timeout_seconds: default_operation_timeout(),
            search_timeout_seconds: default_search_timeout(),
            step_timeout_seconds: default_step_timeout(),
            step_max_attempts: default_step_max_attempts(),
            quality: QualityConfig::default(),
            providers: ProviderSettings::default(),
            ledger_dir: None,
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl ContentflowConfig {
    /// Reads a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, which maps variable names to values.
    ///
    /// Recognised variables: `OPENAI_API_KEY`, `LLM_MODEL`, `SERP_API_KEY`,
    /// `SERP_API_PROVIDER`, `SERP_FALLBACK_API_KEY`, `CONTENTFLOW_LEDGER_DIR`,
    /// `LOG_LEVEL`.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            self.providers.openai_api_key = Some(key);
        }
        if let Some(model) = get("LLM_MODEL") {
            self.providers.llm_model = model;
        }
        if let Some(key) = get("SERP_API_KEY") {
            self.providers.serp_api_key = Some(key);
        }
        if let Some(provider) = get("SERP_API_PROVIDER") {
            self.providers.serp_provider = provider.trim().to_lowercase();
        }
        if let Some(key) = get("SERP_FALLBACK_API_KEY") {
            self.providers.serp_fallback_api_key = Some(key);
        }
        if let Some(dir) = get("CONTENTFLOW_LEDGER_DIR") {
            self.ledger_dir = Some(PathBuf::from(dir));
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks ranges and cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return invalid(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            ));
        }
        if self.operation_timeout_seconds == 0 || self.search_timeout_seconds == 0 {
            return invalid("operation timeouts must be positive".to_string());
        }
        if self.step_timeout_seconds < self.operation_timeout_seconds {
            return invalid(format!(
                "step_timeout_seconds ({}) is shorter than operation_timeout_seconds ({})",
                self.step_timeout_seconds, self.operation_timeout_seconds
            ));
        }
        if self.step_max_attempts == 0 {
            return invalid("step_max_attempts must be at least 1".to_string());
        }
        if self.quality.pass_threshold > 100 {
            return invalid(format!(
                "quality.pass_threshold must be 0-100, got {}",
                self.quality.pass_threshold
            ));
        }
        if !(self.quality.length_tolerance > 0.0 && self.quality.length_tolerance < 1.0) {
            return invalid("quality.length_tolerance must be between 0 and 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.quality.min_keyword_coverage) {
            return invalid("quality.min_keyword_coverage must be between 0 and 1".to_string());
        }
        if self.quality.max_repetitions_per_100_words <= 0.0 {
            return invalid("quality.max_repetitions_per_100_words must be positive".to_string());
        }
        if !SERP_PROVIDERS.contains(&self.providers.serp_provider.as_str()) {
            return invalid(format!(
                "providers.serp_provider must be one of {SERP_PROVIDERS:?}, got '{}'",
                self.providers.serp_provider
            ));
        }
        if !(0.0..=2.0).contains(&self.providers.llm_temperature) {
            return invalid("providers.llm_temperature must be between 0 and 2".to_string());
        }
        Ok(())
    }

    /// Fallback policy for a language model operation.
    #[must_use]
    pub fn model_policy(&self, operation: &str) -> FallbackPolicy {
        FallbackPolicy::new(operation)
            .with_retry(self.retry.clone())
            .with_timeout(Duration::from_secs(self.operation_timeout_seconds))
    }

    /// Fallback policy for a search operation.
    #[must_use]
    pub fn search_policy(&self, operation: &str) -> FallbackPolicy {
        FallbackPolicy::new(operation)
            .with_retry(self.retry.clone())
            .with_timeout(Duration::from_secs(self.search_timeout_seconds))
    }

    /// Overall timeout for a step attempt.
    #[must_use]
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::DegradedPolicy;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_empty_object_is_default() {
        let config: ContentflowConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ContentflowConfig::default());
        assert_eq!(config.quality.pass_threshold, 70);
        assert_eq!(config.providers.llm_model, "gpt-4o");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"quality": {{"pass_threshold": 80, "degraded_policy": "cap_below_threshold"}},
               "ledger_dir": "/var/lib/contentflow"}}"#
        )
        .unwrap();

        let config = ContentflowConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.quality.pass_threshold, 80);
        assert_eq!(config.quality.max_revisions, 2);
        assert_eq!(config.quality.degraded_policy, DegradedPolicy::CapBelowThreshold);
        assert_eq!(config.ledger_dir, Some(PathBuf::from("/var/lib/contentflow")));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("SERP_API_PROVIDER", "ValueSerp"),
            ("CONTENTFLOW_LEDGER_DIR", "/tmp/ledger"),
            ("LLM_MODEL", ""),
        ]
        .into_iter()
        .collect();

        let config = ContentflowConfig::default()
            .with_env_overrides(|key| env.get(key).map(ToString::to_string))
            .unwrap();
        assert_eq!(config.providers.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.providers.serp_provider, "valueserp");
        assert_eq!(config.providers.llm_model, "gpt-4o");
        assert_eq!(config.ledger_dir, Some(PathBuf::from("/tmp/ledger")));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = ContentflowConfig::default();
        config.quality.pass_threshold = 101;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ContentflowConfig::default();
        config.providers.serp_provider = "bing".to_string();
        assert!(config.validate().is_err());

        let mut config = ContentflowConfig::default();
        config.step_timeout_seconds = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let mut config = ContentflowConfig::default();
        config.providers.openai_api_key = Some("sk-secret".to_string());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_policies_use_timeouts() {
        let config = ContentflowConfig::default();
        assert_eq!(config.search_policy("fetch-context").timeout(), Duration::from_secs(20));
        assert_eq!(config.model_policy("build-faq").timeout(), Duration::from_secs(60));
        assert_eq!(config.step_timeout(), Duration::from_secs(600));
    }
}
