//! Ordered provider fallback with per-provider retry and timeout.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::retry::{should_retry, RetryConfig, RetryDecision, RetryState};
use crate::errors::{ProviderError, StepError};

/// A boxed call to one provider.
pub type ProviderCall<'a, T> =
    Box<dyn Fn() -> BoxFuture<'a, Result<T, ProviderError>> + Send + Sync + 'a>;

type SubstituteFn<'a, T> = Box<dyn FnOnce() -> T + Send + 'a>;

/// The providers to try for one operation, in priority order, plus an
/// optional local substitute.
pub struct ProviderChain<'a, T> {
    providers: Vec<(String, ProviderCall<'a, T>)>,
    substitute: Option<(String, SubstituteFn<'a, T>)>,
}

impl<'a, T: Send + 'a> Default for ProviderChain<'a, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T: Send + 'a> ProviderChain<'a, T> {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            substitute: None,
        }
    }

    /// Appends a provider. Providers are tried in the order added.
    #[must_use]
    pub fn provider<F, Fut>(mut self, name: impl Into<String>, call: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'a,
        Fut: Future<Output = Result<T, ProviderError>> + Send + 'a,
    {
        let call: ProviderCall<'a, T> =
            Box::new(move || -> BoxFuture<'a, Result<T, ProviderError>> { Box::pin(call()) });
        self.providers.push((name.into(), call));
        self
    }

    /// Sets the local substitute used when every provider fails.
    #[must_use]
    pub fn substitute(mut self, name: impl Into<String>, build: impl FnOnce() -> T + Send + 'a) -> Self {
        self.substitute = Some((name.into(), Box::new(build)));
        self
    }

    /// Number of providers in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns true if the chain has no providers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// A value produced by a [`FallbackPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackOutcome<T> {
    /// The produced value.
    pub value: T,
    /// Name of the provider (or substitute) that produced it.
    pub provider: String,
    /// Provider calls made, across all providers.
    pub attempts: u32,
    /// True when the value came from the local substitute.
    pub degraded: bool,
}

/// One provider's final failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    /// Provider name.
    pub provider: String,
    /// Its last error.
    pub error: ProviderError,
}

/// Every provider failed and no substitute was allowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation '{operation}' exhausted after {attempts} attempts")]
pub struct FallbackError {
    /// The operation name.
    pub operation: String,
    /// Provider calls made.
    pub attempts: u32,
    /// The final failure of each provider, in order.
    pub failures: Vec<ProviderFailure>,
}

impl FallbackError {
    /// The last error seen.
    #[must_use]
    pub fn last_error(&self) -> Option<&ProviderError> {
        self.failures.last().map(|f| &f.error)
    }
}

impl From<FallbackError> for StepError {
    fn from(err: FallbackError) -> Self {
        let last_error = err
            .last_error()
            .map_or_else(|| "no providers configured".to_string(), ToString::to_string);
        Self::Exhausted {
            operation: err.operation,
            attempts: err.attempts,
            last_error,
        }
    }
}

/// Runs an operation against an ordered list of providers.
///
/// Each provider gets up to `retry.max_attempts` calls. Retryable errors
/// (including the per-operation timeout) are retried with backoff; other
/// errors move straight to the next provider. When every provider is
/// spent, the substitute is used unless the policy is fallback-required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    operation: String,
    retry: RetryConfig,
    timeout: Duration,
    fallback_required: bool,
}

impl FallbackPolicy {
    /// Creates a policy with default retry and a 60 second timeout.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(60),
            fallback_required: false,
        }
    }

    /// Sets the retry config.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Forbids the local substitute.
    #[must_use]
    pub fn with_fallback_required(mut self, required: bool) -> Self {
        self.fallback_required = required;
        self
    }

    /// The operation name.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// The per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the substitute is forbidden.
    #[must_use]
    pub const fn fallback_required(&self) -> bool {
        self.fallback_required
    }

    /// Runs the chain.
    pub async fn execute<'a, T: Send + 'a>(
        &self,
        chain: ProviderChain<'a, T>,
    ) -> Result<FallbackOutcome<T>, FallbackError> {
        let ProviderChain {
            providers,
            substitute,
        } = chain;
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let mut attempts = 0u32;
        let mut failures = Vec::new();

        for (provider, call) in &providers {
            let mut state = RetryState::new();
            loop {
                attempts += 1;
                let result = match tokio::time::timeout(self.timeout, call()).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout { timeout_ms }),
                };

                match result {
                    Ok(value) => {
                        debug!(
                            operation = %self.operation,
                            provider = %provider,
                            attempt = state.attempts(),
                            "provider call succeeded"
                        );
                        return Ok(FallbackOutcome {
                            value,
                            provider: provider.clone(),
                            attempts,
                            degraded: false,
                        });
                    }
                    Err(error) if error.is_retryable() => {
                        match should_retry(&mut state, &self.retry) {
                            RetryDecision::Retry(delay) => {
                                debug!(
                                    operation = %self.operation,
                                    provider = %provider,
                                    attempt = state.retries,
                                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                    error = %error,
                                    "retrying provider call"
                                );
                                tokio::time::sleep(delay).await;
                            }
                            RetryDecision::GiveUp => {
                                warn!(
                                    operation = %self.operation,
                                    provider = %provider,
                                    attempts = state.attempts(),
                                    error = %error,
                                    "provider exhausted, falling back"
                                );
                                failures.push(ProviderFailure {
                                    provider: provider.clone(),
                                    error,
                                });
                                break;
                            }
                        }
                    }
                    Err(error) => {
                        warn!(
                            operation = %self.operation,
                            provider = %provider,
                            error = %error,
                            "provider failed permanently, falling back"
                        );
                        failures.push(ProviderFailure {
                            provider: provider.clone(),
                            error,
                        });
                        break;
                    }
                }
            }
        }

        if !self.fallback_required {
            if let Some((name, build)) = substitute {
                info!(
                    operation = %self.operation,
                    substitute = %name,
                    attempts,
                    "using local substitute"
                );
                return Ok(FallbackOutcome {
                    value: build(),
                    provider: name,
                    attempts,
                    degraded: true,
                });
            }
        }

        Err(FallbackError {
            operation: self.operation.clone(),
            attempts,
            failures,
        })
    }
}
