//! Retry and provider fallback for calls to external services.

mod fallback;
mod retry;

pub use fallback::{
    FallbackError, FallbackOutcome, FallbackPolicy, ProviderCall, ProviderChain, ProviderFailure,
};
pub use retry::{
    should_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision, RetryState,
};
