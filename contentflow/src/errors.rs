//! Error types for contentflow.
//!
//! Errors are layered: providers fail with [`ProviderError`], steps with
//! [`StepError`], the ledger with [`LedgerError`], and everything surfaces
//! to callers as [`ContentflowError`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for contentflow operations.
#[derive(Debug, Error)]
pub enum ContentflowError {
    /// A ledger operation failed.
    #[error("{0}")]
    Ledger(#[from] LedgerError),

    /// A step failed outside of normal job execution.
    #[error("{0}")]
    Step(#[from] StepError),

    /// Configuration is missing or invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Job parameters were rejected before the job was created.
    #[error("Invalid job parameters: {0}")]
    InvalidParams(String),

    /// The step sequence is not runnable.
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// No job exists with the given id.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// A background run ended without reaching a terminal job state.
    #[error("Job run aborted: {0}")]
    Aborted(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ContentflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Failure of a single call to an external provider.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderError {
    /// The call did not finish within its per-operation timeout.
    #[error("timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// The provider asked us to slow down.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Provider message.
        message: String,
    },

    /// The provider answered with a 5xx status.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Provider message.
        message: String,
    },

    /// The connection failed before a response arrived.
    #[error("network error: {message}")]
    Network {
        /// Transport message.
        message: String,
    },

    /// Credentials were rejected.
    #[error("authentication failed: {message}")]
    Auth {
        /// Provider message.
        message: String,
    },

    /// The provider rejected the request itself.
    #[error("malformed request: {message}")]
    MalformedRequest {
        /// Provider message.
        message: String,
    },

    /// The provider answered but the body could not be used.
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// What was wrong with the body.
        message: String,
    },
}

impl ProviderError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Maps a non-success HTTP status to an error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Auth { message },
            429 => Self::RateLimited { message },
            500..=599 => Self::Server { status, message },
            _ => Self::MalformedRequest { message },
        }
    }

    /// Returns true if the same provider may succeed on another attempt.
    ///
    /// Authentication and request-shape failures will fail identically
    /// on every attempt and are never retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::RateLimited { .. }
                | Self::Server { .. }
                | Self::Network { .. }
                | Self::InvalidResponse { .. }
        )
    }
}

/// Failure of a pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    /// A transient failure; the step may be attempted again.
    #[error("{message}")]
    Retryable {
        /// Failure description.
        message: String,
    },

    /// A permanent failure.
    #[error("{message}")]
    Unrecoverable {
        /// Failure description.
        message: String,
    },

    /// Every provider (and the local substitute, if any) was exhausted.
    #[error("operation '{operation}' exhausted after {attempts} attempts: {last_error}")]
    Exhausted {
        /// The fallback-wrapped operation.
        operation: String,
        /// Total provider calls made.
        attempts: u32,
        /// The last provider error seen.
        last_error: String,
    },

    /// A required upstream output is not present.
    #[error("step '{step}' requires output of '{input}'")]
    MissingInput {
        /// The step that needed the input.
        step: String,
        /// The missing upstream step.
        input: String,
    },

    /// An upstream payload could not be decoded.
    #[error("invalid payload from '{step}': {message}")]
    InvalidPayload {
        /// The step whose payload was bad.
        step: String,
        /// Decode error.
        message: String,
    },

    /// The step exceeded its overall timeout.
    #[error("step '{step}' timed out after {timeout_ms}ms")]
    TimedOut {
        /// The step that timed out.
        step: String,
        /// The elapsed timeout.
        timeout_ms: u64,
    },
}

impl StepError {
    /// Creates a retryable error.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
        }
    }

    /// Creates an unrecoverable error.
    pub fn unrecoverable(message: impl Into<String>) -> Self {
        Self::Unrecoverable {
            message: message.into(),
        }
    }

    /// Returns true if the step itself may be attempted again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. } | Self::TimedOut { .. })
    }

    /// Converts to a dictionary representation for events and status views.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let kind = match self {
            Self::Retryable { .. } => "retryable",
            Self::Unrecoverable { .. } => "unrecoverable",
            Self::Exhausted { .. } => "exhausted",
            Self::MissingInput { .. } => "missing_input",
            Self::InvalidPayload { .. } => "invalid_payload",
            Self::TimedOut { .. } => "timed_out",
        };
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::Value::String(kind.to_string()));
        map.insert(
            "message".to_string(),
            serde_json::Value::String(self.to_string()),
        );
        map.insert(
            "retryable".to_string(),
            serde_json::Value::Bool(self.is_retryable()),
        );
        map
    }
}

impl From<ProviderError> for StepError {
    fn from(err: ProviderError) -> Self {
        if err.is_retryable() {
            Self::retryable(err.to_string())
        } else {
            Self::unrecoverable(err.to_string())
        }
    }
}

/// Failure of a ledger read or write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// No job exists with the given id.
    #[error("job '{0}' not found")]
    JobNotFound(String),

    /// A job with the given id already exists.
    #[error("job '{0}' already exists")]
    DuplicateJob(String),

    /// A compare-and-set precondition did not hold.
    #[error("conflict on {key}: expected {expected}, found {actual}")]
    Conflict {
        /// The row being written.
        key: String,
        /// The expected state.
        expected: String,
        /// The state actually stored.
        actual: String,
    },

    /// A status change that the state machine does not allow.
    #[error("illegal transition on {key}: {from} -> {to}")]
    IllegalTransition {
        /// The row being written.
        key: String,
        /// Stored status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// A step would succeed before an earlier step has.
    #[error("step {step_index} of job '{job_id}' cannot succeed before step {blocking_index}")]
    OrderViolation {
        /// The job.
        job_id: String,
        /// The step being committed.
        step_index: usize,
        /// The earliest step that has not succeeded.
        blocking_index: usize,
    },

    /// A succeeded step would be overwritten with different content.
    #[error("step {step_index} of job '{job_id}' already succeeded with a different payload")]
    WriteOnceViolation {
        /// The job.
        job_id: String,
        /// The step.
        step_index: usize,
    },

    /// The backing storage failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A stored row could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Configuration loading or validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
