//! Jobs and their parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::status::JobState;
use crate::errors::ContentflowError;
use crate::utils::{now_utc, Timestamp};

/// Smallest accepted target word count.
pub const MIN_TARGET_WORDS: u32 = 500;
/// Largest accepted target word count.
pub const MAX_TARGET_WORDS: u32 = 5000;
/// Target word count used when none is given.
pub const DEFAULT_TARGET_WORDS: u32 = 1500;

/// Opaque job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Caller-supplied parameters for a generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParams {
    /// Topic, also used as the seed for the primary keyword.
    pub topic: String,
    /// Desired total word count.
    #[serde(default = "default_target_word_count")]
    pub target_word_count: u32,
    /// BCP-47 language tag.
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_target_word_count() -> u32 {
    DEFAULT_TARGET_WORDS
}

fn default_language() -> String {
    "en".to_string()
}

impl JobParams {
    /// Creates parameters with default length and language.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            target_word_count: DEFAULT_TARGET_WORDS,
            language: default_language(),
        }
    }

    /// Sets the target word count.
    #[must_use]
    pub fn with_target_word_count(mut self, words: u32) -> Self {
        self.target_word_count = words;
        self
    }

    /// Sets the language.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Rejects empty topics and out-of-range lengths.
    pub fn validate(&self) -> Result<(), ContentflowError> {
        if self.topic.trim().is_empty() {
            return Err(ContentflowError::InvalidParams(
                "topic must not be empty".to_string(),
            ));
        }
        if !(MIN_TARGET_WORDS..=MAX_TARGET_WORDS).contains(&self.target_word_count) {
            return Err(ContentflowError::InvalidParams(format!(
                "target_word_count must be between {MIN_TARGET_WORDS} and {MAX_TARGET_WORDS}, got {}",
                self.target_word_count
            )));
        }
        if self.language.trim().is_empty() {
            return Err(ContentflowError::InvalidParams(
                "language must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The step and message that made a job fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    /// Name of the failing step.
    pub step: String,
    /// The step's final error.
    pub message: String,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step '{}' failed: {}", self.step, self.message)
    }
}

/// A durable job row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job id.
    pub id: JobId,
    /// Immutable parameters.
    pub params: JobParams,
    /// Current lifecycle state.
    pub state: JobState,
    /// Set when the job failed.
    #[serde(default)]
    pub error: Option<JobFailure>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last state change.
    pub updated_at: Timestamp,
}

impl Job {
    /// Creates a pending job with a fresh id.
    #[must_use]
    pub fn new(params: JobParams) -> Self {
        Self::with_id(JobId::generate(), params)
    }

    /// Creates a pending job with a caller-chosen id.
    #[must_use]
    pub fn with_id(id: JobId, params: JobParams) -> Self {
        let now = now_utc();
        Self {
            id,
            params,
            state: JobState::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns a copy moved to `state`.
    #[must_use]
    pub fn transitioned(&self, state: JobState, error: Option<JobFailure>) -> Self {
        Self {
            state,
            error,
            updated_at: now_utc(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_defaults() {
        let params = JobParams::new("remote work tools");
        assert_eq!(params.target_word_count, 1500);
        assert_eq!(params.language, "en");
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_deserialize_defaults() {
        let params: JobParams = serde_json::from_str(r#"{"topic":"rust"}"#).unwrap();
        assert_eq!(params, JobParams::new("rust"));
    }

    #[test]
    fn test_params_validation() {
        assert!(JobParams::new("  ").validate().is_err());
        assert!(JobParams::new("x")
            .with_target_word_count(499)
            .validate()
            .is_err());
        assert!(JobParams::new("x")
            .with_target_word_count(5001)
            .validate()
            .is_err());
        assert!(JobParams::new("x")
            .with_target_word_count(5000)
            .validate()
            .is_ok());
        assert!(JobParams::new("x").with_language("").validate().is_err());
    }

    #[test]
    fn test_job_transitioned_keeps_identity() {
        let job = Job::new(JobParams::new("topic"));
        let failed = job.transitioned(
            JobState::Failed,
            Some(JobFailure {
                step: "draft-sections".to_string(),
                message: "boom".to_string(),
            }),
        );
        assert_eq!(failed.id, job.id);
        assert_eq!(failed.created_at, job.created_at);
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(
            failed.error.unwrap().to_string(),
            "step 'draft-sections' failed: boom"
        );
    }
}
