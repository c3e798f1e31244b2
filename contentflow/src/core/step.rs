//! Durable per-step records.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::job::JobId;
use super::status::StepStatus;
use crate::utils::{now_utc, Timestamp};

/// The durable record of one step of one job.
///
/// Status and payload always travel together in a single row, so a
/// reader never sees `Succeeded` without its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Owning job.
    pub job_id: JobId,
    /// Position in the step sequence.
    pub step_index: usize,
    /// Step name.
    pub step_name: String,
    /// Current status.
    pub status: StepStatus,
    /// Output, present once succeeded.
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    /// Error of the latest failed attempt.
    #[serde(default)]
    pub error: Option<String>,
    /// Number of attempts started so far.
    pub attempt: u32,
    /// When the first attempt started.
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    /// When the record last reached a terminal status.
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
}

impl StepRecord {
    /// Creates a record that has not been attempted.
    pub fn pending(job_id: JobId, step_index: usize, step_name: impl Into<String>) -> Self {
        Self {
            job_id,
            step_index,
            step_name: step_name.into(),
            status: StepStatus::Pending,
            payload: None,
            error: None,
            attempt: 0,
            started_at: None,
            completed_at: None,
        }
    }

    /// Returns the next record for a newly started attempt.
    #[must_use]
    pub fn started(&self) -> Self {
        Self {
            status: StepStatus::Running,
            error: None,
            attempt: self.attempt + 1,
            started_at: self.started_at.or_else(|| Some(now_utc())),
            completed_at: None,
            ..self.clone()
        }
    }

    /// Returns the succeeded form of this record.
    #[must_use]
    pub fn succeeded(&self, payload: serde_json::Value) -> Self {
        Self {
            status: StepStatus::Succeeded,
            payload: Some(payload),
            error: None,
            completed_at: Some(now_utc()),
            ..self.clone()
        }
    }

    /// Returns the failed form of this record.
    #[must_use]
    pub fn failed(&self, error: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            payload: None,
            error: Some(error.into()),
            completed_at: Some(now_utc()),
            ..self.clone()
        }
    }

    /// SHA-256 of the serialized payload, used for write-once comparison.
    #[must_use]
    pub fn payload_digest(&self) -> Option<String> {
        let payload = self.payload.as_ref()?;
        let bytes = serde_json::to_vec(payload).ok()?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Some(hex::encode(hasher.finalize()))
    }

    /// A short key used in ledger error messages.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}#{}", self.job_id, self.step_index)
    }
}
