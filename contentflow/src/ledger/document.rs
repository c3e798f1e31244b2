//! The per-job aggregate both store implementations persist.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{ArtifactRecord, Job, JobState, StepRecord, StepStatus};
use crate::errors::LedgerError;

/// Everything stored for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct JobDocument {
    pub job: Job,
    #[serde(default)]
    pub steps: BTreeMap<usize, StepRecord>,
    #[serde(default)]
    pub artifact: Option<ArtifactRecord>,
}

/// Whether a write changed the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteEffect {
    Applied,
    Unchanged,
}

fn describe(status: Option<StepStatus>) -> String {
    status.map_or_else(|| "absent".to_string(), |s| s.to_string())
}

impl JobDocument {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            steps: BTreeMap::new(),
            artifact: None,
        }
    }

    pub fn compare_and_set_job(&mut self, expected: JobState, next: Job) -> Result<(), LedgerError> {
        let key = self.job.id.to_string();
        if self.job.state != expected {
            return Err(LedgerError::Conflict {
                key,
                expected: expected.to_string(),
                actual: self.job.state.to_string(),
            });
        }
        if !expected.can_transition_to(next.state) {
            return Err(LedgerError::IllegalTransition {
                key,
                from: expected.to_string(),
                to: next.state.to_string(),
            });
        }
        self.job = next;
        Ok(())
    }

    /// Applies a step write after enforcing write-once, the expected
    /// status, the step state machine and sequence order.
    pub fn compare_and_set_step(
        &mut self,
        expected: Option<StepStatus>,
        record: StepRecord,
    ) -> Result<(StepRecord, WriteEffect), LedgerError> {
        let current = self.steps.get(&record.step_index);

        if let Some(existing) = current.filter(|r| r.status.is_success()) {
            if record.status.is_success() && existing.payload_digest() == record.payload_digest() {
                return Ok((existing.clone(), WriteEffect::Unchanged));
            }
            return Err(LedgerError::WriteOnceViolation {
                job_id: self.job.id.to_string(),
                step_index: record.step_index,
            });
        }

        let actual = current.map(|r| r.status);
        if actual != expected {
            return Err(LedgerError::Conflict {
                key: record.key(),
                expected: describe(expected),
                actual: describe(actual),
            });
        }

        let allowed = actual.map_or(
            matches!(record.status, StepStatus::Pending | StepStatus::Running),
            |from| from.can_transition_to(record.status),
        );
        if !allowed {
            return Err(LedgerError::IllegalTransition {
                key: record.key(),
                from: describe(actual),
                to: record.status.to_string(),
            });
        }

        if record.status.is_success() {
            let blocking = (0..record.step_index).find(|i| {
                !self
                    .steps
                    .get(i)
                    .is_some_and(|r| r.status.is_success())
            });
            if let Some(blocking_index) = blocking {
                return Err(LedgerError::OrderViolation {
                    job_id: self.job.id.to_string(),
                    step_index: record.step_index,
                    blocking_index,
                });
            }
        }

        self.steps.insert(record.step_index, record.clone());
        Ok((record, WriteEffect::Applied))
    }

    pub fn put_artifact(&mut self, record: ArtifactRecord) -> Result<(), LedgerError> {
        if self.artifact.is_some() {
            return Err(LedgerError::Conflict {
                key: format!("{}#artifact", self.job.id),
                expected: "absent".to_string(),
                actual: "present".to_string(),
            });
        }
        self.artifact = Some(record);
        Ok(())
    }
}
