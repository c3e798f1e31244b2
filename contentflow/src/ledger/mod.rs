//! The durable step ledger.
//!
//! The ledger is the only source of truth for how far a job has
//! progressed. Its invariants hold regardless of which store backs it:
//!
//! - a succeeded step is never overwritten with a different payload
//! - a step never succeeds while an earlier step has not
//! - every write is a compare-and-set against the stored state

mod document;
mod file;
mod memory;
mod store;

pub use file::FileLedgerStore;
pub use memory::InMemoryLedgerStore;
#[cfg(test)]
pub use store::MockLedgerStore;
pub use store::LedgerStore;

use std::sync::Arc;

use crate::core::{JobId, StepRecord};
use crate::errors::LedgerError;

/// A state change for one step attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptUpdate {
    /// A new attempt started.
    Started,
    /// The attempt succeeded with this payload.
    Succeeded(serde_json::Value),
    /// The attempt failed with this error.
    Failed(String),
}

/// Where a run should pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePoint {
    /// The first step that has not succeeded.
    At(usize),
    /// Every step has succeeded.
    Complete,
}

/// Typed access to step records on top of a [`LedgerStore`].
#[derive(Clone)]
pub struct StepLedger {
    store: Arc<dyn LedgerStore>,
}

impl std::fmt::Debug for StepLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepLedger").finish_non_exhaustive()
    }
}

impl StepLedger {
    /// Wraps a store.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Records one attempt transition for a step and returns the stored row.
    ///
    /// The write is conditioned on the status read just before it, so a
    /// concurrent writer causes a [`LedgerError::Conflict`] instead of a
    /// lost update.
    pub async fn record_attempt(
        &self,
        job_id: &JobId,
        step_index: usize,
        step_name: &str,
        update: AttemptUpdate,
    ) -> Result<StepRecord, LedgerError> {
        let current = self.store.get_step(job_id, step_index).await?;
        let expected = current.as_ref().map(|r| r.status);
        let base = current
            .unwrap_or_else(|| StepRecord::pending(job_id.clone(), step_index, step_name));
        let next = match update {
            AttemptUpdate::Started => base.started(),
            AttemptUpdate::Succeeded(payload) => base.succeeded(payload),
            AttemptUpdate::Failed(error) => base.failed(error),
        };
        self.store.compare_and_set_step(expected, next).await
    }

    /// Returns the index of the first step, out of `step_count`, that has
    /// not succeeded.
    pub async fn resume_point(
        &self,
        job_id: &JobId,
        step_count: usize,
    ) -> Result<ResumePoint, LedgerError> {
        let records = self.store.list_steps(job_id).await?;
        let first_open = (0..step_count).find(|i| {
            !records
                .iter()
                .any(|r| r.step_index == *i && r.status.is_success())
        });
        Ok(first_open.map_or(ResumePoint::Complete, ResumePoint::At))
    }

    /// Lists the step records of a job, ordered by index.
    pub async fn records(&self, job_id: &JobId) -> Result<Vec<StepRecord>, LedgerError> {
        self.store.list_steps(job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Job, JobParams, StepStatus};
    use serde_json::json;

    async fn ledger_with_job() -> (StepLedger, JobId) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let job = Job::new(JobParams::new("topic"));
        store.insert_job(job.clone()).await.unwrap();
        (StepLedger::new(store), job.id)
    }

    #[tokio::test]
    async fn test_record_attempt_lifecycle() {
        let (ledger, job_id) = ledger_with_job().await;

        let r = ledger
            .record_attempt(&job_id, 0, "fetch-context", AttemptUpdate::Started)
            .await
            .unwrap();
        assert_eq!((r.status, r.attempt), (StepStatus::Running, 1));

        let r = ledger
            .record_attempt(&job_id, 0, "fetch-context", AttemptUpdate::Failed("boom".into()))
            .await
            .unwrap();
        assert_eq!(r.status, StepStatus::Failed);

        ledger
            .record_attempt(&job_id, 0, "fetch-context", AttemptUpdate::Started)
            .await
            .unwrap();
        let r = ledger
            .record_attempt(
                &job_id,
                0,
                "fetch-context",
                AttemptUpdate::Succeeded(json!({"results": []})),
            )
            .await
            .unwrap();
        assert_eq!((r.status, r.attempt), (StepStatus::Succeeded, 2));
    }

    #[tokio::test]
    async fn test_resume_point() {
        let (ledger, job_id) = ledger_with_job().await;
        assert_eq!(ledger.resume_point(&job_id, 3).await.unwrap(), ResumePoint::At(0));

        for i in 0..2 {
            ledger
                .record_attempt(&job_id, i, "s", AttemptUpdate::Started)
                .await
                .unwrap();
            ledger
                .record_attempt(&job_id, i, "s", AttemptUpdate::Succeeded(json!(i)))
                .await
                .unwrap();
        }
        ledger
            .record_attempt(&job_id, 2, "s", AttemptUpdate::Started)
            .await
            .unwrap();

        assert_eq!(ledger.resume_point(&job_id, 3).await.unwrap(), ResumePoint::At(2));

        ledger
            .record_attempt(&job_id, 2, "s", AttemptUpdate::Succeeded(json!(2)))
            .await
            .unwrap();
        assert_eq!(
            ledger.resume_point(&job_id, 3).await.unwrap(),
            ResumePoint::Complete
        );
    }

    #[tokio::test]
    async fn test_out_of_order_commit_rejected() {
        let (ledger, job_id) = ledger_with_job().await;
        ledger
            .record_attempt(&job_id, 1, "s1", AttemptUpdate::Started)
            .await
            .unwrap();
        let err = ledger
            .record_attempt(&job_id, 1, "s1", AttemptUpdate::Succeeded(json!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::OrderViolation { blocking_index: 0, .. }));
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let mut store = MockLedgerStore::new();
        store.expect_get_step().returning(|_, _| Ok(None));
        store
            .expect_compare_and_set_step()
            .returning(|_, _| Err(LedgerError::Storage("disk full".to_string())));
        let ledger = StepLedger::new(Arc::new(store));

        let err = ledger
            .record_attempt(&JobId::from("j"), 0, "s0", AttemptUpdate::Started)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Storage("disk full".to_string()));
    }
}
