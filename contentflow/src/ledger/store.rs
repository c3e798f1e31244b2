//! Storage backend trait for the ledger.

use async_trait::async_trait;

use crate::core::{ArtifactRecord, Job, JobId, JobState, StepRecord, StepStatus};
use crate::errors::LedgerError;

/// Durable storage for jobs, step records and artifacts.
///
/// Every mutation is a compare-and-set against the stored state so that
/// two writers racing on the same row cannot both win. Implementations
/// must make each successful write durable before returning.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts a new job row.
    async fn insert_job(&self, job: Job) -> Result<(), LedgerError>;

    /// Gets a job by id.
    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, LedgerError>;

    /// Lists every stored job.
    async fn list_jobs(&self) -> Result<Vec<Job>, LedgerError>;

    /// Replaces the job row if its stored state equals `expected`.
    async fn compare_and_set_job(&self, expected: JobState, job: Job) -> Result<(), LedgerError>;

    /// Gets one step record.
    async fn get_step(
        &self,
        job_id: &JobId,
        step_index: usize,
    ) -> Result<Option<StepRecord>, LedgerError>;

    /// Lists the step records of a job, ordered by index.
    async fn list_steps(&self, job_id: &JobId) -> Result<Vec<StepRecord>, LedgerError>;

    /// Writes a step record if the stored status equals `expected`
    /// (`None` meaning no record yet), returning the stored record.
    ///
    /// Rewriting a succeeded record with an identical payload is a no-op.
    async fn compare_and_set_step(
        &self,
        expected: Option<StepStatus>,
        record: StepRecord,
    ) -> Result<StepRecord, LedgerError>;

    /// Stores the final artifact of a job. Fails if one already exists.
    async fn put_artifact(&self, record: ArtifactRecord) -> Result<(), LedgerError>;

    /// Gets the final artifact of a job.
    async fn get_artifact(&self, job_id: &JobId) -> Result<Option<ArtifactRecord>, LedgerError>;
}
