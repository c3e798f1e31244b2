//! In-memory ledger store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::document::JobDocument;
use super::store::LedgerStore;
use crate::core::{ArtifactRecord, Job, JobId, JobState, StepRecord, StepStatus};
use crate::errors::LedgerError;

/// A ledger store that keeps everything in process memory.
///
/// Useful for tests and single-shot runs; nothing survives a restart.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedgerStore {
    documents: Arc<Mutex<HashMap<JobId, JobDocument>>>,
}

impl InMemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    /// Returns true if no jobs are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }

    fn with_document<T>(
        &self,
        job_id: &JobId,
        f: impl FnOnce(&mut JobDocument) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut documents = self.documents.lock();
        let doc = documents
            .get_mut(job_id)
            .ok_or_else(|| LedgerError::JobNotFound(job_id.to_string()))?;
        // Apply to a copy so a rejected write leaves the row untouched.
        let mut next = doc.clone();
        let out = f(&mut next)?;
        *doc = next;
        Ok(out)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_job(&self, job: Job) -> Result<(), LedgerError> {
        let mut documents = self.documents.lock();
        if documents.contains_key(&job.id) {
            return Err(LedgerError::DuplicateJob(job.id.to_string()));
        }
        documents.insert(job.id.clone(), JobDocument::new(job));
        Ok(())
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, LedgerError> {
        Ok(self.documents.lock().get(job_id).map(|d| d.job.clone()))
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, LedgerError> {
        let mut jobs: Vec<Job> = self
            .documents
            .lock()
            .values()
            .map(|d| d.job.clone())
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn compare_and_set_job(&self, expected: JobState, job: Job) -> Result<(), LedgerError> {
        let job_id = job.id.clone();
        self.with_document(&job_id, |doc| doc.compare_and_set_job(expected, job))
    }

    async fn get_step(
        &self,
        job_id: &JobId,
        step_index: usize,
    ) -> Result<Option<StepRecord>, LedgerError> {
        Ok(self
            .documents
            .lock()
            .get(job_id)
            .and_then(|d| d.steps.get(&step_index).cloned()))
    }

    async fn list_steps(&self, job_id: &JobId) -> Result<Vec<StepRecord>, LedgerError> {
        Ok(self
            .documents
            .lock()
            .get(job_id)
            .map(|d| d.steps.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn compare_and_set_step(
        &self,
        expected: Option<StepStatus>,
        record: StepRecord,
    ) -> Result<StepRecord, LedgerError> {
        let job_id = record.job_id.clone();
        self.with_document(&job_id, |doc| {
            doc.compare_and_set_step(expected, record).map(|(r, _)| r)
        })
    }

    async fn put_artifact(&self, record: ArtifactRecord) -> Result<(), LedgerError> {
        let job_id = record.job_id.clone();
        self.with_document(&job_id, |doc| doc.put_artifact(record))
    }

    async fn get_artifact(&self, job_id: &JobId) -> Result<Option<ArtifactRecord>, LedgerError> {
        Ok(self
            .documents
            .lock()
            .get(job_id)
            .and_then(|d| d.artifact.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobParams;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_and_get_job() {
        let store = InMemoryLedgerStore::new();
        let job = Job::new(JobParams::new("topic"));
        store.insert_job(job.clone()).await.unwrap();

        assert_eq!(store.get_job(&job.id).await.unwrap(), Some(job.clone()));
        assert_eq!(store.len(), 1);
        assert!(matches!(
            store.insert_job(job).await,
            Err(LedgerError::DuplicateJob(_))
        ));
    }

    #[tokio::test]
    async fn test_step_write_for_unknown_job() {
        let store = InMemoryLedgerStore::new();
        let record = StepRecord::pending(JobId::from("missing"), 0, "s0").started();
        let err = store.compare_and_set_step(None, record).await.unwrap_err();
        assert_eq!(err, LedgerError::JobNotFound("missing".to_string()));
    }

    #[tokio::test]
    async fn test_rejected_write_leaves_row_untouched() {
        let store = InMemoryLedgerStore::new();
        let job = Job::new(JobParams::new("topic"));
        store.insert_job(job.clone()).await.unwrap();

        let started = StepRecord::pending(job.id.clone(), 1, "s1").started();
        store.compare_and_set_step(None, started.clone()).await.unwrap();
        let err = store
            .compare_and_set_step(Some(StepStatus::Running), started.succeeded(json!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::OrderViolation { .. }));

        let stored = store.get_step(&job.id, 1).await.unwrap().unwrap();
        assert_eq!(stored.status, StepStatus::Running);
        assert!(stored.payload.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_commits_single_winner() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let job = Job::new(JobParams::new("topic"));
        store.insert_job(job.clone()).await.unwrap();
        let started = StepRecord::pending(job.id.clone(), 0, "s0").started();
        store.compare_and_set_step(None, started.clone()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let record = started.succeeded(json!({ "writer": i }));
            handles.push(tokio::spawn(async move {
                store
                    .compare_and_set_step(Some(StepStatus::Running), record)
                    .await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_artifact_is_written_once() {
        use crate::testing::sample_artifact;
        use crate::utils::now_utc;
        use tokio_test::{assert_err, assert_ok, block_on};

        let store = InMemoryLedgerStore::new();
        let job = Job::new(JobParams::new("topic"));
        assert_ok!(block_on(store.insert_job(job.clone())));

        let record = ArtifactRecord {
            job_id: job.id.clone(),
            artifact: sample_artifact(job.id.clone(), 1500),
            revision_count: 0,
            stored_at: now_utc(),
        };
        assert_ok!(block_on(store.put_artifact(record.clone())));
        assert_err!(block_on(store.put_artifact(record.clone())));
        assert_eq!(
            assert_ok!(block_on(store.get_artifact(&job.id))),
            Some(record)
        );
    }
}
