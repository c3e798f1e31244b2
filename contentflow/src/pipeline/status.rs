//! The status polling surface.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::orchestrator::ASSEMBLE_STEP;
use crate::core::{ArtifactRecord, JobFailure, JobId, JobState, StepRecord};
use crate::errors::ContentflowError;
use crate::ledger::LedgerStore;
use crate::utils::Timestamp;

/// A point-in-time view of one job.
///
/// A failed job normally has a failed step record. The exception is a
/// failure during assembly or quality selection: every step record is
/// succeeded and `error.step` is [`ASSEMBLE_STEP`], which has no record of
/// its own. [`JobStatusView::failed_after_steps`] reports that case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    /// The job.
    pub job_id: JobId,
    /// Lifecycle state.
    pub state: JobState,
    /// Every step record written so far, ordered by index.
    pub steps: Vec<StepRecord>,
    /// The accepted artifact, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRecord>,
    /// The failing step and its error, once failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    /// Last state change.
    pub updated_at: Timestamp,
}

impl JobStatusView {
    /// Reads the job, its step records and its artifact from `store`.
    pub async fn load(store: &dyn LedgerStore, job_id: &JobId) -> Result<Self, ContentflowError> {
        let job = store
            .get_job(job_id)
            .await?
            .ok_or_else(|| ContentflowError::JobNotFound(job_id.to_string()))?;
        let steps = store.list_steps(job_id).await?;
        let artifact = store.get_artifact(job_id).await?;
        Ok(Self {
            job_id: job.id,
            state: job.state,
            steps,
            artifact,
            error: job.error,
            updated_at: job.updated_at,
        })
    }

    /// Outputs of the steps that have succeeded, keyed by step name.
    #[must_use]
    pub fn partial_outputs(&self) -> BTreeMap<String, serde_json::Value> {
        self.steps
            .iter()
            .filter(|r| r.status.is_success())
            .filter_map(|r| r.payload.clone().map(|p| (r.step_name.clone(), p)))
            .collect()
    }

    /// Number of succeeded steps.
    #[must_use]
    pub fn completed_steps(&self) -> usize {
        self.steps.iter().filter(|r| r.status.is_success()).count()
    }

    /// True when the job failed after every step had succeeded, while
    /// assembling or selecting the article.
    #[must_use]
    pub fn failed_after_steps(&self) -> bool {
        self.state == JobState::Failed
            && self.error.as_ref().is_some_and(|e| e.step == ASSEMBLE_STEP)
    }

    /// True once the job is completed or failed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Job, JobParams, StepStatus};
    use crate::ledger::{AttemptUpdate, InMemoryLedgerStore, StepLedger};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_status_view() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let job = Job::new(JobParams::new("remote work tools"));
        store.insert_job(job.clone()).await.unwrap();
        let ledger = StepLedger::new(store.clone());
        ledger
            .record_attempt(&job.id, 0, "fetch-context", AttemptUpdate::Started)
            .await
            .unwrap();
        ledger
            .record_attempt(&job.id, 0, "fetch-context", AttemptUpdate::Succeeded(json!({"n": 1})))
            .await
            .unwrap();
        ledger
            .record_attempt(&job.id, 1, "extract-themes", AttemptUpdate::Started)
            .await
            .unwrap();

        let view = JobStatusView::load(store.as_ref(), &job.id).await.unwrap();
        assert_eq!(view.state, JobState::Pending);
        assert_eq!(view.completed_steps(), 1);
        assert_eq!(view.steps[1].status, StepStatus::Running);
        assert_eq!(
            view.partial_outputs(),
            BTreeMap::from([("fetch-context".to_string(), json!({"n": 1}))])
        );
        assert!(view.artifact.is_none());
        assert!(!view.is_terminal());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let store = InMemoryLedgerStore::new();
        let err = JobStatusView::load(&store, &JobId::from("missing")).await.unwrap_err();
        assert!(matches!(err, ContentflowError::JobNotFound(id) if id == "missing"));
    }
}
