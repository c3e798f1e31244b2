//! Non-blocking job submission.
//!
//! The [`JobDispatcher`] creates the job row, spawns one task per job and
//! returns a [`JobHandle`] at once. Running jobs are tracked in a registry
//! owned by the dispatcher: a job is registered on submit and removed
//! when its task ends.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::core::{JobId, JobParams, JobState};
use crate::errors::ContentflowError;
use crate::pipeline::{JobStatusView, Orchestrator};

/// A job-scoped view of a dispatched run.
#[derive(Debug, Clone)]
pub struct JobHandle {
    job_id: JobId,
    state: watch::Receiver<JobState>,
}

impl JobHandle {
    fn finished(job_id: JobId, state: JobState) -> Self {
        let (_, rx) = watch::channel(state);
        Self { job_id, state: rx }
    }

    /// The job.
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// The last state the run reported.
    #[must_use]
    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Waits for the run to end and returns the final state.
    ///
    /// A non-terminal result means the run stopped on a ledger error; the
    /// job can be resumed.
    pub async fn wait(mut self) -> JobState {
        let finished = self
            .state
            .wait_for(JobState::is_terminal)
            .await
            .map(|state| *state);
        match finished {
            Ok(state) => state,
            Err(_) => *self.state.borrow(),
        }
    }
}

/// A job's registry entry, held by its task.
///
/// The entry is removed before the final state is published, and also when
/// the task is dropped without finishing, such as after a panic.
struct Registration {
    active: Arc<DashMap<JobId, watch::Receiver<JobState>>>,
    job_id: JobId,
    state: watch::Sender<JobState>,
    finished: bool,
}

impl Registration {
    fn finish(mut self, state: JobState) {
        self.active.remove(&self.job_id);
        self.finished = true;
        self.state.send_replace(state);
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if !self.finished {
            self.active.remove(&self.job_id);
            warn!(job_id = %self.job_id, "job task ended without a result");
        }
    }
}

/// Accepts jobs and runs them in the background.
#[derive(Debug, Clone)]
pub struct JobDispatcher {
    orchestrator: Arc<Orchestrator>,
    active: Arc<DashMap<JobId, watch::Receiver<JobState>>>,
}

impl JobDispatcher {
    /// Creates a dispatcher running jobs on `orchestrator`.
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            active: Arc::new(DashMap::new()),
        }
    }

    /// The orchestrator jobs run on.
    #[must_use]
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Validates `params`, creates the job and starts running it.
    ///
    /// Must be called inside a Tokio runtime.
    pub async fn submit(&self, params: JobParams) -> Result<JobHandle, ContentflowError> {
        let job = self.orchestrator.create_job(params).await?;
        Ok(self.schedule(job.id, JobState::Pending))
    }

    /// Starts running an existing job again, or returns the handle of the
    /// run already in progress. Terminal jobs are not rerun.
    pub async fn resume(&self, job_id: &JobId) -> Result<JobHandle, ContentflowError> {
        let job = self
            .orchestrator
            .store()
            .get_job(job_id)
            .await?
            .ok_or_else(|| ContentflowError::JobNotFound(job_id.to_string()))?;
        if job.state.is_terminal() {
            return Ok(JobHandle::finished(job.id, job.state));
        }
        Ok(self.schedule(job.id, job.state))
    }

    /// Resumes every job that is not terminal, such as the jobs of a
    /// process that stopped mid-run.
    pub async fn recover(&self) -> Result<Vec<JobHandle>, ContentflowError> {
        let jobs = self.orchestrator.store().list_jobs().await?;
        let handles: Vec<JobHandle> = jobs
            .into_iter()
            .filter(|job| !job.state.is_terminal())
            .map(|job| self.schedule(job.id, job.state))
            .collect();
        info!(resumed = handles.len(), "recovered unfinished jobs");
        Ok(handles)
    }

    /// Reads the status of a job.
    pub async fn status(&self, job_id: &JobId) -> Result<JobStatusView, ContentflowError> {
        self.orchestrator.status(job_id).await
    }

    /// Jobs with a run in progress.
    #[must_use]
    pub fn active_jobs(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.active.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Waits until no run is in progress.
    pub async fn drain(&self) {
        loop {
            let pending: Vec<JobHandle> = self
                .active
                .iter()
                .map(|e| JobHandle {
                    job_id: e.key().clone(),
                    state: e.value().clone(),
                })
                .collect();
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                handle.wait().await;
            }
        }
    }

    fn schedule(&self, job_id: JobId, initial: JobState) -> JobHandle {
        let (tx, rx) = watch::channel(initial);
        match self.active.entry(job_id.clone()) {
            Entry::Occupied(running) => {
                return JobHandle {
                    job_id,
                    state: running.get().clone(),
                };
            }
            Entry::Vacant(slot) => {
                slot.insert(rx.clone());
            }
        }

        let orchestrator = self.orchestrator.clone();
        let registration = Registration {
            active: self.active.clone(),
            job_id: job_id.clone(),
            state: tx,
            finished: false,
        };
        tokio::spawn(async move {
            registration.state.send_replace(JobState::Running);
            let id = registration.job_id.clone();
            let state = match orchestrator.run(&id).await {
                Ok(outcome) => outcome.state(),
                Err(err) => {
                    error!(job_id = %id, error = %err, "job run stopped");
                    JobState::Running
                }
            };
            registration.finish(state);
        });

        JobHandle { job_id, state: rx }
    }
}
