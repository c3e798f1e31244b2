//! The per-job run loop.
//!
//! [`Orchestrator::run`] walks the step sequence from the ledger's resume
//! point, assembles the artifact, runs the quality gate and revision loop,
//! and finally persists the artifact and completes the job. Every durable
//! effect goes through the ledger, so a run that dies anywhere can be
//! started again and picks up where the ledger says it stopped.

use dashmap::DashMap;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::assembly::assemble;
use super::executor::{run_with_timeout, StepExecutor, StepOutcome};
use super::sequence::StepSequence;
use super::status::JobStatusView;
use crate::core::{
    Artifact, ArticleSection, ArtifactRecord, Job, JobFailure, JobId, JobParams, JobState,
};
use crate::errors::{ContentflowError, StepError};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::ledger::{LedgerStore, ResumePoint, StepLedger};
use crate::quality::{QualityConfig, QualityGate};
use crate::revision::{FinalSelection, RevisionController, RevisionDecision, RevisionPlan};
use crate::steps::{StepContext, StepOutput};
use crate::utils::now_utc;

/// Name recorded as the failing step when assembly cannot decode outputs.
pub const ASSEMBLE_STEP: &str = "assemble";

/// How a call to [`Orchestrator::run`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The job completed with this artifact.
    Completed(Box<ArtifactRecord>),
    /// A step failed and the job is now failed.
    Failed(JobFailure),
    /// The job was already terminal; nothing ran.
    AlreadyTerminal(JobState),
}

impl RunOutcome {
    /// The job state after the run.
    #[must_use]
    pub const fn state(&self) -> JobState {
        match self {
            Self::Completed(_) => JobState::Completed,
            Self::Failed(_) => JobState::Failed,
            Self::AlreadyTerminal(state) => *state,
        }
    }
}

/// Runs jobs through a [`StepSequence`].
pub struct Orchestrator {
    sequence: StepSequence,
    ledger: StepLedger,
    executor: StepExecutor,
    gate: QualityGate,
    events: Arc<dyn EventSink>,
    locks: DashMap<JobId, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("steps", &self.sequence.names())
            .field("gate", &self.gate)
            .field("active_locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator over `store` with the default quality
    /// config and no event sink.
    pub fn new(sequence: StepSequence, store: Arc<dyn LedgerStore>) -> Self {
        let ledger = StepLedger::new(store);
        let events: Arc<dyn EventSink> = Arc::new(NoOpEventSink);
        Self {
            executor: StepExecutor::new(ledger.clone(), events.clone()),
            sequence,
            ledger,
            gate: QualityGate::default(),
            events,
            locks: DashMap::new(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.executor = StepExecutor::new(self.ledger.clone(), events.clone());
        self.events = events;
        self
    }

    /// Sets the quality config.
    #[must_use]
    pub fn with_quality(mut self, config: QualityConfig) -> Self {
        self.gate = QualityGate::new(config);
        self
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        self.ledger.store()
    }

    /// The step sequence.
    #[must_use]
    pub fn sequence(&self) -> &StepSequence {
        &self.sequence
    }

    /// Validates `params` and inserts a pending job.
    pub async fn create_job(&self, params: JobParams) -> Result<Job, ContentflowError> {
        params.validate()?;
        let job = Job::new(params);
        self.store().insert_job(job.clone()).await?;
        info!(job_id = %job.id, topic = %job.params.topic, "job created");
        Ok(job)
    }

    /// Reads the current status of a job.
    pub async fn status(&self, job_id: &JobId) -> Result<JobStatusView, ContentflowError> {
        JobStatusView::load(self.store().as_ref(), job_id).await
    }

    /// Runs a job to a terminal state.
    ///
    /// Safe to call any number of times: steps already recorded as
    /// succeeded are reused, and a terminal job is left untouched. Calls
    /// for the same job are serialized. Step failures end in
    /// [`RunOutcome::Failed`]; an `Err` means the ledger could not be read
    /// or written, and the job stays resumable.
    pub async fn run(&self, job_id: &JobId) -> Result<RunOutcome, ContentflowError> {
        let lock = self
            .locks
            .entry(job_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        let result = self.run_locked(job_id).await;
        drop(guard);
        self.locks
            .remove_if(job_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn run_locked(&self, job_id: &JobId) -> Result<RunOutcome, ContentflowError> {
        let stored = self
            .store()
            .get_job(job_id)
            .await?
            .ok_or_else(|| ContentflowError::JobNotFound(job_id.to_string()))?;

        let resumed = match stored.state {
            JobState::Completed | JobState::Failed => {
                info!(job_id = %job_id, state = %stored.state, "job already terminal");
                return Ok(RunOutcome::AlreadyTerminal(stored.state));
            }
            JobState::Running => true,
            JobState::Pending => false,
        };
        let job = if resumed {
            info!(job_id = %job_id, "resuming running job");
            stored
        } else {
            let running = stored.transitioned(JobState::Running, None);
            self.store()
                .compare_and_set_job(JobState::Pending, running.clone())
                .await?;
            running
        };
        self.events
            .emit(
                events::JOB_STARTED,
                Some(json!({"job_id": job.id, "topic": job.params.topic, "resumed": resumed})),
            )
            .await;

        let mut outputs = self.committed_outputs(&job.id).await?;
        let start = match self.ledger.resume_point(&job.id, self.sequence.len()).await? {
            ResumePoint::At(index) => index,
            ResumePoint::Complete => self.sequence.len(),
        };

        for (index, descriptor) in self.sequence.iter().enumerate() {
            if index < start {
                self.events
                    .emit(
                        events::STEP_SKIPPED,
                        Some(json!({"job_id": job.id, "step": descriptor.name(), "index": index})),
                    )
                    .await;
                continue;
            }

            let ctx = StepContext::new(job.id.clone(), job.params.clone(), descriptor.name())
                .with_fallback_required(descriptor.fallback_required())
                .with_prior(outputs.clone());
            match self.executor.run(&job.id, index, descriptor, &ctx).await? {
                StepOutcome::Succeeded(output) => {
                    outputs.insert(descriptor.name().to_string(), output);
                }
                StepOutcome::Failed(err) => {
                    return self.fail(&job, descriptor.name(), &err).await;
                }
            }
        }

        // A previous run died between persisting the artifact and
        // completing the job.
        if let Some(record) = self.store().get_artifact(&job.id).await? {
            return self.complete(&job, record).await;
        }

        let artifact = match assemble(&job.id, &job.params, &outputs, 0) {
            Ok(artifact) => artifact,
            Err(err) => return self.fail(&job, ASSEMBLE_STEP, &err).await,
        };
        let selection = self.select(&job, &outputs, artifact).await?;

        let record = ArtifactRecord {
            job_id: job.id.clone(),
            artifact: selection.artifact,
            revision_count: selection.revision_count,
            stored_at: now_utc(),
        };
        self.store().put_artifact(record.clone()).await?;
        self.complete(&job, record).await
    }

    /// Decodes the outputs of every succeeded step.
    async fn committed_outputs(
        &self,
        job_id: &JobId,
    ) -> Result<BTreeMap<String, StepOutput>, ContentflowError> {
        let mut outputs = BTreeMap::new();
        for record in self.ledger.records(job_id).await? {
            if !record.status.is_success() {
                continue;
            }
            if let Some(payload) = record.payload {
                let output = StepOutput::from_payload(&record.step_name, payload)?;
                outputs.insert(record.step_name, output);
            }
        }
        Ok(outputs)
    }

    /// Scores candidates and redrafts until the revision controller
    /// accepts one.
    async fn select(
        &self,
        job: &Job,
        outputs: &BTreeMap<String, StepOutput>,
        first: Artifact,
    ) -> Result<FinalSelection, ContentflowError> {
        let target = job.params.target_word_count;
        let threshold = self.gate.config().pass_threshold;
        let mut controller = RevisionController::from_config(self.gate.config(), target);
        let mut candidate = first;

        loop {
            let report = self.gate.score(&candidate, target);
            let failed: Vec<&str> = report.failed_checks().map(|c| c.kind.label()).collect();
            info!(
                job_id = %job.id,
                revision = candidate.revision,
                score = report.total,
                failed = ?failed,
                "artifact scored"
            );
            self.events
                .emit(
                    events::QUALITY_SCORED,
                    Some(json!({
                        "job_id": job.id,
                        "revision": candidate.revision,
                        "total": report.total,
                        "passed": report.is_passing(threshold),
                        "failed_checks": failed,
                    })),
                )
                .await;

            let previous = candidate.sections.clone();
            match controller.observe(candidate, report) {
                RevisionDecision::Accept(selection) => return Ok(selection),
                RevisionDecision::Revise(plan) => {
                    self.events
                        .emit(
                            events::REVISION_STARTED,
                            Some(json!({
                                "job_id": job.id,
                                "attempt": plan.attempt,
                                "length_scale": plan.length_scale,
                                "include_keywords": plan.include_keywords,
                                "avoid_phrases": plan.avoid_phrases,
                            })),
                        )
                        .await;
                    match self.redraft(job, outputs, plan, previous).await {
                        Ok(next) => candidate = next,
                        Err(err) => {
                            warn!(job_id = %job.id, error = %err, "redraft failed, keeping best candidate");
                            return controller.settle().ok_or_else(|| {
                                ContentflowError::Aborted("no scored candidate to settle on".to_string())
                            });
                        }
                    }
                }
            }
        }
    }

    /// Re-runs the drafting step under `plan` and reassembles. Revision
    /// drafts live only in memory; the ledger keeps the first draft.
    async fn redraft(
        &self,
        job: &Job,
        outputs: &BTreeMap<String, StepOutput>,
        plan: RevisionPlan,
        previous: Vec<ArticleSection>,
    ) -> Result<Artifact, StepError> {
        let Some((_, descriptor)) = self.sequence.drafting() else {
            return Err(StepError::unrecoverable("sequence has no drafting step"));
        };
        let attempt = plan.attempt;
        let ctx = StepContext::new(job.id.clone(), job.params.clone(), descriptor.name())
            .with_fallback_required(descriptor.fallback_required())
            .with_prior(outputs.clone())
            .with_revision(plan, previous);
        let output = run_with_timeout(descriptor, &ctx).await?;

        let mut revised = outputs.clone();
        revised.insert(descriptor.name().to_string(), output);
        assemble(&job.id, &job.params, &revised, attempt)
    }

    async fn fail(
        &self,
        job: &Job,
        step: &str,
        err: &StepError,
    ) -> Result<RunOutcome, ContentflowError> {
        let failure = JobFailure {
            step: step.to_string(),
            message: err.to_string(),
        };
        self.store()
            .compare_and_set_job(
                JobState::Running,
                job.transitioned(JobState::Failed, Some(failure.clone())),
            )
            .await?;
        error!(job_id = %job.id, step, error = %err, "job failed");
        self.events
            .emit(
                events::JOB_FAILED,
                Some(json!({"job_id": job.id, "step": step, "error": err.to_dict()})),
            )
            .await;
        Ok(RunOutcome::Failed(failure))
    }

    async fn complete(
        &self,
        job: &Job,
        record: ArtifactRecord,
    ) -> Result<RunOutcome, ContentflowError> {
        self.store()
            .compare_and_set_job(JobState::Running, job.transitioned(JobState::Completed, None))
            .await?;
        let report = record.artifact.quality.as_ref();
        info!(
            job_id = %job.id,
            score = report.map(|r| r.total),
            revisions = record.revision_count,
            words = record.artifact.total_word_count,
            "job completed"
        );
        self.events
            .emit(
                events::JOB_COMPLETED,
                Some(json!({
                    "job_id": job.id,
                    "score": report.map(|r| r.total),
                    "revisions": record.revision_count,
                    "accepted_below_threshold": report.is_some_and(|r| r.accepted_below_threshold),
                })),
            )
            .await;
        Ok(RunOutcome::Completed(Box::new(record)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepStatus;
    use crate::events::CollectingEventSink;
    use crate::ledger::InMemoryLedgerStore;
    use crate::steps::{FnStep, StepDescriptor};
    use pretty_assertions::assert_eq;

    fn ok_step(name: &str) -> StepDescriptor {
        StepDescriptor::new(Arc::new(FnStep::new(name, |ctx: &StepContext| {
            Ok(StepOutput::new(json!({"step": ctx.step_name()})))
        })))
    }

    fn broken_step(name: &str) -> StepDescriptor {
        StepDescriptor::new(Arc::new(FnStep::new(name, |_: &StepContext| {
            Err(StepError::unrecoverable("upstream rejected the request"))
        })))
    }

    #[tokio::test]
    async fn test_failed_step_fails_job() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let sink = Arc::new(CollectingEventSink::new());
        let sequence =
            StepSequence::new(vec![ok_step("a"), broken_step("b"), ok_step("c")]).unwrap();
        let orchestrator = Orchestrator::new(sequence, store.clone()).with_events(sink.clone());

        let job = orchestrator.create_job(JobParams::new("topic")).await.unwrap();
        let outcome = orchestrator.run(&job.id).await.unwrap();

        let failure = JobFailure {
            step: "b".to_string(),
            message: "upstream rejected the request".to_string(),
        };
        assert_eq!(outcome, RunOutcome::Failed(failure.clone()));

        let status = orchestrator.status(&job.id).await.unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.error, Some(failure));
        assert_eq!(
            status.steps.iter().map(|r| r.status).collect::<Vec<_>>(),
            vec![StepStatus::Succeeded, StepStatus::Failed]
        );
        assert_eq!(sink.events_of_type(events::JOB_FAILED).len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_job_is_left_alone() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let sequence = StepSequence::new(vec![broken_step("a")]).unwrap();
        let orchestrator = Orchestrator::new(sequence, store.clone());
        let job = orchestrator.create_job(JobParams::new("topic")).await.unwrap();

        assert_eq!(orchestrator.run(&job.id).await.unwrap().state(), JobState::Failed);
        assert_eq!(
            orchestrator.run(&job.id).await.unwrap(),
            RunOutcome::AlreadyTerminal(JobState::Failed)
        );
        let records = store.list_steps(&job.id).await.unwrap();
        assert_eq!(records[0].attempt, 1);
    }

    #[tokio::test]
    async fn test_missing_outputs_fail_assembly() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let sequence = StepSequence::new(vec![ok_step("a")]).unwrap();
        let orchestrator = Orchestrator::new(sequence, store);
        let job = orchestrator.create_job(JobParams::new("topic")).await.unwrap();

        match orchestrator.run(&job.id).await.unwrap() {
            RunOutcome::Failed(failure) => assert_eq!(failure.step, ASSEMBLE_STEP),
            other => panic!("expected failure, got {other:?}"),
        }

        let status = orchestrator.status(&job.id).await.unwrap();
        assert!(status.failed_after_steps());
        assert_eq!(status.completed_steps(), status.steps.len());
    }

    #[tokio::test]
    async fn test_unknown_job_and_invalid_params() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let orchestrator = Orchestrator::new(StepSequence::new(vec![ok_step("a")]).unwrap(), store);

        assert!(matches!(
            orchestrator.run(&JobId::from("nope")).await,
            Err(ContentflowError::JobNotFound(_))
        ));
        assert!(matches!(
            orchestrator.create_job(JobParams::new("  ")).await,
            Err(ContentflowError::InvalidParams(_))
        ));
    }

    #[tokio::test]
    async fn test_descriptor_fallback_flag_fails_substituted_step() {
        use crate::resilience::FallbackPolicy;
        use crate::steps::{FetchContextStep, FETCH_CONTEXT};

        let store = Arc::new(InMemoryLedgerStore::new());
        let fetch = FetchContextStep::new(Vec::new(), FallbackPolicy::new(FETCH_CONTEXT));
        let sequence = StepSequence::new(vec![
            StepDescriptor::new(Arc::new(fetch)).with_fallback_required(true),
            ok_step("b"),
        ])
        .unwrap();
        let orchestrator = Orchestrator::new(sequence, store.clone());

        let job = orchestrator.create_job(JobParams::new("topic")).await.unwrap();
        let outcome = orchestrator.run(&job.id).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed(ref f) if f.step == FETCH_CONTEXT));

        let record = store.get_step(&job.id, 0).await.unwrap().unwrap();
        assert_eq!(record.status, StepStatus::Failed);
        assert!(record.payload.is_none());
        assert!(store.get_step(&job.id, 1).await.unwrap().is_none());
    }
}
