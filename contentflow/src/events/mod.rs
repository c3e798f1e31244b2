//! Lifecycle events.
//!
//! The orchestrator reports job and step transitions to an [`EventSink`]
//! handed to it at construction. Event payloads are JSON objects that
//! always carry `job_id`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A job moved from pending to running, or was resumed.
pub const JOB_STARTED: &str = "job.started";
/// A job finished with an artifact.
pub const JOB_COMPLETED: &str = "job.completed";
/// A job failed on an unrecoverable step error.
pub const JOB_FAILED: &str = "job.failed";
/// A step attempt began.
pub const STEP_STARTED: &str = "step.started";
/// A step committed its output.
pub const STEP_SUCCEEDED: &str = "step.succeeded";
/// A step attempt failed.
pub const STEP_FAILED: &str = "step.failed";
/// A step was already committed and was not run again.
pub const STEP_SKIPPED: &str = "step.skipped";
/// An artifact was scored.
pub const QUALITY_SCORED: &str = "quality.scored";
/// The drafting step is being re-run with a revision plan.
pub const REVISION_STARTED: &str = "revision.started";
