//! Job execution.
//!
//! This module provides:
//! - [`StepSequence`], the ordered list of step descriptors
//! - [`StepExecutor`], which runs one step with timeout and attempts
//! - artifact assembly and citation injection
//! - [`Orchestrator`], the resumable per-job run loop
//! - [`JobStatusView`], the status polling surface
//! - [`standard_sequence`], the seven content steps wired from config

mod assembly;
mod executor;
mod orchestrator;
mod sequence;
mod standard;
mod status;


pub use assembly::{assemble, inject_citations};
pub use executor::{run_with_timeout, StepExecutor, StepOutcome};
pub use orchestrator::{Orchestrator, RunOutcome, ASSEMBLE_STEP};
pub use sequence::StepSequence;
pub use standard::{standard_sequence, StepProviders};
pub use status::JobStatusView;
