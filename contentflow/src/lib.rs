//! # Contentflow
//!
//! Durable, resumable content-generation jobs.
//!
//! A job turns a topic into a publish-ready article through a fixed
//! sequence of steps:
//!
//! - **Step ledger**: every step attempt is recorded, so a restarted job
//!   resumes from the first step that did not succeed
//! - **Provider fallback**: each step tries its providers in priority order
//!   and ends on a local substitute marked as degraded
//! - **Quality gate**: the assembled article is scored by ten checks
//! - **Bounded revision**: failing drafts are redrafted with a plan built
//!   from the failed checks, up to a configured limit
//! - **Non-blocking dispatch**: jobs run in the background and are polled
//!   by id
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use contentflow::prelude::*;
//!
//! let config = ContentflowConfig::from_env()?;
//! let providers = StepProviders::from_config(&config)?;
//! let sequence = standard_sequence(&config, &providers)?;
//! let orchestrator = Orchestrator::new(sequence, Arc::new(InMemoryLedgerStore::new()))
//!     .with_quality(config.quality.clone());
//!
//! let dispatcher = JobDispatcher::new(Arc::new(orchestrator));
//! let handle = dispatcher.submit(JobParams::new("remote work tools")).await?;
//! let state = handle.wait().await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod quality;
pub mod resilience;
pub mod revision;
pub mod steps;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ContentflowConfig, ProviderSettings};
    pub use crate::core::{
        Artifact, ArtifactRecord, CheckKind, Job, JobFailure, JobId, JobParams, JobState,
        QualityReport, StepRecord, StepStatus,
    };
    pub use crate::dispatcher::{JobDispatcher, JobHandle};
    pub use crate::errors::{ContentflowError, LedgerError, ProviderError, StepError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::ledger::{FileLedgerStore, InMemoryLedgerStore, LedgerStore, StepLedger};
    pub use crate::pipeline::{
        standard_sequence, JobStatusView, Orchestrator, RunOutcome, StepProviders, StepSequence,
    };
    pub use crate::providers::{LanguageModel, SearchProvider};
    pub use crate::quality::{QualityConfig, QualityGate};
    pub use crate::revision::{RevisionController, RevisionDecision, RevisionPlan};
    pub use crate::steps::{Step, StepContext, StepDescriptor, StepOutput};
    pub use crate::utils::{iso_timestamp, now_utc, Timestamp};
}
