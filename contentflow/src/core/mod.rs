//! Core domain model types for contentflow.
//!
//! This module contains the durable rows and value types shared by every
//! other module:
//! - Job and step status enums
//! - Jobs, step records and artifacts
//! - Quality reports

mod artifact;
mod job;
mod report;
mod status;
mod step;

pub use artifact::{
    Artifact, ArticleSection, ArtifactRecord, ExternalReference, FaqItem, HeadingLevel,
    InternalLink, SeoMetadata,
};
pub use job::{
    Job, JobFailure, JobId, JobParams, DEFAULT_TARGET_WORDS, MAX_TARGET_WORDS, MIN_TARGET_WORDS,
};
pub use report::{CheckKind, QualityCheck, QualityReport};
pub use status::{JobState, StepStatus};
pub use step::StepRecord;
