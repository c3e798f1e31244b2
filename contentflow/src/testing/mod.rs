//! Test support: sample artifacts and deterministic providers.
//!
//! [`FixtureLanguageModel`] answers every step's request from the request
//! hints, so whole jobs can run without network access.

mod fixtures;
mod mocks;

pub use fixtures::{filler_words, padded, sample_artifact, SAMPLE_TOPIC};
pub use mocks::{FixtureLanguageModel, ScriptedSearchProvider};
