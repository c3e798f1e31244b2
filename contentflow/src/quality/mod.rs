//! The quality gate: a fixed rubric of pure checks over an assembled
//! artifact.
//!
//! Scores are deterministic. The same artifact and target always produce
//! an identical [`QualityReport`](crate::core::QualityReport).

mod gate;
mod text;

pub use gate::{DegradedPolicy, QualityConfig, QualityGate};
pub use text::{count_phrase, first_words, keyword_present, word_count};
