//! The ordered list of steps a job runs.

use std::collections::HashSet;

use crate::errors::ContentflowError;
use crate::steps::{StepDescriptor, StepRole};

/// A validated, ordered list of step descriptors.
///
/// Names are unique and at most one descriptor has the drafting role.
/// The position of a descriptor is its ledger step index.
#[derive(Debug, Clone)]
pub struct StepSequence {
    descriptors: Vec<StepDescriptor>,
}

impl StepSequence {
    /// Validates and wraps `descriptors`.
    pub fn new(descriptors: Vec<StepDescriptor>) -> Result<Self, ContentflowError> {
        if descriptors.is_empty() {
            return Err(ContentflowError::InvalidPipeline(
                "a step sequence needs at least one step".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            if !seen.insert(descriptor.name()) {
                return Err(ContentflowError::InvalidPipeline(format!(
                    "duplicate step name '{}'",
                    descriptor.name()
                )));
            }
        }

        let drafting = descriptors
            .iter()
            .filter(|d| d.role() == StepRole::Drafting)
            .count();
        if drafting > 1 {
            return Err(ContentflowError::InvalidPipeline(format!(
                "{drafting} steps claim the drafting role, expected at most one"
            )));
        }

        Ok(Self { descriptors })
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Always false; an empty sequence is rejected by [`StepSequence::new`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptors in run order.
    pub fn iter(&self) -> impl Iterator<Item = &StepDescriptor> {
        self.descriptors.iter()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&StepDescriptor> {
        self.descriptors.get(index)
    }

    /// Step names in run order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(StepDescriptor::name).collect()
    }

    /// The drafting step and its index, if any.
    #[must_use]
    pub fn drafting(&self) -> Option<(usize, &StepDescriptor)> {
        self.descriptors
            .iter()
            .enumerate()
            .find(|(_, d)| d.role() == StepRole::Drafting)
    }
}
