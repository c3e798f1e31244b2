//! Step descriptors: a step plus how the orchestrator should run it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::Step;

/// Whether the revision loop may re-invoke a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepRole {
    /// Runs once per job.
    #[default]
    Standard,
    /// Produces the article sections and is re-run on revision.
    Drafting,
}

/// An entry in a step sequence.
#[derive(Clone)]
pub struct StepDescriptor {
    name: String,
    step: Arc<dyn Step>,
    fallback_required: bool,
    timeout: Duration,
    max_attempts: u32,
    role: StepRole,
}

impl fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("name", &self.name)
            .field("fallback_required", &self.fallback_required)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl StepDescriptor {
    /// Describes `step` with a 10 minute timeout and a single attempt.
    pub fn new(step: Arc<dyn Step>) -> Self {
        Self {
            name: step.name().to_string(),
            step,
            fallback_required: false,
            timeout: Duration::from_secs(600),
            max_attempts: 1,
            role: StepRole::Standard,
        }
    }

    /// Sets the overall step timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how many times a retryable step failure is attempted.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Marks the step as having no acceptable local substitute.
    #[must_use]
    pub fn with_fallback_required(mut self, required: bool) -> Self {
        self.fallback_required = required;
        self
    }

    /// Marks the step as the drafting step.
    #[must_use]
    pub fn drafting(mut self) -> Self {
        self.role = StepRole::Drafting;
        self
    }

    /// Step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The step.
    #[must_use]
    pub fn step(&self) -> &Arc<dyn Step> {
        &self.step
    }

    /// Whether exhaustion fails the step.
    #[must_use]
    pub const fn fallback_required(&self) -> bool {
        self.fallback_required
    }

    /// Overall step timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Attempts per run.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Role in the revision loop.
    #[must_use]
    pub const fn role(&self) -> StepRole {
        self.role
    }
}
