//! What a step sees and what it returns.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{ArticleSection, JobId, JobParams};
use crate::errors::StepError;
use crate::resilience::{FallbackOutcome, FallbackPolicy};
use crate::revision::RevisionPlan;

/// The result of one step, stored as the step record's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    /// Step-defined data.
    pub data: serde_json::Value,
    /// True when a local substitute produced the data.
    #[serde(default)]
    pub degraded: bool,
    /// The provider that produced the data, if any.
    #[serde(default)]
    pub provider: Option<String>,
}

impl StepOutput {
    /// Wraps data produced without an external provider.
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            data,
            degraded: false,
            provider: None,
        }
    }

    /// Serializes a typed value.
    pub fn from_value<T: Serialize>(value: &T) -> Result<Self, StepError> {
        serde_json::to_value(value)
            .map(Self::new)
            .map_err(|e| StepError::unrecoverable(format!("failed to serialize output: {e}")))
    }

    /// Serializes the value of a fallback outcome, keeping its provenance.
    pub fn from_outcome<T: Serialize>(outcome: &FallbackOutcome<T>) -> Result<Self, StepError> {
        Ok(Self {
            degraded: outcome.degraded,
            provider: Some(outcome.provider.clone()),
            ..Self::from_value(&outcome.value)?
        })
    }

    /// Marks the output as degraded.
    #[must_use]
    pub fn with_degraded(mut self, degraded: bool) -> Self {
        self.degraded = degraded;
        self
    }

    /// Sets the provider.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Decodes `data` as `T`. `step` names the producer in the error.
    pub fn decode<T: DeserializeOwned>(&self, step: &str) -> Result<T, StepError> {
        serde_json::from_value(self.data.clone()).map_err(|e| StepError::InvalidPayload {
            step: step.to_string(),
            message: e.to_string(),
        })
    }

    /// The ledger payload for this output.
    pub fn to_payload(&self) -> Result<serde_json::Value, StepError> {
        serde_json::to_value(self)
            .map_err(|e| StepError::unrecoverable(format!("failed to serialize output: {e}")))
    }

    /// Reads an output back from a ledger payload.
    pub fn from_payload(step: &str, payload: serde_json::Value) -> Result<Self, StepError> {
        serde_json::from_value(payload).map_err(|e| StepError::InvalidPayload {
            step: step.to_string(),
            message: e.to_string(),
        })
    }
}

/// Inputs of one step execution.
#[derive(Debug, Clone)]
pub struct StepContext {
    job_id: JobId,
    params: JobParams,
    step_name: String,
    prior: BTreeMap<String, StepOutput>,
    revision: Option<RevisionPlan>,
    previous_sections: Vec<ArticleSection>,
    fallback_required: bool,
}

impl StepContext {
    /// Creates a context with no prior outputs.
    pub fn new(job_id: JobId, params: JobParams, step_name: impl Into<String>) -> Self {
        Self {
            job_id,
            params,
            step_name: step_name.into(),
            prior: BTreeMap::new(),
            revision: None,
            previous_sections: Vec::new(),
            fallback_required: false,
        }
    }

    /// Sets the outputs of earlier steps, keyed by step name.
    #[must_use]
    pub fn with_prior(mut self, prior: BTreeMap<String, StepOutput>) -> Self {
        self.prior = prior;
        self
    }

    /// Adds one earlier output.
    #[must_use]
    pub fn with_output(mut self, step: impl Into<String>, output: StepOutput) -> Self {
        self.prior.insert(step.into(), output);
        self
    }

    /// Marks this execution as a revision pass.
    #[must_use]
    pub fn with_revision(mut self, plan: RevisionPlan, previous: Vec<ArticleSection>) -> Self {
        self.revision = Some(plan);
        self.previous_sections = previous;
        self
    }

    /// Marks the running step as having no acceptable local substitute.
    #[must_use]
    pub fn with_fallback_required(mut self, required: bool) -> Self {
        self.fallback_required = required;
        self
    }

    /// Whether provider exhaustion must fail the running step.
    #[must_use]
    pub const fn fallback_required(&self) -> bool {
        self.fallback_required
    }

    /// The policy a step runs its providers under: `base`, made
    /// fallback-required when the running step is.
    #[must_use]
    pub fn policy(&self, base: &FallbackPolicy) -> FallbackPolicy {
        let required = base.fallback_required() || self.fallback_required;
        base.clone().with_fallback_required(required)
    }

    /// The job.
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// The job parameters.
    #[must_use]
    pub fn params(&self) -> &JobParams {
        &self.params
    }

    /// The running step.
    #[must_use]
    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// The revision plan, on revision passes.
    #[must_use]
    pub fn revision(&self) -> Option<&RevisionPlan> {
        self.revision.as_ref()
    }

    /// Sections of the draft being revised.
    #[must_use]
    pub fn previous_sections(&self) -> &[ArticleSection] {
        &self.previous_sections
    }

    /// The raw output of an earlier step.
    #[must_use]
    pub fn output(&self, step: &str) -> Option<&StepOutput> {
        self.prior.get(step)
    }

    /// Decodes the output of an earlier step.
    pub fn input<T: DeserializeOwned>(&self, step: &str) -> Result<T, StepError> {
        self.output(step)
            .ok_or_else(|| StepError::MissingInput {
                step: self.step_name.clone(),
                input: step.to_string(),
            })?
            .decode(step)
    }
}
