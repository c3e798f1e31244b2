//! Tracing setup and step timing.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::core::JobId;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `filter`. With `json` set, every line is a JSON
/// object. Returns false if a subscriber was already installed.
pub fn init_tracing(filter: &str, json: bool) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json()).try_init().is_ok()
    } else {
        registry.with(fmt::layer()).try_init().is_ok()
    }
}

/// Attributes describing one step attempt, used as event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpanAttributes {
    /// Owning job.
    pub job_id: JobId,
    /// Step name.
    pub step: String,
    /// Position in the sequence.
    pub index: usize,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Wall time of the attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// Provider that produced the output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// True if the output came from a local substitute.
    #[serde(default)]
    pub degraded: bool,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepSpanAttributes {
    /// Creates attributes for an attempt of `step`.
    #[must_use]
    pub fn new(job_id: JobId, step: impl Into<String>, index: usize, attempt: u32) -> Self {
        Self {
            job_id,
            step: step.into(),
            index,
            attempt,
            duration_ms: None,
            provider: None,
            degraded: false,
            error: None,
        }
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the provider and degraded flag.
    #[must_use]
    pub fn with_provider(mut self, provider: Option<String>, degraded: bool) -> Self {
        self.provider = provider;
        self.degraded = degraded;
        self
    }

    /// Sets the error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Converts to an event payload.
    #[must_use]
    pub fn to_event_data(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "job_id": self.job_id, "step": self.step }))
    }
}

/// Measures how long a span of work takes.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the timer, logs the duration and returns it in milliseconds.
    pub fn finish(self) -> f64 {
        let duration_ms = self.elapsed_ms();
        tracing::debug!(span = %self.name, duration_ms, "span finished");
        duration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_step_attributes_payload() {
        let attrs = StepSpanAttributes::new(JobId::from("job-1"), "build-outline", 2, 1)
            .with_duration_ms(12.5)
            .with_provider(Some("template-outline".to_string()), true);

        assert_eq!(
            attrs.to_event_data(),
            json!({
                "job_id": "job-1",
                "step": "build-outline",
                "index": 2,
                "attempt": 1,
                "duration_ms": 12.5,
                "provider": "template-outline",
                "degraded": true,
            })
        );
    }

    #[test]
    fn test_error_attribute() {
        let attrs = StepSpanAttributes::new(JobId::from("j"), "draft-sections", 3, 2)
            .with_error("auth failed");
        assert_eq!(attrs.to_event_data()["error"], "auth failed");
    }

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("step");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(timer.name(), "step");
        assert!(timer.finish() >= 10.0);
    }
}
