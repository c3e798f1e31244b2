//! Running one step: timeout, step-level attempts, ledger commits and
//! lifecycle events.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::core::JobId;
use crate::errors::{LedgerError, StepError};
use crate::events::{self, EventSink};
use crate::ledger::{AttemptUpdate, StepLedger};
use crate::observability::{SpanTimer, StepSpanAttributes};
use crate::steps::{StepContext, StepDescriptor, StepOutput};

/// The result of running a step to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The output was committed to the ledger.
    Succeeded(StepOutput),
    /// The step failed for good; the failure is recorded.
    Failed(StepError),
}

fn timeout_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

/// Runs a descriptor's step once under its overall timeout.
///
/// An elapsed timeout becomes [`StepError::TimedOut`].
pub async fn run_with_timeout(
    descriptor: &StepDescriptor,
    ctx: &StepContext,
) -> Result<StepOutput, StepError> {
    tokio::time::timeout(descriptor.timeout(), descriptor.step().execute(ctx))
        .await
        .unwrap_or_else(|_| {
            Err(StepError::TimedOut {
                step: descriptor.name().to_string(),
                timeout_ms: timeout_ms(descriptor.timeout()),
            })
        })
}

/// Drives single steps and records every attempt.
#[derive(Clone)]
pub struct StepExecutor {
    ledger: StepLedger,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for StepExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepExecutor")
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl StepExecutor {
    /// Creates an executor writing to `ledger` and emitting to `events`.
    pub fn new(ledger: StepLedger, events: Arc<dyn EventSink>) -> Self {
        Self { ledger, events }
    }

    /// Runs the step at `index` until it succeeds, fails permanently or
    /// uses up the descriptor's attempts.
    ///
    /// Step failures come back as [`StepOutcome::Failed`]. Only ledger
    /// failures are errors, and they end the run.
    pub async fn run(
        &self,
        job_id: &JobId,
        index: usize,
        descriptor: &StepDescriptor,
        ctx: &StepContext,
    ) -> Result<StepOutcome, LedgerError> {
        let name = descriptor.name();
        let max_attempts = descriptor.max_attempts();

        loop {
            let record = self
                .ledger
                .record_attempt(job_id, index, name, AttemptUpdate::Started)
                .await?;
            let attrs = StepSpanAttributes::new(job_id.clone(), name, index, record.attempt);
            self.events
                .emit(events::STEP_STARTED, Some(attrs.to_event_data()))
                .await;

            let timer = SpanTimer::start(name);
            let result = run_with_timeout(descriptor, ctx)
                .await
                .and_then(|output| output.to_payload().map(|payload| (output, payload)));
            let duration_ms = timer.finish();

            match result {
                Ok((output, payload)) => {
                    self.ledger
                        .record_attempt(job_id, index, name, AttemptUpdate::Succeeded(payload))
                        .await?;
                    if output.degraded {
                        warn!(
                            job_id = %job_id,
                            step = name,
                            provider = output.provider.as_deref().unwrap_or("unknown"),
                            "step succeeded with degraded output"
                        );
                    }
                    info!(job_id = %job_id, step = name, attempt = record.attempt, duration_ms, "step succeeded");
                    let attrs = attrs
                        .with_duration_ms(duration_ms)
                        .with_provider(output.provider.clone(), output.degraded);
                    self.events
                        .emit(events::STEP_SUCCEEDED, Some(attrs.to_event_data()))
                        .await;
                    return Ok(StepOutcome::Succeeded(output));
                }
                Err(err) => {
                    self.ledger
                        .record_attempt(job_id, index, name, AttemptUpdate::Failed(err.to_string()))
                        .await?;
                    let attrs = attrs
                        .with_duration_ms(duration_ms)
                        .with_error(err.to_string());
                    self.events
                        .emit(events::STEP_FAILED, Some(attrs.to_event_data()))
                        .await;

                    if err.is_retryable() && record.attempt < max_attempts {
                        warn!(
                            job_id = %job_id,
                            step = name,
                            attempt = record.attempt,
                            error = %err,
                            "step failed, retrying"
                        );
                        continue;
                    }
                    error!(
                        job_id = %job_id,
                        step = name,
                        attempt = record.attempt,
                        error = %err,
                        "step failed"
                    );
                    return Ok(StepOutcome::Failed(err));
                }
            }
        }
    }
}
