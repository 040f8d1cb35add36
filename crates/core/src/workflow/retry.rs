use crate::error::EngineError;
use crate::steps::{RunContext, StepExecutor};
use crate::types::{RetryPolicy, StepConfig};
use anyhow::anyhow;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome of an attempt sequence: the data from the last attempt if it
/// succeeded, how many attempts were made, and the final error otherwise.
pub struct RetryOutcome {
    pub data: Option<serde_json::Value>,
    pub attempts: u32,
    pub error: Option<anyhow::Error>,
}

impl RetryOutcome {
    fn cancelled(attempts: u32) -> Self {
        Self {
            data: None,
            attempts,
            error: Some(anyhow!(EngineError::Cancelled)),
        }
    }
}

/// Run a single step invocation with bounded, exponentially backed-off
/// re-attempts.
///
/// Absent a policy the step gets exactly one attempt. With a policy,
/// `max_attempts` is normalized to at least 1; between failed attempts the
/// controller waits out the current delay, then grows it by `multiplier`
/// (values <= 0 keep it constant) capped at `max_delay`. Both the wait and
/// the attempt itself race the cancellation token. A `timeout_ms` bounds
/// each individual attempt.
pub async fn run_with_retry(
    executor: &dyn StepExecutor,
    config: &StepConfig,
    ctx: &RunContext,
    policy: Option<&RetryPolicy>,
    timeout_ms: Option<u64>,
    cancel: &CancellationToken,
) -> RetryOutcome {
    let max_attempts = policy.map(|p| p.max_attempts.max(1)).unwrap_or(1);
    let mut delay = Duration::from_millis(policy.map(|p| p.delay_ms).unwrap_or(0));
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        let result = tokio::select! {
            result = attempt_once(executor, config, ctx, timeout_ms) => result,
            _ = cancel.cancelled() => return RetryOutcome::cancelled(attempt),
        };

        match result {
            Ok(data) => {
                return RetryOutcome {
                    data: Some(data),
                    attempts: attempt,
                    error: None,
                }
            }
            Err(err) => {
                tracing::warn!(attempt, max_attempts, error = %err, "step attempt failed");
                last_error = Some(err);
            }
        }

        // only wait when another attempt follows
        if attempt < max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return RetryOutcome::cancelled(attempt),
            }
            if let Some(policy) = policy {
                if policy.multiplier > 0.0 {
                    let grown = delay.as_millis() as f64 * policy.multiplier;
                    let capped = match policy.max_delay_ms {
                        Some(cap) => grown.min(cap as f64),
                        None => grown,
                    };
                    delay = Duration::from_millis(capped as u64);
                }
            }
        }
    }

    let last_error = last_error.unwrap_or_else(|| anyhow!("step failed"));
    let error = if policy.is_some() {
        anyhow!("max retry attempts reached ({max_attempts}): {last_error:#}")
    } else {
        last_error
    };
    RetryOutcome {
        data: None,
        attempts: max_attempts,
        error: Some(error),
    }
}

async fn attempt_once(
    executor: &dyn StepExecutor,
    config: &StepConfig,
    ctx: &RunContext,
    timeout_ms: Option<u64>,
) -> anyhow::Result<serde_json::Value> {
    match timeout_ms {
        Some(ms) => {
            match tokio::time::timeout(Duration::from_millis(ms), executor.execute(config, ctx))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(anyhow!("step timed out after {ms}ms")),
            }
        }
        None => executor.execute(config, ctx).await,
    }
}
