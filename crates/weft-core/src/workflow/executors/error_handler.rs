//! Retry and fallback policy for failing steps.

use std::time::Duration;

use weft_types::execution::{StepResult, StepStatus};
use weft_types::workflow::WorkflowStep;

use crate::workflow::context::ExecutionContext;
use crate::workflow::runner::StepRunner;

/// Run `step` up to `max_retries + 1` times with linear backoff.
///
/// Retry `k` (1-based) waits `retry_delay * k` before starting. Every attempt
/// runs on a copy of `ctx`; the copy of the successful (or last) attempt is
/// committed, so a failed attempt never leaves half-written outputs behind.
pub async fn execute_with_retry(
    runner: &StepRunner<'_>,
    step: &WorkflowStep,
    ctx: &mut ExecutionContext,
    max_retries: u32,
    retry_delay: Duration,
) -> StepResult {
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let backoff = retry_delay * attempt;
            tracing::debug!(
                step_id = %step.id,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "retrying step"
            );
            tokio::time::sleep(backoff).await;
        }

        let mut scratch = ctx.clone();
        let mut result = runner.execute(step, &mut scratch).await;

        if result.success {
            *ctx = scratch;
            return result;
        }

        if attempt >= max_retries {
            *ctx = scratch;
            let last = result.error.take().unwrap_or_default();
            tracing::warn!(step_id = %step.id, retries = max_retries, error = %last, "step retries exhausted");
            result.error = Some(format!(
                "step '{}' failed after {max_retries} retries: {last}",
                step.id
            ));
            return result;
        }

        tracing::debug!(
            step_id = %step.id,
            attempt = attempt + 1,
            error = result.error.as_deref().unwrap_or_default(),
            "step attempt failed"
        );
        attempt += 1;
    }
}

/// Run `fallback` in place of the failed `step`.
///
/// The fallback keeps its own retry policy but never chains into a further
/// fallback. Its status is recorded in `ctx`.
pub async fn execute_fallback(
    runner: &StepRunner<'_>,
    step: &WorkflowStep,
    fallback: &WorkflowStep,
    ctx: &mut ExecutionContext,
) -> StepResult {
    tracing::info!(step_id = %step.id, fallback = %fallback.id, "running fallback step");

    ctx.set_status(&fallback.id, StepStatus::Running);
    let mut result = runner.execute_with_policy(fallback, ctx).await;

    if result.success {
        ctx.set_status(&fallback.id, StepStatus::Completed);
    } else {
        ctx.set_status(&fallback.id, StepStatus::Failed);
        let err = result.error.take().unwrap_or_default();
        result.error = Some(format!(
            "fallback '{}' for step '{}' failed: {err}",
            fallback.id, step.id
        ));
    }
    result
}
