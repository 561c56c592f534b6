//! Parallel steps: run child steps in fixed batches of at most `concurrency`.
//!
//! Each child runs on a snapshot of the context taken at the start of its
//! batch, so siblings in one batch cannot see each other's outputs. After a
//! batch finishes its contexts are folded back in declaration order. Every
//! batch runs even when an earlier one had failures.

use futures_util::future::join_all;
use serde_json::{Map, Value};
use weft_types::execution::StepResult;
use weft_types::workflow::WorkflowStep;

use crate::workflow::context::ExecutionContext;
use crate::workflow::runner::StepRunner;

pub async fn execute(
    runner: &StepRunner<'_>,
    step: &WorkflowStep,
    ctx: &mut ExecutionContext,
) -> StepResult {
    let mut children = Vec::with_capacity(step.config.steps.len());
    for id in &step.config.steps {
        match runner.step(id) {
            Some(child) => children.push(child),
            None => {
                return StepResult::failed(
                    format!("parallel step '{}' references unknown step '{id}'", step.id),
                    0,
                );
            }
        }
    }

    let concurrency = step
        .config
        .concurrency
        .unwrap_or(runner.config().default_concurrency)
        .max(1);
    tracing::debug!(
        step_id = %step.id,
        children = children.len(),
        concurrency,
        "running parallel children"
    );

    let mut results = Map::new();
    let mut failed = Vec::new();

    for batch in children.chunks(concurrency) {
        let runs = batch.iter().map(|child| {
            let mut scratch = ctx.clone();
            async move {
                let result = runner.run_child(child, &mut scratch).await;
                (*child, result, scratch)
            }
        });

        for (child, result, scratch) in join_all(runs).await {
            for key in ctx.absorb(scratch) {
                tracing::warn!(
                    step_id = %step.id,
                    child = %child.id,
                    output_key = %key,
                    "parallel child output conflicts with an existing output, keeping the first"
                );
            }
            if !result.success {
                failed.push(child.id.clone());
            }
            let value = serde_json::to_value(&result).unwrap_or(Value::Null);
            results.insert(child.id.clone(), value);
        }
    }

    let output = Value::Object(results);
    if failed.is_empty() {
        return super::store_output(step, ctx, output);
    }

    tracing::warn!(step_id = %step.id, failed = ?failed, "parallel children failed");
    StepResult {
        success: false,
        output: Some(output),
        error: Some(format!(
            "parallel step '{}': {} of {} children failed: {}",
            step.id,
            failed.len(),
            children.len(),
            failed.join(", ")
        )),
        duration_ms: 0,
    }
}
