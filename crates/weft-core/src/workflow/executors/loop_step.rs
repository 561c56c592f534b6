//! Loop steps: run a single body step repeatedly.
//!
//! Each iteration runs on a fresh copy of the context with `iteration`
//! (1-based) bound as a variable, so a body with an `output_key` can write it
//! once per iteration. `loop_condition` is checked after every iteration with
//! `result` bound to that iteration's output; the loop continues while it is
//! truthy and never exceeds `max_iterations`. Only the final iteration's
//! context is folded back.

use std::time::Duration;

use serde_json::{Value, json};
use weft_types::execution::StepResult;
use weft_types::workflow::WorkflowStep;

use super::store_output;
use crate::workflow::context::ExecutionContext;
use crate::workflow::expression::evaluate_condition;
use crate::workflow::runner::StepRunner;

pub async fn execute(
    runner: &StepRunner<'_>,
    step: &WorkflowStep,
    ctx: &mut ExecutionContext,
) -> StepResult {
    let Some(body_id) = step.config.body.as_deref() else {
        return StepResult::failed(format!("loop step '{}' has no body", step.id), 0);
    };
    let Some(body) = runner.step(body_id) else {
        return StepResult::failed(
            format!("loop step '{}' references unknown step '{body_id}'", step.id),
            0,
        );
    };

    let max_iterations = step
        .config
        .max_iterations
        .unwrap_or(runner.config().default_max_iterations);
    let delay = step.config.delay_ms.map(Duration::from_millis);

    let mut results = Vec::new();
    let mut last_ctx = None;
    let mut failure = None;

    for iteration in 1..=max_iterations {
        if iteration > 1 {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }

        let mut scratch = ctx.clone();
        scratch.variables.insert("iteration".into(), json!(iteration));
        let result = runner.run_child(body, &mut scratch).await;
        results.push(result.output.clone().unwrap_or(Value::Null));

        if !result.success {
            let err = result.error.unwrap_or_default();
            tracing::warn!(step_id = %step.id, iteration, error = %err, "loop body failed");
            failure = Some(format!(
                "loop step '{}' failed on iteration {iteration}: {err}",
                step.id
            ));
            last_ctx = Some(scratch);
            break;
        }

        let keep_going = match step.config.loop_condition.as_deref() {
            Some(source) => {
                scratch
                    .variables
                    .insert("result".into(), result.output.unwrap_or(Value::Null));
                match evaluate_condition(source, &scratch) {
                    Ok(keep_going) => keep_going,
                    Err(e) => {
                        failure = Some(format!("loop step '{}': {e}", step.id));
                        last_ctx = Some(scratch);
                        break;
                    }
                }
            }
            None => true,
        };
        last_ctx = Some(scratch);
        if !keep_going {
            break;
        }
    }

    let iterations = results.len();
    tracing::debug!(step_id = %step.id, iterations, "loop finished");

    if let Some(last) = last_ctx {
        ctx.absorb(last);
    }

    let output = json!({
        "iterations": iterations,
        "results": results,
    });
    match failure {
        None => store_output(step, ctx, output),
        Some(error) => StepResult {
            success: false,
            output: Some(output),
            error: Some(error),
            duration_ms: 0,
        },
    }
}
