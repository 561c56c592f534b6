//! Per-step-type executors.
//!
//! Every executor reports failure through [`StepResult`]; none of them
//! return `Err` or panic out of a step.

pub mod condition;
pub mod error_handler;
pub mod input;
pub mod loop_step;
pub mod output;
pub mod parallel;
pub mod task;
pub mod thought;
pub mod tool;

use serde_json::Value;
use weft_types::execution::StepResult;
use weft_types::workflow::WorkflowStep;

use super::context::ExecutionContext;

/// Bind `value` under the step's `output_key` (if any) and report success.
pub(crate) fn store_output(step: &WorkflowStep, ctx: &mut ExecutionContext, value: Value) -> StepResult {
    if let Some(key) = step.config.output_key.as_deref() {
        if let Err(e) = ctx.set_output(key, value.clone()) {
            return StepResult::failed(format!("step '{}': {e}", step.id), 0);
        }
    }
    StepResult::ok(Some(value), 0)
}
