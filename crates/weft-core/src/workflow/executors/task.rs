//! Task steps: bookkeeping only, no external call.

use serde_json::json;
use weft_types::execution::StepResult;
use weft_types::workflow::WorkflowStep;

use super::store_output;
use crate::workflow::context::ExecutionContext;

pub fn execute(step: &WorkflowStep, ctx: &mut ExecutionContext) -> StepResult {
    store_output(
        step,
        ctx,
        json!({
            "taskId": step.id,
            "status": "completed",
        }),
    )
}
