//! Input steps: expose caller input as a step result.

use serde_json::Value;
use weft_types::execution::StepResult;
use weft_types::workflow::WorkflowStep;

use crate::workflow::context::ExecutionContext;

/// Returns `variables[output_key ?? "input"]`, or every variable when that
/// key is not bound.
pub fn execute(step: &WorkflowStep, ctx: &mut ExecutionContext) -> StepResult {
    let key = step.config.output_key.as_deref().unwrap_or("input");
    let value = match ctx.variables.get(key) {
        Some(value) => value.clone(),
        None => Value::Object(
            ctx.variables
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
    };
    StepResult::ok(Some(value), 0)
}
