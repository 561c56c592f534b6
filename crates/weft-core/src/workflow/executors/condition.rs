//! Condition steps: evaluate the step's expression and pick a branch.
//!
//! Branch selection order:
//! 1. the branch whose id is `"true"` / `"false"` matching the result
//! 2. the first branch whose own condition is truthy
//! 3. the first declared branch
//!
//! The selection is recorded in [`ExecutionContext::branches`]; the engine
//! reads it to decide which successor edge is active. A condition step
//! without branches records `"true"` or `"false"` and gates its `next` edges.

use serde_json::{Value, json};
use weft_types::execution::StepResult;
use weft_types::workflow::{BranchConfig, WorkflowStep};

use super::store_output;
use crate::workflow::context::ExecutionContext;
use crate::workflow::expression::{ExpressionError, evaluate_condition};

pub fn execute(step: &WorkflowStep, ctx: &mut ExecutionContext) -> StepResult {
    let result = match step.condition.as_deref() {
        Some(source) => match evaluate_condition(source, ctx) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(step_id = %step.id, error = %e, "condition failed to evaluate");
                return StepResult::failed(format!("step '{}': {e}", step.id), 0);
            }
        },
        None => false,
    };

    let branch = match select_branch(&step.branches, result, ctx) {
        Ok(branch) => branch,
        Err(e) => return StepResult::failed(format!("step '{}': {e}", step.id), 0),
    };

    let recorded = match branch {
        Some(branch) => branch.id.clone(),
        None => result.to_string(),
    };
    ctx.branches.insert(step.id.clone(), recorded);
    tracing::debug!(
        step_id = %step.id,
        result,
        branch = branch.map(|b| b.id.as_str()),
        "condition evaluated"
    );

    let output = json!({
        "condition": result,
        "branch": branch.map_or(Value::Null, |b| Value::String(b.id.clone())),
    });
    store_output(step, ctx, output)
}

fn select_branch<'a>(
    branches: &'a [BranchConfig],
    result: bool,
    ctx: &ExecutionContext,
) -> Result<Option<&'a BranchConfig>, ExpressionError> {
    let wanted = if result { "true" } else { "false" };
    if let Some(branch) = branches.iter().find(|b| b.id == wanted) {
        return Ok(Some(branch));
    }

    for branch in branches {
        if let Some(source) = branch.condition.as_deref() {
            if evaluate_condition(source, ctx)? {
                return Ok(Some(branch));
            }
        }
    }

    Ok(branches.first())
}
