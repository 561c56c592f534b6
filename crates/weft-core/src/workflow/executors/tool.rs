//! Tool steps: call the injected tool invoker with the substituted input.

use weft_types::execution::StepResult;
use weft_types::workflow::WorkflowStep;

use super::store_output;
use crate::workflow::context::ExecutionContext;
use crate::workflow::runner::StepRunner;

pub async fn execute(
    runner: &StepRunner<'_>,
    step: &WorkflowStep,
    ctx: &mut ExecutionContext,
) -> StepResult {
    let Some(tool) = step.config.tool.as_deref() else {
        return StepResult::failed(format!("step '{}' has no tool configured", step.id), 0);
    };

    let input = ctx.prepare_input(&step.config.input);
    tracing::debug!(step_id = %step.id, tool, "invoking tool");

    match runner.tools().invoke(tool, input).await {
        Ok(value) => store_output(step, ctx, value),
        Err(e) => {
            tracing::warn!(step_id = %step.id, tool, error = %e, "tool invocation failed");
            StepResult::failed(e.to_string(), 0)
        }
    }
}
