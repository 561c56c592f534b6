//! Output steps: surface a previously stored output unchanged.

use weft_types::execution::StepResult;
use weft_types::workflow::WorkflowStep;

use crate::workflow::context::ExecutionContext;

pub fn execute(step: &WorkflowStep, ctx: &mut ExecutionContext) -> StepResult {
    let key = step.config.output_key.as_deref().unwrap_or("result");
    StepResult::ok(ctx.output(key).cloned(), 0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use weft_types::workflow::StepType;

    use super::*;

    #[test]
    fn test_output_defaults_to_result_key() {
        let step = WorkflowStep::new("out", StepType::Output);
        let mut ctx = ExecutionContext::default();
        ctx.set_output("result", json!({"done": true})).unwrap();

        let result = execute(&step, &mut ctx);
        assert!(result.success);
        assert_eq!(result.output, Some(json!({"done": true})));
    }

    #[test]
    fn test_output_missing_key_is_empty() {
        let mut step = WorkflowStep::new("out", StepType::Output);
        step.config.output_key = Some("absent".into());
        let result = execute(&step, &mut ExecutionContext::default());
        assert!(result.success);
        assert_eq!(result.output, None);
    }
}
