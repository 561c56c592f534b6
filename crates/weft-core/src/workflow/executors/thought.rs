//! Thought steps: send the substituted prompt to the reasoning provider.

use chrono::Utc;
use serde_json::json;
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
    let prompt = ctx.replace_variables(step.config.prompt.as_deref().unwrap_or_default());

    match runner
        .reasoning()
        .reason(&prompt, step.config.model.as_deref())
        .await
    {
        Ok(thought) => {
            let output = json!({
                "thought": thought,
                "timestamp": Utc::now().to_rfc3339(),
            });
            store_output(step, ctx, output)
        }
        Err(e) => {
            tracing::warn!(step_id = %step.id, error = %e, "reasoning call failed");
            StepResult::failed(e.to_string(), 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use weft_types::workflow::StepType;

    use super::*;
    use crate::invoker::BoxReasoningProvider;
    use crate::invoker::Unconfigured;
    use crate::workflow::executors::testing::{Harness, single_step_workflow};

    fn thought_step() -> WorkflowStep {
        let mut step = WorkflowStep::new("think", StepType::Thought);
        step.config.prompt = Some("Summarize {{topic}}".into());
        step.config.model = Some("small".into());
        step.config.output_key = Some("summary".into());
        step
    }

    #[tokio::test]
    async fn test_thought_output_shape() {
        let harness = Harness::new();
        let wf = single_step_workflow(thought_step());
        let runner = harness.runner(&wf);

        let mut ctx = ExecutionContext::default();
        ctx.variables.insert("topic".into(), json!("rust"));
        let result = execute(&runner, &wf.steps[0], &mut ctx).await;

        assert!(result.success);
        let stored = ctx.output("summary").unwrap();
        assert_eq!(stored["thought"], "[small] Summarize rust");
        assert!(stored["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_unconfigured_provider_fails_step() {
        let mut harness = Harness::new();
        harness.reasoning = BoxReasoningProvider::new(Unconfigured);
        let wf = single_step_workflow(thought_step());
        let runner = harness.runner(&wf);

        let result = execute(&runner, &wf.steps[0], &mut ExecutionContext::default()).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("reasoning provider not configured"));
    }
}
