//! Step dispatch: picks the executor for a step type and applies the step's
//! timeout, retry and fallback policy.
//!
//! Flow-control executors (parallel, loop) call back into the runner for
//! their child steps, so [`StepRunner::execute`] returns a boxed future to
//! break the async recursion.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use weft_types::config::EngineConfig;
use weft_types::execution::{StepResult, StepStatus};
use weft_types::workflow::{StepType, Workflow, WorkflowStep};

use crate::invoker::{BoxReasoningProvider, BoxToolInvoker};

use super::context::ExecutionContext;
use super::executors::{condition, error_handler, input, loop_step, output, parallel, task, thought, tool};

/// Runs individual steps of one workflow with injected collaborators.
pub struct StepRunner<'a> {
    steps: HashMap<&'a str, &'a WorkflowStep>,
    tools: &'a BoxToolInvoker,
    reasoning: &'a BoxReasoningProvider,
    config: &'a EngineConfig,
}

impl<'a> StepRunner<'a> {
    pub fn new(
        workflow: &'a Workflow,
        tools: &'a BoxToolInvoker,
        reasoning: &'a BoxReasoningProvider,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            steps: workflow.steps.iter().map(|s| (s.id.as_str(), s)).collect(),
            tools,
            reasoning,
            config,
        }
    }

    pub fn step(&self, id: &str) -> Option<&'a WorkflowStep> {
        self.steps.get(id).copied()
    }

    pub fn tools(&self) -> &BoxToolInvoker {
        self.tools
    }

    pub fn reasoning(&self) -> &BoxReasoningProvider {
        self.reasoning
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    /// Run a step with its full failure policy: retries, then fallback.
    pub async fn run_step(&self, step: &WorkflowStep, ctx: &mut ExecutionContext) -> StepResult {
        let result = self.execute_with_policy(step, ctx).await;
        if result.success {
            return result;
        }

        let fallback_id = step
            .error_handling
            .as_ref()
            .and_then(|eh| eh.fallback.as_deref());
        match fallback_id.and_then(|id| self.step(id)) {
            Some(fallback) => error_handler::execute_fallback(self, step, fallback, ctx).await,
            None => result,
        }
    }

    /// Run a step, retrying when the step declares retries.
    pub async fn execute_with_policy(
        &self,
        step: &WorkflowStep,
        ctx: &mut ExecutionContext,
    ) -> StepResult {
        let (max_retries, retry_delay_ms) = match &step.error_handling {
            Some(eh) if eh.max_retries > 0 => (eh.max_retries, eh.retry_delay_ms),
            _ => (step.config.retries.unwrap_or(0), 0),
        };

        if max_retries == 0 {
            return self.execute(step, ctx).await;
        }
        error_handler::execute_with_retry(
            self,
            step,
            ctx,
            max_retries,
            Duration::from_millis(retry_delay_ms),
        )
        .await
    }

    /// Run a single attempt of a step, enforcing `timeout_ms`.
    ///
    /// A timeout fails the step; the workflow run decides what happens next.
    pub fn execute<'s>(
        &'s self,
        step: &'s WorkflowStep,
        ctx: &'s mut ExecutionContext,
    ) -> BoxFuture<'s, StepResult> {
        async move {
            let started = Instant::now();
            let dispatch = self.dispatch(step, ctx);
            let mut result = match step.config.timeout_ms {
                Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), dispatch).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(step_id = %step.id, timeout_ms = ms, "step timed out");
                        StepResult::failed(format!("step '{}' timed out after {ms}ms", step.id), 0)
                    }
                },
                None => dispatch.await,
            };
            result.duration_ms = started.elapsed().as_millis() as u64;
            result
        }
        .boxed()
    }

    async fn dispatch(&self, step: &WorkflowStep, ctx: &mut ExecutionContext) -> StepResult {
        tracing::debug!(step_id = %step.id, step_type = %step.step_type, "dispatching step");
        match step.step_type {
            StepType::Tool => tool::execute(self, step, ctx).await,
            StepType::Thought => thought::execute(self, step, ctx).await,
            StepType::Task => task::execute(step, ctx),
            StepType::Input => input::execute(step, ctx),
            StepType::Output => output::execute(step, ctx),
            StepType::Condition => condition::execute(step, ctx),
            StepType::Parallel => parallel::execute(self, step, ctx).await,
            StepType::Loop => loop_step::execute(self, step, ctx).await,
        }
    }

    /// Run an owned child step (parallel child, loop body, fallback) and
    /// record its status in `ctx`.
    pub async fn run_child(&self, child: &WorkflowStep, ctx: &mut ExecutionContext) -> StepResult {
        ctx.set_status(&child.id, StepStatus::Running);
        let result = self.run_step(child, ctx).await;
        let status = if result.success {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        ctx.set_status(&child.id, status);
        result
    }
}
