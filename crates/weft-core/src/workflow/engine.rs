//! Workflow engine: ready-queue scheduling with durable execution records.
//!
//! The engine validates a workflow, creates a `WorkflowExecution`, and then
//! drives a ready queue over step indices:
//!
//! 1. Every control-flow edge (`next`, branch target, `on_error`) between
//!    scheduled steps counts toward its target's in-degree.
//! 2. A step becomes ready once all of its incoming edges are resolved.
//! 3. A ready step runs if it is a root or at least one incoming edge was
//!    activated; otherwise it is marked `skipped` and its own edges resolve
//!    as inactive.
//!
//! Steps owned by a flow-control step (parallel children, loop bodies,
//! fallback targets) are never scheduled directly, and validation rejects
//! scheduling edges into or out of them. Each step runs at most
//! once, so a diamond join executes once. The execution record is persisted
//! after every step transition, which is what makes pause and resume work:
//! resume replays the recorded statuses through the same queue without
//! re-running anything.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use weft_types::config::EngineConfig;
use weft_types::error::RepositoryError;
use weft_types::execution::{ExecutionStatus, StepResult, StepStatus, WorkflowExecution};
use weft_types::workflow::{StepType, Workflow, WorkflowStep};

use crate::invoker::{BoxReasoningProvider, BoxToolInvoker};
use crate::repository::storage::StorageBackend;

use super::context::ExecutionContext;
use super::graph::{ValidationReport, validate};
use super::runner::StepRunner;

// ---------------------------------------------------------------------------
// ExecutionOutcome
// ---------------------------------------------------------------------------

/// Result of driving an execution until it completes, fails, or pauses.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// True only when the run reached `completed`.
    pub success: bool,
    /// Final persisted state of the execution.
    pub execution: WorkflowExecution,
    /// Value of the last completed output step, or every stored output when
    /// the workflow has no output step.
    pub output: Option<Value>,
    pub error: Option<String>,
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors that prevent the engine from driving an execution.
///
/// Step failures are not engine errors: they end up in
/// [`ExecutionOutcome::error`] and the execution record.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("workflow validation failed: {0}")]
    Validation(ValidationReport),

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("execution {id} is {status}, only paused executions can be resumed")]
    NotResumable { id: Uuid, status: ExecutionStatus },

    #[error("execution {0} is not running")]
    NotRunning(Uuid),

    #[error("execution {execution} belongs to workflow {expected}, not {actual}")]
    WorkflowMismatch {
        execution: Uuid,
        expected: Uuid,
        actual: Uuid,
    },
}

// ---------------------------------------------------------------------------
// Scheduling plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum EdgeKind {
    Next,
    /// Index into the source step's `branches`.
    Branch(usize),
    OnError,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    to: usize,
    kind: EdgeKind,
}

/// Edge lists over step indices for one workflow.
struct Plan {
    outgoing: Vec<Vec<Edge>>,
    in_degree: Vec<usize>,
    owned: Vec<bool>,
}

impl Plan {
    fn build(workflow: &Workflow) -> Self {
        let n = workflow.steps.len();
        let index: HashMap<&str, usize> = workflow
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();
        let owned_ids: HashSet<&str> = workflow.owned_step_ids().into_iter().collect();
        let owned: Vec<bool> = workflow
            .steps
            .iter()
            .map(|s| owned_ids.contains(s.id.as_str()))
            .collect();

        let mut outgoing = vec![Vec::new(); n];
        let mut in_degree = vec![0; n];

        for (from, step) in workflow.steps.iter().enumerate() {
            if owned[from] {
                continue;
            }
            let mut add = |target: &str, kind: EdgeKind| {
                if let Some(&to) = index.get(target) {
                    if !owned[to] {
                        outgoing[from].push(Edge { to, kind });
                        in_degree[to] += 1;
                    }
                }
            };
            for target in &step.next {
                add(target, EdgeKind::Next);
            }
            for (b, branch) in step.branches.iter().enumerate() {
                add(&branch.step_id, EdgeKind::Branch(b));
            }
            if let Some(target) = step.error_handling.as_ref().and_then(|eh| eh.on_error.as_deref()) {
                add(target, EdgeKind::OnError);
            }
        }

        Self {
            outgoing,
            in_degree,
            owned,
        }
    }

    /// Whether step `idx` has a scheduled `on_error` edge to recover through.
    fn redirects(&self, idx: usize) -> bool {
        self.outgoing[idx]
            .iter()
            .any(|e| matches!(e.kind, EdgeKind::OnError))
    }
}

/// Whether `edge` out of a resolved `step` carries control to its target.
fn edge_active(step: &WorkflowStep, status: StepStatus, edge: Edge, ctx: &ExecutionContext) -> bool {
    let selected = ctx.branches.get(&step.id).map(String::as_str);
    match edge.kind {
        EdgeKind::OnError => status == StepStatus::Failed,
        _ if status != StepStatus::Completed => false,
        EdgeKind::Next if step.step_type == StepType::Condition => {
            step.branches.is_empty() && selected == Some("true")
        }
        EdgeKind::Next => true,
        EdgeKind::Branch(b) => selected == Some(step.branches[b].id.as_str()),
    }
}

/// How a scheduler pass ended.
enum RunEnd {
    Completed,
    Failed(String),
    Paused,
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Drives workflow executions against a storage backend.
///
/// Generic over `S: StorageBackend` so the same engine runs against the
/// in-memory store in tests and SQLite in the CLI.
pub struct WorkflowEngine<S: StorageBackend> {
    store: S,
    tools: BoxToolInvoker,
    reasoning: BoxReasoningProvider,
    config: EngineConfig,
    /// Pause signals keyed by execution id, present while a run is active.
    pause_tokens: DashMap<Uuid, CancellationToken>,
}

impl<S: StorageBackend> WorkflowEngine<S> {
    pub fn new(
        store: S,
        tools: BoxToolInvoker,
        reasoning: BoxReasoningProvider,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            tools,
            reasoning,
            config,
            pause_tokens: DashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ids of executions currently being driven by this engine.
    pub fn running(&self) -> Vec<Uuid> {
        self.pause_tokens.iter().map(|entry| *entry.key()).collect()
    }

    /// Run `workflow` from the start with `input` layered over its variables.
    ///
    /// Invalid workflows are rejected before any execution record exists.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        input: HashMap<String, Value>,
    ) -> Result<ExecutionOutcome, EngineError> {
        let report = validate(workflow);
        if !report.valid {
            tracing::warn!(workflow = %workflow.name, errors = %report, "rejecting invalid workflow");
            return Err(EngineError::Validation(report));
        }

        let started = Instant::now();
        let mut ctx = ExecutionContext::new(&workflow.variables, input);
        for step in &workflow.steps {
            ctx.set_status(&step.id, StepStatus::Pending);
        }
        let mut execution = WorkflowExecution::new(workflow.id, ctx.variables.clone());
        execution.step_statuses.clone_from(&ctx.step_statuses);
        self.store.save_execution(&execution).await?;

        tracing::info!(
            execution_id = %execution.id,
            workflow = %workflow.name,
            steps = workflow.steps.len(),
            "starting workflow execution"
        );

        execution.status = ExecutionStatus::Running;
        self.drive(workflow, execution, ctx, started).await
    }

    /// Signal a running execution to pause before its next step.
    pub fn pause(&self, execution_id: Uuid) -> Result<(), EngineError> {
        match self.pause_tokens.get(&execution_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(execution_id = %execution_id, "pause requested");
                Ok(())
            }
            None => Err(EngineError::NotRunning(execution_id)),
        }
    }

    /// Continue a paused execution without re-running resolved steps.
    pub async fn resume(
        &self,
        execution_id: Uuid,
        workflow: &Workflow,
    ) -> Result<ExecutionOutcome, EngineError> {
        let mut execution = self
            .store
            .get_execution(&execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(execution_id))?;

        if execution.status != ExecutionStatus::Paused {
            return Err(EngineError::NotResumable {
                id: execution_id,
                status: execution.status,
            });
        }
        if execution.workflow_id != workflow.id {
            return Err(EngineError::WorkflowMismatch {
                execution: execution_id,
                expected: execution.workflow_id,
                actual: workflow.id,
            });
        }
        let report = validate(workflow);
        if !report.valid {
            return Err(EngineError::Validation(report));
        }

        let resolved = execution
            .step_statuses
            .values()
            .filter(|s| s.is_resolved())
            .count();
        tracing::info!(
            execution_id = %execution_id,
            workflow = %workflow.name,
            resolved,
            "resuming workflow execution"
        );

        let started = Instant::now();
        let ctx = ExecutionContext::from_execution(&execution);
        execution.status = ExecutionStatus::Running;
        execution.paused_at = None;
        self.drive(workflow, execution, ctx, started).await
    }

    /// Register the pause token, run the scheduler, and record the outcome.
    async fn drive(
        &self,
        workflow: &Workflow,
        mut execution: WorkflowExecution,
        mut ctx: ExecutionContext,
        started: Instant,
    ) -> Result<ExecutionOutcome, EngineError> {
        let token = CancellationToken::new();
        self.pause_tokens.insert(execution.id, token.clone());

        let result = match self.store.save_execution(&execution).await {
            Ok(()) => self.schedule(workflow, &mut execution, &mut ctx, &token).await,
            Err(e) => Err(e.into()),
        };
        self.pause_tokens.remove(&execution.id);

        let end = match result {
            Ok(end) => end,
            Err(e) => {
                // Best effort: leave a terminal record behind if the store still works.
                execution.status = ExecutionStatus::Failed;
                execution.error = Some(e.to_string());
                execution.finished_at = Some(Utc::now());
                let _ = self.store.save_execution(&execution).await;
                return Err(e);
            }
        };

        execution.current_step = None;
        let error = match end {
            RunEnd::Completed => {
                execution.status = ExecutionStatus::Completed;
                execution.finished_at = Some(Utc::now());
                None
            }
            RunEnd::Failed(error) => {
                execution.status = ExecutionStatus::Failed;
                execution.error = Some(error.clone());
                execution.finished_at = Some(Utc::now());
                Some(error)
            }
            RunEnd::Paused => {
                execution.status = ExecutionStatus::Paused;
                execution.paused_at = Some(Utc::now());
                None
            }
        };
        self.checkpoint(&mut execution, &ctx).await?;

        let duration = started.elapsed();
        tracing::info!(
            execution_id = %execution.id,
            status = %execution.status,
            duration_ms = duration.as_millis() as u64,
            "workflow execution finished"
        );

        Ok(ExecutionOutcome {
            success: execution.status == ExecutionStatus::Completed,
            output: final_output(workflow, &ctx),
            execution,
            error,
            duration,
        })
    }

    /// The ready-queue loop. Returns how the pass ended.
    async fn schedule(
        &self,
        workflow: &Workflow,
        execution: &mut WorkflowExecution,
        ctx: &mut ExecutionContext,
        token: &CancellationToken,
    ) -> Result<RunEnd, EngineError> {
        let plan = Plan::build(workflow);
        let runner = StepRunner::new(workflow, &self.tools, &self.reasoning, &self.config);

        let mut remaining = plan.in_degree.clone();
        let mut activated = vec![false; workflow.steps.len()];
        let mut ready: VecDeque<usize> = (0..workflow.steps.len())
            .filter(|&i| !plan.owned[i] && plan.in_degree[i] == 0)
            .collect();

        while let Some(idx) = ready.pop_front() {
            let step = &workflow.steps[idx];

            let status = match ctx.status(&step.id).filter(|s| s.is_resolved()) {
                Some(recorded) => {
                    tracing::debug!(step_id = %step.id, status = %recorded, "replaying resolved step");
                    recorded
                }
                None if plan.in_degree[idx] == 0 || activated[idx] => {
                    if token.is_cancelled() {
                        tracing::info!(execution_id = %execution.id, next_step = %step.id, "pausing execution");
                        return Ok(RunEnd::Paused);
                    }

                    let result = self.run_scheduled(&runner, step, execution, ctx).await?;
                    if result.success {
                        StepStatus::Completed
                    } else {
                        let error = result.error.unwrap_or_default();
                        let redirect = step
                            .error_handling
                            .as_ref()
                            .and_then(|eh| eh.on_error.as_deref())
                            .filter(|_| plan.redirects(idx));
                        match redirect {
                            Some(target) => {
                                tracing::warn!(
                                    step_id = %step.id,
                                    on_error = target,
                                    error = %error,
                                    "step failed, redirecting"
                                );
                                StepStatus::Failed
                            }
                            None => {
                                tracing::error!(step_id = %step.id, error = %error, "step failed");
                                return Ok(RunEnd::Failed(error));
                            }
                        }
                    }
                }
                None => {
                    tracing::debug!(step_id = %step.id, "skipping step with no active incoming edge");
                    ctx.set_status(&step.id, StepStatus::Skipped);
                    self.checkpoint(execution, ctx).await?;
                    StepStatus::Skipped
                }
            };

            for &edge in &plan.outgoing[idx] {
                if edge_active(step, status, edge, ctx) {
                    activated[edge.to] = true;
                }
                remaining[edge.to] -= 1;
                if remaining[edge.to] == 0 {
                    ready.push_back(edge.to);
                }
            }
        }

        Ok(RunEnd::Completed)
    }

    /// Run one scheduled step, persisting before and after.
    async fn run_scheduled(
        &self,
        runner: &StepRunner<'_>,
        step: &WorkflowStep,
        execution: &mut WorkflowExecution,
        ctx: &mut ExecutionContext,
    ) -> Result<StepResult, EngineError> {
        ctx.set_status(&step.id, StepStatus::Running);
        execution.current_step = Some(step.id.clone());
        self.checkpoint(execution, ctx).await?;

        let result = runner.run_step(step, ctx).await;
        let status = if result.success {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        ctx.set_status(&step.id, status);
        self.checkpoint(execution, ctx).await?;

        tracing::debug!(
            step_id = %step.id,
            status = %status,
            duration_ms = result.duration_ms,
            "step finished"
        );
        Ok(result)
    }

    /// Copy the context into the execution record and persist it.
    async fn checkpoint(
        &self,
        execution: &mut WorkflowExecution,
        ctx: &ExecutionContext,
    ) -> Result<(), EngineError> {
        execution.variables.clone_from(&ctx.variables);
        execution.outputs.clone_from(&ctx.outputs);
        execution.step_statuses.clone_from(&ctx.step_statuses);
        execution.branches.clone_from(&ctx.branches);
        self.store.save_execution(execution).await?;
        Ok(())
    }
}

fn final_output(workflow: &Workflow, ctx: &ExecutionContext) -> Option<Value> {
    let from_output_step = workflow
        .steps
        .iter()
        .rev()
        .filter(|s| s.step_type == StepType::Output && ctx.status(&s.id) == Some(StepStatus::Completed))
        .find_map(|s| ctx.output(s.config.output_key.as_deref().unwrap_or("result")).cloned());

    from_output_step.or_else(|| {
        (!ctx.outputs.is_empty()).then(|| {
            Value::Object(
                ctx.outputs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )
        })
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;
    use weft_types::workflow::ErrorHandling;

    use super::*;
    use crate::invoker::testing::{EchoReasoning, ScriptedTools};
    use crate::repository::memory::InMemoryStore;
    use crate::workflow::executors::testing::workflow_of;
    use crate::workflow::graph::ValidationIssue;
    use crate::workflow::parser::{SpecFormat, parse};

    fn engine() -> (WorkflowEngine<InMemoryStore>, ScriptedTools) {
        let tools = ScriptedTools::default();
        let engine = WorkflowEngine::new(
            InMemoryStore::new(),
            BoxToolInvoker::new(tools.clone()),
            BoxReasoningProvider::new(EchoReasoning),
            EngineConfig::default(),
        );
        (engine, tools)
    }

    fn yaml(src: &str) -> Workflow {
        parse(src, SpecFormat::Yaml).unwrap()
    }

    fn status(outcome: &ExecutionOutcome, step: &str) -> Option<StepStatus> {
        outcome.execution.step_statuses.get(step).copied()
    }

    #[tokio::test]
    async fn test_end_to_end_fetch_transform_output() {
        let (engine, _) = engine();
        let wf = parse(
            r#"{
                "name": "pipeline",
                "variables": {"url": "https://example.test/data"},
                "steps": [
                    {"id": "fetch", "type": "tool", "tool": "echo",
                     "tool_input": {"url": "{{url}}", "text": "payload"},
                     "output_key": "raw"},
                    {"id": "transform", "type": "tool", "tool": "upper",
                     "tool_input": {"text": "{{raw.text}}"},
                     "output_key": "result", "depends_on": ["fetch"]},
                    {"id": "out", "type": "output", "depends_on": ["transform"]}
                ]
            }"#,
            SpecFormat::Json,
        )
        .unwrap();

        let outcome = engine.execute(&wf, HashMap::new()).await.unwrap();

        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(outcome.execution.status, ExecutionStatus::Completed);
        assert_eq!(outcome.output, Some(json!("PAYLOAD")));
        assert_eq!(outcome.execution.outputs["result"], json!("PAYLOAD"));
        assert_eq!(
            outcome.execution.outputs["raw"]["url"],
            json!("https://example.test/data")
        );
        for step in ["fetch", "transform", "out"] {
            assert_eq!(status(&outcome, step), Some(StepStatus::Completed), "{step}");
        }
        assert!(outcome.execution.finished_at.is_some());

        let stored = engine
            .store()
            .get_execution(&outcome.execution.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_input_overrides_variables() {
        let (engine, _) = engine();
        let wf = yaml(
            r#"
name: greet
variables:
  who: world
steps:
  - id: say
    type: tool
    tool: echo
    tool_input:
      msg: "hello {{who}}"
    output_key: result
"#,
        );

        let input = HashMap::from([("who".to_string(), json!("weft"))]);
        let outcome = engine.execute(&wf, input).await.unwrap();
        assert_eq!(outcome.execution.outputs["result"], json!({"msg": "hello weft"}));
        assert_eq!(outcome.execution.variables["who"], json!("weft"));
    }

    #[tokio::test]
    async fn test_dependencies_run_in_order() {
        let (engine, tools) = engine();
        let wf = yaml(
            r#"
name: ordered
steps:
  - id: second
    type: tool
    tool: sleep
    tool_input: { ms: 5 }
    depends_on: [first]
  - id: first
    type: tool
    tool: echo
"#,
        );

        let outcome = engine.execute(&wf, HashMap::new()).await.unwrap();
        assert!(outcome.success);
        let echo_at = tools.call_times("echo")[0];
        let sleep_at = tools.call_times("sleep")[0];
        assert!(echo_at <= sleep_at);
    }

    #[tokio::test]
    async fn test_diamond_join_runs_once() {
        let (engine, tools) = engine();
        let wf = yaml(
            r#"
name: diamond
steps:
  - id: a
    type: task
  - id: b
    type: task
    depends_on: [a]
  - id: c
    type: task
    depends_on: [a]
  - id: d
    type: tool
    tool: echo
    depends_on: [b, c]
"#,
        );

        let outcome = engine.execute(&wf, HashMap::new()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(tools.calls("echo"), 1);
        assert_eq!(status(&outcome, "d"), Some(StepStatus::Completed));
    }

    #[tokio::test]
    async fn test_unselected_branch_skipped() {
        let (engine, tools) = engine();
        let wf = yaml(
            r#"
name: branching
variables:
  score: 80
steps:
  - id: check
    type: condition
    if: "{{score}} > 50"
    on_true: high
    on_false: low
  - id: high
    type: tool
    tool: echo
    tool_input: { path: high }
    output_key: picked
  - id: low
    type: tool
    tool: upper
    tool_input: { text: low }
    output_key: picked
"#,
        );

        let outcome = engine.execute(&wf, HashMap::new()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(status(&outcome, "high"), Some(StepStatus::Completed));
        assert_eq!(status(&outcome, "low"), Some(StepStatus::Skipped));
        assert_eq!(tools.calls("upper"), 0);
        assert_eq!(outcome.execution.branches["check"], "true");
    }

    #[tokio::test]
    async fn test_skip_propagates_past_unselected_branch() {
        let (engine, _) = engine();
        let mut check = WorkflowStep::new("check", StepType::Condition);
        check.condition = Some("false".into());
        check.next = vec!["after".into()];
        let mut after = WorkflowStep::new("after", StepType::Task);
        after.next = vec!["tail".into()];
        let tail = WorkflowStep::new("tail", StepType::Task);
        let wf = workflow_of(vec![check, after, tail]);

        let outcome = engine.execute(&wf, HashMap::new()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(status(&outcome, "after"), Some(StepStatus::Skipped));
        assert_eq!(status(&outcome, "tail"), Some(StepStatus::Skipped));
    }

    #[tokio::test]
    async fn test_step_failure_fails_run() {
        let (engine, tools) = engine();
        let wf = yaml(
            r#"
name: failing
steps:
  - id: boom
    type: tool
    tool: fail
  - id: never
    type: tool
    tool: echo
"#,
        );

        let outcome = engine.execute(&wf, HashMap::new()).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.execution.status, ExecutionStatus::Failed);
        assert_eq!(
            outcome.execution.error.as_deref(),
            Some("tool 'fail' failed: scripted failure")
        );
        assert_eq!(status(&outcome, "boom"), Some(StepStatus::Failed));
        assert_eq!(status(&outcome, "never"), Some(StepStatus::Pending));
        assert_eq!(tools.calls("echo"), 0);
    }

    #[tokio::test]
    async fn test_on_error_redirect_continues_run() {
        let (engine, _) = engine();
        let wf = yaml(
            r#"
name: redirect
steps:
  - id: risky
    type: tool
    tool: fail
    on_error: recover
    next: [happy]
  - id: happy
    type: task
  - id: recover
    type: tool
    tool: echo
    tool_input: { recovered: true }
    output_key: result
"#,
        );

        let outcome = engine.execute(&wf, HashMap::new()).await.unwrap();
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(status(&outcome, "risky"), Some(StepStatus::Failed));
        assert_eq!(status(&outcome, "recover"), Some(StepStatus::Completed));
        assert_eq!(status(&outcome, "happy"), Some(StepStatus::Skipped));
        assert_eq!(outcome.execution.outputs["result"], json!({"recovered": true}));
    }

    #[tokio::test]
    async fn test_fallback_replaces_failed_step() {
        let (engine, _) = engine();
        let mut primary = WorkflowStep::new("primary", StepType::Tool);
        primary.config.tool = Some("fail".into());
        primary.error_handling = Some(ErrorHandling {
            fallback: Some("backup".into()),
            ..ErrorHandling::default()
        });
        let mut backup = WorkflowStep::new("backup", StepType::Tool);
        backup.config.tool = Some("echo".into());
        backup.config.output_key = Some("result".into());
        let wf = workflow_of(vec![primary, backup]);

        let outcome = engine.execute(&wf, HashMap::new()).await.unwrap();
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(status(&outcome, "primary"), Some(StepStatus::Completed));
        assert_eq!(status(&outcome, "backup"), Some(StepStatus::Completed));
        assert_eq!(outcome.execution.outputs["result"], json!({}));
    }

    #[tokio::test]
    async fn test_timeout_fails_step() {
        let (engine, _) = engine();
        let wf = yaml(
            r#"
name: slow
steps:
  - id: slow
    type: tool
    tool: sleep
    tool_input: { ms: 500 }
    timeout: 50
"#,
        );

        let started = Instant::now();
        let outcome = engine.execute(&wf, HashMap::new()).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("step 'slow' timed out after 50ms")
        );
    }

    #[tokio::test]
    async fn test_retry_policy_applies() {
        let (engine, tools) = engine();
        let wf = yaml(
            r#"
name: retrying
steps:
  - id: flaky
    type: tool
    tool: flaky
    tool_input: { succeed_on: 3 }
    retry: { max_attempts: 3, delay: 1 }
    output_key: result
"#,
        );

        let outcome = engine.execute(&wf, HashMap::new()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(tools.calls("flaky"), 3);
        assert_eq!(outcome.output, Some(json!({"result": {"attempt": 3}})));
    }

    #[tokio::test]
    async fn test_cycle_rejected_without_record() {
        let (engine, _) = engine();
        let mut a = WorkflowStep::new("a", StepType::Task);
        a.next = vec!["b".into()];
        let mut b = WorkflowStep::new("b", StepType::Task);
        b.next = vec!["a".into()];
        let wf = workflow_of(vec![a, b]);

        let err = engine.execute(&wf, HashMap::new()).await.unwrap_err();
        match err {
            EngineError::Validation(report) => assert!(report.has_cycle()),
            other => panic!("expected validation error, got {other}"),
        }
        assert!(engine.store().list_executions(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dependency_on_parallel_child_rejected() {
        let (engine, tools) = engine();
        let wf = yaml(
            r#"
name: fan-then-after
steps:
  - id: first
    type: tool
    tool: sleep
    tool_input: { ms: 50 }
  - id: fan
    type: parallel
    steps: [child]
    depends_on: [first]
  - id: child
    type: tool
    tool: echo
  - id: after
    type: tool
    tool: upper
    tool_input: { text: "late" }
    depends_on: [child]
"#,
        );

        let err = engine.execute(&wf, HashMap::new()).await.unwrap_err();
        match err {
            EngineError::Validation(report) => assert!(report.errors.contains(
                &ValidationIssue::OwnedStepEdge {
                    step: "child".into(),
                    kind: "next".into(),
                    target: "after".into(),
                }
            )),
            other => panic!("expected validation error, got {other}"),
        }
        assert_eq!(tools.calls("upper"), 0);
        assert!(engine.store().list_executions(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_on_error_into_fallback_target_rejected() {
        let (engine, tools) = engine();
        let wf = yaml(
            r#"
name: shared-recovery
steps:
  - id: a
    type: tool
    tool: fail
    on_error: recover
  - id: b
    type: tool
    tool: fail
    fallback: recover
  - id: recover
    type: tool
    tool: echo
"#,
        );

        let err = engine.execute(&wf, HashMap::new()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ref report) if report.errors.contains(&ValidationIssue::OwnedStepEdge {
                step: "a".into(),
                kind: "on_error".into(),
                target: "recover".into(),
            })
        ));
        assert_eq!(tools.calls("fail"), 0);
    }

    #[test]
    fn test_on_error_counts_only_when_scheduled() {
        let mut a = WorkflowStep::new("a", StepType::Tool);
        a.error_handling = Some(ErrorHandling {
            on_error: Some("recover".into()),
            ..ErrorHandling::default()
        });
        let mut b = WorkflowStep::new("b", StepType::Tool);
        b.error_handling = Some(ErrorHandling {
            fallback: Some("recover".into()),
            ..ErrorHandling::default()
        });
        let recover = WorkflowStep::new("recover", StepType::Task);

        let plan = Plan::build(&workflow_of(vec![a.clone(), b, recover.clone()]));
        assert!(!plan.redirects(0));

        let plan = Plan::build(&workflow_of(vec![a, recover]));
        assert!(plan.redirects(0));
        assert_eq!(plan.in_degree[1], 1);
    }

    #[tokio::test]
    async fn test_parallel_and_loop_inside_run() {
        let (engine, tools) = engine();
        let wf = yaml(
            r#"
name: fan
steps:
  - id: fan
    type: parallel
    steps: [left, right]
    output_key: fanned
  - id: repeat
    type: loop
    body: tick
    max_iterations: 3
    output_key: looped
    depends_on: [fan]
  - id: left
    type: tool
    tool: echo
    tool_input: { side: left }
  - id: right
    type: tool
    tool: echo
    tool_input: { side: right }
  - id: tick
    type: task
"#,
        );

        let outcome = engine.execute(&wf, HashMap::new()).await.unwrap();
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(tools.calls("echo"), 2);
        assert_eq!(outcome.execution.outputs["looped"]["iterations"], json!(3));
        assert_eq!(status(&outcome, "left"), Some(StepStatus::Completed));
        assert_eq!(status(&outcome, "tick"), Some(StepStatus::Completed));
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let (engine, tools) = engine();
        let wf = yaml(
            r#"
name: pausable
steps:
  - id: first
    type: tool
    tool: sleep
    tool_input: { ms: 100 }
  - id: second
    type: tool
    tool: echo
    tool_input: { n: 2 }
  - id: third
    type: tool
    tool: upper
    tool_input: { text: done }
    output_key: result
"#,
        );

        let run = engine.execute(&wf, HashMap::new());
        let pauser = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let running = engine.running();
            assert_eq!(running.len(), 1);
            engine.pause(running[0]).unwrap();
        };
        let (outcome, ()) = tokio::join!(run, pauser);
        let outcome = outcome.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.execution.status, ExecutionStatus::Paused);
        assert!(outcome.execution.paused_at.is_some());
        assert!(outcome.execution.finished_at.is_none());
        assert_eq!(status(&outcome, "first"), Some(StepStatus::Completed));
        assert_eq!(status(&outcome, "second"), Some(StepStatus::Pending));
        assert!(engine.running().is_empty());

        let resumed = engine.resume(outcome.execution.id, &wf).await.unwrap();
        assert!(resumed.success, "{:?}", resumed.error);
        assert_eq!(resumed.execution.id, outcome.execution.id);
        assert_eq!(tools.calls("sleep"), 1);
        assert_eq!(tools.calls("echo"), 1);
        assert_eq!(resumed.execution.outputs["result"], json!("DONE"));
        assert!(resumed.execution.paused_at.is_none());

        let again = engine.resume(outcome.execution.id, &wf).await.unwrap_err();
        assert!(matches!(
            again,
            EngineError::NotResumable {
                status: ExecutionStatus::Completed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_pause_unknown_execution() {
        let (engine, _) = engine();
        let id = Uuid::now_v7();
        assert!(matches!(engine.pause(id), Err(EngineError::NotRunning(_))));
        assert!(matches!(
            engine.resume(id, &workflow_of(vec![WorkflowStep::new("a", StepType::Task)])).await,
            Err(EngineError::ExecutionNotFound(_))
        ));
    }
}
