//! Execution commands: run, resume, history, status.
//!
//! `run` and `resume` pause the execution on Ctrl+C: the engine finishes the
//! step in flight, checkpoints, and the run can be continued later with
//! `weft resume <id>`.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::{StyledObject, style};
use serde_json::Value;
use uuid::Uuid;
use weft_core::repository::storage::StorageBackend;
use weft_core::workflow::engine::{EngineError, ExecutionOutcome};
use weft_core::workflow::graph::validate;
use weft_types::execution::{ExecutionStatus, StepStatus, WorkflowExecution};
use weft_types::workflow::Workflow;

use super::workflow::{adopt_registered_id, find_workflow, load_spec};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Inputs and targets
// ---------------------------------------------------------------------------

/// Merge `--input` (a JSON object) and `--var key=value` pairs.
///
/// `--var` values are parsed as JSON when they parse, otherwise kept as text,
/// and win over keys from `--input`.
pub fn parse_inputs(input: Option<&str>, vars: &[String]) -> Result<HashMap<String, Value>> {
    let mut inputs = HashMap::new();

    if let Some(raw) = input {
        let value: Value = serde_json::from_str(raw).context("Invalid JSON in --input")?;
        match value {
            Value::Object(map) => inputs.extend(map),
            _ => bail!("--input must be a JSON object"),
        }
    }

    for pair in vars {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("Invalid --var '{pair}', expected KEY=VALUE");
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        inputs.insert(key.trim().to_string(), value);
    }

    Ok(inputs)
}

/// Resolve `target` to a stored workflow.
///
/// A path to an existing file is parsed, validated and saved first so that
/// the execution can later be resumed by id.
async fn resolve_run_target(state: &AppState, target: &str) -> Result<Workflow> {
    let path = Path::new(target);
    if path.is_file() {
        let mut workflow = load_spec(path)?;
        let report = validate(&workflow);
        if !report.valid {
            bail!("Workflow validation failed: {report}");
        }
        adopt_registered_id(state, &mut workflow).await?;
        state
            .store()
            .save_workflow(&workflow)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to save workflow: {e}"))?;
        return Ok(workflow);
    }

    find_workflow(state, target)
        .await?
        .ok_or_else(|| anyhow::anyhow!("No spec file or registered workflow named '{target}'"))
}

fn parse_execution_id(raw: &str) -> Result<Uuid> {
    raw.parse::<Uuid>()
        .with_context(|| format!("Invalid execution ID '{raw}'"))
}

// ---------------------------------------------------------------------------
// Run / Resume
// ---------------------------------------------------------------------------

pub async fn handle_run(
    target: &str,
    input: Option<&str>,
    vars: &[String],
    state: &AppState,
    json: bool,
) -> Result<ExecutionOutcome> {
    let workflow = resolve_run_target(state, target).await?;
    let inputs = parse_inputs(input, vars)?;

    if !json {
        println!();
        println!(
            "  {} Running workflow '{}' ({} steps)",
            style("▶").cyan().bold(),
            style(&workflow.name).cyan(),
            workflow.steps.len()
        );
    }

    let outcome = pause_on_interrupt(state, state.engine.execute(&workflow, inputs))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run workflow '{}': {e}", workflow.name))?;

    report_outcome(&workflow, outcome, json)
}

pub async fn handle_resume(execution_id: &str, state: &AppState, json: bool) -> Result<ExecutionOutcome> {
    let id = parse_execution_id(execution_id)?;
    let execution = state
        .store()
        .get_execution(&id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get execution: {e}"))?
        .ok_or_else(|| anyhow::anyhow!("Execution '{id}' not found"))?;

    let workflow = state
        .store()
        .get_workflow(&execution.workflow_id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to look up workflow: {e}"))?
        .ok_or_else(|| anyhow::anyhow!("Workflow {} for execution '{id}' no longer exists", execution.workflow_id))?;

    if !json {
        println!();
        println!(
            "  {} Resuming '{}' ({})",
            style("▶").cyan().bold(),
            style(&workflow.name).cyan(),
            id
        );
    }

    let outcome = pause_on_interrupt(state, state.engine.resume(id, &workflow))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to resume execution: {e}"))?;

    report_outcome(&workflow, outcome, json)
}

/// Drive `run` to completion, pausing every active execution on Ctrl+C.
async fn pause_on_interrupt<F>(state: &AppState, run: F) -> Result<ExecutionOutcome, EngineError>
where
    F: Future<Output = Result<ExecutionOutcome, EngineError>>,
{
    tokio::pin!(run);
    let mut interrupted = false;

    loop {
        tokio::select! {
            result = &mut run => return result,
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if signal.is_ok() {
                    for id in state.engine.running() {
                        if let Err(e) = state.engine.pause(id) {
                            tracing::debug!(execution_id = %id, error = %e, "pause skipped");
                        }
                    }
                    eprintln!("  Pausing after the current step...");
                }
            }
        }
    }
}

/// Print an outcome. A failed run is returned as an error so the process
/// exits non-zero.
fn report_outcome(workflow: &Workflow, outcome: ExecutionOutcome, json: bool) -> Result<ExecutionOutcome> {
    let execution = &outcome.execution;

    if json {
        let out = serde_json::json!({
            "execution_id": execution.id.to_string(),
            "workflow": workflow.name,
            "status": execution.status.to_string(),
            "success": outcome.success,
            "output": outcome.output,
            "error": outcome.error,
            "duration_ms": outcome.duration.as_millis() as u64,
            "steps": execution.step_statuses,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  Status:   {}",
            status_style(execution.status)
        );
        println!("  ID:       {}", execution.id);
        println!("  Duration: {}ms", outcome.duration.as_millis());
        if let Some(ref err) = outcome.error {
            println!("  Error:    {}", style(err).red());
        }
        if let Some(ref output) = outcome.output {
            println!();
            println!("  Output:");
            let pretty = serde_json::to_string_pretty(output)?;
            for line in pretty.lines() {
                println!("    {line}");
            }
        }
        println!();
        if execution.status == ExecutionStatus::Paused {
            println!(
                "  Continue with: {}",
                style(format!("weft resume {}", execution.id)).dim()
            );
            println!();
        }
    }

    if execution.status == ExecutionStatus::Failed {
        bail!(
            "Workflow '{}' failed: {}",
            workflow.name,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

pub async fn handle_history(
    workflow: Option<&str>,
    limit: Option<u32>,
    state: &AppState,
    json: bool,
) -> Result<Vec<WorkflowExecution>> {
    let limit = limit.unwrap_or(state.config.engine.history_limit);

    let workflow_id = match workflow {
        Some(name) => Some(
            find_workflow(state, name)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Workflow '{name}' not found"))?
                .id,
        ),
        None => None,
    };

    let executions = state
        .store()
        .list_executions(workflow_id.as_ref(), limit)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list executions: {e}"))?;

    let names: HashMap<Uuid, String> = state
        .store()
        .list_workflows()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list workflows: {e}"))?
        .into_iter()
        .map(|w| (w.id, w.name))
        .collect();
    let name_of = |id: &Uuid| names.get(id).cloned().unwrap_or_else(|| id.to_string());

    if json {
        let out: Vec<_> = executions
            .iter()
            .map(|e| {
                serde_json::json!({
                    "execution_id": e.id.to_string(),
                    "workflow": name_of(&e.workflow_id),
                    "status": e.status.to_string(),
                    "started_at": e.started_at.to_rfc3339(),
                    "finished_at": e.finished_at.map(|t| t.to_rfc3339()),
                    "error": e.error,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(executions);
    }

    if executions.is_empty() {
        println!();
        println!("  No executions recorded.");
        println!();
        return Ok(executions);
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Execution").fg(Color::Cyan),
            Cell::new("Workflow"),
            Cell::new("Status"),
            Cell::new("Started"),
            Cell::new("Duration"),
            Cell::new("Error"),
        ]);

    for e in &executions {
        let duration = e
            .finished_at
            .map(|f| format!("{}ms", (f - e.started_at).num_milliseconds()))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(e.id),
            Cell::new(name_of(&e.workflow_id)),
            Cell::new(e.status).fg(status_color(e.status)),
            Cell::new(e.started_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(duration),
            Cell::new(e.error.as_deref().unwrap_or("")),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(executions)
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

pub async fn handle_status(execution_id: &str, state: &AppState, json: bool) -> Result<WorkflowExecution> {
    let id = parse_execution_id(execution_id)?;
    let execution = state
        .store()
        .get_execution(&id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get execution: {e}"))?
        .ok_or_else(|| anyhow::anyhow!("Execution '{id}' not found"))?;

    let workflow = state
        .store()
        .get_workflow(&execution.workflow_id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to look up workflow: {e}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&execution)?);
        return Ok(execution);
    }

    println!();
    println!(
        "  Workflow: {}",
        style(workflow.as_ref().map_or_else(|| execution.workflow_id.to_string(), |w| w.name.clone())).cyan()
    );
    println!("  ID:       {}", execution.id);
    println!("  Status:   {}", status_style(execution.status));
    println!("  Started:  {}", execution.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(finished) = execution.finished_at {
        println!("  Finished: {}", finished.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(paused) = execution.paused_at {
        println!("  Paused:   {}", paused.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(ref step) = execution.current_step {
        println!("  Step:     {step}");
    }
    if let Some(ref err) = execution.error {
        println!("  Error:    {}", style(err).red());
    }

    // Declaration order when the definition is still around.
    let order: Vec<String> = match &workflow {
        Some(w) => w.steps.iter().map(|s| s.id.clone()).collect(),
        None => {
            let mut ids: Vec<String> = execution.step_statuses.keys().cloned().collect();
            ids.sort();
            ids
        }
    };

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Branch"),
        ]);
    for step_id in &order {
        let status = execution
            .step_statuses
            .get(step_id)
            .copied()
            .unwrap_or(StepStatus::Pending);
        table.add_row(vec![
            Cell::new(step_id),
            Cell::new(status).fg(step_color(status)),
            Cell::new(execution.branches.get(step_id).map(String::as_str).unwrap_or("")),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(execution)
}

// ---------------------------------------------------------------------------
// Styling
// ---------------------------------------------------------------------------

fn status_style(status: ExecutionStatus) -> StyledObject<String> {
    let text = status.to_string();
    match status {
        ExecutionStatus::Completed => style(text).green().bold(),
        ExecutionStatus::Failed => style(text).red().bold(),
        ExecutionStatus::Paused => style(text).yellow().bold(),
        ExecutionStatus::Running => style(text).cyan(),
        ExecutionStatus::Pending => style(text).dim(),
    }
}

fn status_color(status: ExecutionStatus) -> Color {
    match status {
        ExecutionStatus::Completed => Color::Green,
        ExecutionStatus::Failed => Color::Red,
        ExecutionStatus::Paused => Color::Yellow,
        ExecutionStatus::Running => Color::Cyan,
        ExecutionStatus::Pending => Color::Grey,
    }
}

fn step_color(status: StepStatus) -> Color {
    match status {
        StepStatus::Completed => Color::Green,
        StepStatus::Failed => Color::Red,
        StepStatus::Running => Color::Cyan,
        StepStatus::Skipped | StepStatus::Pending => Color::Grey,
    }
}
