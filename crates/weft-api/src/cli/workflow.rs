//! Workflow definition commands: validate, register, list, delete, export.

use std::path::Path;

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;
use weft_core::repository::storage::StorageBackend;
use weft_core::workflow::graph::validate;
use weft_core::workflow::parser::{load_workflow_file, to_json, to_yaml};
use weft_types::workflow::Workflow;

use super::ExportFormat;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Shared lookups
// ---------------------------------------------------------------------------

/// Parse a spec file into a workflow.
pub fn load_spec(file: &Path) -> Result<Workflow> {
    load_workflow_file(file).map_err(|e| anyhow::anyhow!("Failed to load workflow spec: {e}"))
}

/// Find a registered workflow by UUID or by name.
pub async fn find_workflow(state: &AppState, name_or_id: &str) -> Result<Option<Workflow>> {
    if let Ok(id) = name_or_id.parse::<Uuid>() {
        let found = state
            .store()
            .get_workflow(&id)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to look up workflow: {e}"))?;
        if found.is_some() {
            return Ok(found);
        }
    }

    state
        .store()
        .get_workflow_by_name(name_or_id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to look up workflow: {e}"))
}

/// Reuse the id of an already registered workflow with the same name, so
/// that saving a re-parsed spec updates the existing record.
pub async fn adopt_registered_id(state: &AppState, workflow: &mut Workflow) -> Result<()> {
    let existing = state
        .store()
        .get_workflow_by_name(&workflow.name)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to look up workflow: {e}"))?;
    if let Some(existing) = existing {
        workflow.id = existing.id;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub async fn handle_validate(file: &Path, json: bool) -> Result<()> {
    let workflow = load_spec(file)?;
    let report = validate(&workflow);

    if json {
        let out = serde_json::json!({
            "name": workflow.name,
            "valid": report.valid,
            "steps": workflow.steps.len(),
            "errors": report.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if report.valid {
        println!();
        println!(
            "  {} '{}' is valid ({} steps)",
            style("✓").green().bold(),
            style(&workflow.name).cyan(),
            workflow.steps.len()
        );
        println!();
    } else {
        println!();
        println!(
            "  {} '{}' has {} problem(s):",
            style("✗").red().bold(),
            style(&workflow.name).cyan(),
            report.errors.len()
        );
        for issue in &report.errors {
            println!("    - {issue}");
        }
        println!();
    }

    if !report.valid {
        bail!("Workflow '{}' is invalid", workflow.name);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Register
// ---------------------------------------------------------------------------

pub async fn handle_register(file: &Path, state: &AppState, json: bool) -> Result<Workflow> {
    let mut workflow = load_spec(file)?;
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

    tracing::info!(workflow = %workflow.name, id = %workflow.id, "workflow registered");

    if json {
        let out = serde_json::json!({
            "id": workflow.id.to_string(),
            "name": workflow.name,
            "version": workflow.version,
            "steps": workflow.steps.len(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Registered workflow '{}'",
            style("*").green().bold(),
            style(&workflow.name).cyan()
        );
        println!("  ID: {}", workflow.id);
        println!("  Version: {}", workflow.version);
        println!("  Steps: {}", workflow.steps.len());
        println!();
        println!(
            "  Run it with: {}",
            style(format!("weft run {}", workflow.name)).dim()
        );
        println!();
    }

    Ok(workflow)
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

pub async fn handle_list(state: &AppState, json: bool) -> Result<()> {
    let workflows = state
        .store()
        .list_workflows()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list workflows: {e}"))?;

    if json {
        let out: Vec<_> = workflows
            .iter()
            .map(|w| {
                serde_json::json!({
                    "id": w.id.to_string(),
                    "name": w.name,
                    "version": w.version,
                    "description": w.description,
                    "steps": w.steps.len(),
                    "triggers": w.triggers.len(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if workflows.is_empty() {
        println!();
        println!("  No workflows registered.");
        println!(
            "  Register one with: {}",
            style("weft register <file.yaml>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Version"),
            Cell::new("Steps"),
            Cell::new("Triggers"),
            Cell::new("ID"),
        ]);

    for w in &workflows {
        table.add_row(vec![
            Cell::new(&w.name),
            Cell::new(&w.version),
            Cell::new(w.steps.len()),
            Cell::new(w.triggers.len()),
            Cell::new(w.id),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

pub async fn handle_delete(name: &str, state: &AppState, json: bool) -> Result<()> {
    let workflow = find_workflow(state, name)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Workflow '{name}' not found"))?;

    let deleted = state
        .store()
        .delete_workflow(&workflow.id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to delete workflow: {e}"))?;

    if json {
        let out = serde_json::json!({ "id": workflow.id.to_string(), "deleted": deleted });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Deleted workflow '{}'",
            style("*").green().bold(),
            style(&workflow.name).cyan()
        );
        println!();
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

pub async fn handle_export(
    name: &str,
    format: ExportFormat,
    output: Option<&Path>,
    state: &AppState,
) -> Result<()> {
    let workflow = find_workflow(state, name)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Workflow '{name}' not found"))?;

    let rendered = match format {
        ExportFormat::Json => to_json(&workflow),
        ExportFormat::Yaml => to_yaml(&workflow),
    }
    .map_err(|e| anyhow::anyhow!("Failed to export workflow: {e}"))?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &rendered).await?;
            eprintln!(
                "  {} Exported '{}' to {}",
                style("*").green().bold(),
                style(&workflow.name).cyan(),
                path.display()
            );
        }
        None => print!("{rendered}"),
    }

    Ok(())
}
