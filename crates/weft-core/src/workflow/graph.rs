//! Structural validation of a workflow graph.
//!
//! Builds a `petgraph` digraph over every control-flow reference (`next`,
//! branch targets, `on_error`, `fallback`, parallel children, loop bodies)
//! and checks it for dangling references and cycles, alongside per-step
//! configuration checks. Steps owned by a parallel, loop or fallback run only
//! through their owner, so scheduling edges into or out of them are rejected.

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use thiserror::Error;
use weft_types::workflow::{StepType, Trigger, Workflow};

use super::expression::Expr;

/// A single problem found by [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ValidationIssue {
    #[error("workflow has no steps")]
    NoSteps,

    #[error("duplicate step id '{0}'")]
    DuplicateStep(String),

    #[error("step '{step}' {kind} references unknown step '{target}'")]
    DanglingReference {
        step: String,
        kind: String,
        target: String,
    },

    /// A `next`, branch or `on_error` edge leaves or enters a step that only
    /// runs inside its owning parallel, loop or fallback.
    #[error("step '{step}' {kind} edge to '{target}' touches a step that only runs inside its owner")]
    OwnedStepEdge {
        step: String,
        kind: String,
        target: String,
    },

    #[error("workflow contains a cycle through steps: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("step '{step}': {message}")]
    InvalidStep { step: String, message: String },

    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),
}

/// Result of validating a workflow.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Whether any issue is a cycle.
    pub fn has_cycle(&self) -> bool {
        self.errors
            .iter()
            .any(|e| matches!(e, ValidationIssue::Cycle(_)))
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}

/// Validate the structure of a workflow. Never fails; problems are reported.
pub fn validate(workflow: &Workflow) -> ValidationReport {
    let mut errors = Vec::new();

    if workflow.steps.is_empty() {
        errors.push(ValidationIssue::NoSteps);
    }

    // Unique ids
    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, step) in workflow.steps.iter().enumerate() {
        if index.insert(step.id.as_str(), i).is_some() {
            errors.push(ValidationIssue::DuplicateStep(step.id.clone()));
        }
    }

    // References and control-flow graph
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..workflow.steps.len()).map(|i| graph.add_node(i)).collect();
    for (i, step) in workflow.steps.iter().enumerate() {
        for (kind, target) in step.references() {
            match index.get(target) {
                Some(&j) => {
                    graph.update_edge(nodes[i], nodes[j], ());
                }
                None => errors.push(ValidationIssue::DanglingReference {
                    step: step.id.clone(),
                    kind: kind.to_string(),
                    target: target.to_string(),
                }),
            }
        }
    }

    for component in tarjan_scc(&graph) {
        let is_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|&n| graph.contains_edge(n, n));
        if is_cycle {
            let mut members: Vec<usize> = component.iter().map(|&n| graph[n]).collect();
            members.sort_unstable();
            errors.push(ValidationIssue::Cycle(
                members
                    .into_iter()
                    .map(|i| workflow.steps[i].id.clone())
                    .collect(),
            ));
        }
    }

    check_step_config(workflow, &mut errors);
    check_triggers(&workflow.triggers, &mut errors);

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

fn check_step_config(workflow: &Workflow, errors: &mut Vec<ValidationIssue>) {
    let invalid = |errors: &mut Vec<ValidationIssue>, step: &str, message: String| {
        errors.push(ValidationIssue::InvalidStep {
            step: step.to_string(),
            message,
        });
    };

    let owned: HashSet<&str> = workflow.owned_step_ids().into_iter().collect();

    for step in &workflow.steps {
        for (kind, target) in step.references() {
            let scheduled = matches!(kind, "next" | "branch" | "on_error");
            if scheduled && (owned.contains(step.id.as_str()) || owned.contains(target)) {
                errors.push(ValidationIssue::OwnedStepEdge {
                    step: step.id.clone(),
                    kind: kind.to_string(),
                    target: target.to_string(),
                });
            }
        }

        match step.step_type {
            StepType::Tool if step.config.tool.as_deref().is_none_or(str::is_empty) => {
                invalid(errors, &step.id, "tool steps require a tool name".into());
            }
            StepType::Thought if step.config.prompt.is_none() => {
                invalid(errors, &step.id, "thought steps require a prompt".into());
            }
            StepType::Condition if step.condition.is_none() && step.branches.is_empty() => {
                invalid(errors, &step.id, "condition steps require a condition or branches".into());
            }
            StepType::Parallel if step.config.steps.is_empty() => {
                invalid(errors, &step.id, "parallel steps require at least one child step".into());
            }
            StepType::Loop if step.config.body.is_none() => {
                invalid(errors, &step.id, "loop steps require a body step".into());
            }
            _ => {}
        }

        if step.config.concurrency == Some(0) {
            invalid(errors, &step.id, "concurrency must be at least 1".into());
        }

        if owned.contains(step.id.as_str()) && step.step_type == StepType::Condition {
            invalid(
                errors,
                &step.id,
                "condition steps cannot run as a parallel child, loop body or fallback".into(),
            );
        }

        let expressions = step
            .condition
            .iter()
            .chain(step.branches.iter().filter_map(|b| b.condition.as_ref()))
            .chain(step.config.loop_condition.iter());
        for source in expressions {
            if let Err(e) = Expr::parse(source) {
                invalid(errors, &step.id, format!("invalid expression '{source}': {e}"));
            }
        }
    }
}

fn check_triggers(triggers: &[Trigger], errors: &mut Vec<ValidationIssue>) {
    for trigger in triggers {
        match trigger {
            Trigger::Schedule { cron } => {
                if let Err(e) = cron.parse::<croner::Cron>() {
                    errors.push(ValidationIssue::InvalidTrigger(format!(
                        "schedule '{cron}': {e}"
                    )));
                }
            }
            Trigger::Webhook { path } if !path.starts_with('/') => {
                errors.push(ValidationIssue::InvalidTrigger(format!(
                    "webhook path '{path}' must start with '/'"
                )));
            }
            _ => {}
        }
    }
}
