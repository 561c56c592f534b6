//! Workflow spec parsing, dependency resolution and export.
//!
//! A spec document (JSON or YAML) is deserialized into [`SpecDocument`], then
//! lowered into a [`Workflow`]:
//! - `depends_on` entries become forward `next` edges on the predecessor
//! - a step with no successor is chained to the following declared step
//!   only when that step has no incoming edge of its own. In `a, b,
//!   c (depends_on: [a])`, `b` stays an independent root rather than
//!   feeding `c`, and adjacent branch targets are never chained together
//! - `if` / `on_true` / `on_false` become a condition step with `"true"` /
//!   `"false"` branches
//! - `retry`, `on_error` and `fallback` become the step's error handling
//!
//! Parsing only checks structure. Call [`super::graph::validate`] for
//! reference, cycle and configuration checks.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;
use weft_types::workflow::{
    BranchConfig, ErrorHandling, StepConfig, StepType, Trigger, Workflow, WorkflowStep,
};

/// Errors from parsing a workflow spec.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON workflow spec: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML workflow spec: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("step '{step}': {message}")]
    InvalidStep { step: String, message: String },

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Textual encoding of a spec document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Json,
    Yaml,
}

impl SpecFormat {
    /// Guess the format from content: a leading `{` means JSON.
    pub fn detect(content: &str) -> Self {
        if content.trim_start().starts_with('{') {
            SpecFormat::Json
        } else {
            SpecFormat::Yaml
        }
    }

    /// Pick the format from a file extension, falling back to `detect`.
    pub fn from_path(path: &Path, content: &str) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => SpecFormat::Json,
            Some("yaml" | "yml") => SpecFormat::Yaml,
            _ => Self::detect(content),
        }
    }
}

// ---------------------------------------------------------------------------
// Spec document
// ---------------------------------------------------------------------------

/// The workflow spec as written by users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, Value>,
    pub steps: Vec<SpecStep>,
}

/// One step entry of a spec document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecStep {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<StepType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, alias = "toolInput", skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<Map<String, Value>>,
    #[serde(default, alias = "outputKey", skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(default, alias = "dependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next: Vec<String>,
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, alias = "onTrue", skip_serializing_if = "Option::is_none")]
    pub on_true: Option<String>,
    #[serde(default, alias = "onFalse", skip_serializing_if = "Option::is_none")]
    pub on_false: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<SpecRetry>,
    /// Per-attempt timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, alias = "onError", skip_serializing_if = "Option::is_none")]
    pub on_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    /// Parallel children.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, alias = "maxIterations", skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(rename = "while", default, skip_serializing_if = "Option::is_none")]
    pub loop_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Loop inter-iteration delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecRetry {
    #[serde(alias = "maxAttempts")]
    pub max_attempts: u32,
    /// Base delay in milliseconds.
    #[serde(default)]
    pub delay: u64,
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

/// Parse a spec document into a workflow graph.
pub fn parse(content: &str, format: SpecFormat) -> Result<Workflow, ParseError> {
    let doc: SpecDocument = match format {
        SpecFormat::Json => serde_json::from_str(content)?,
        SpecFormat::Yaml => serde_yaml_ng::from_str(content)?,
    };
    from_document(doc)
}

/// Read and parse a spec file, choosing the format from its extension.
pub fn load_workflow_file(path: &Path) -> Result<Workflow, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse(&content, SpecFormat::from_path(path, &content))
}

/// Lower a deserialized document into a workflow.
pub fn from_document(doc: SpecDocument) -> Result<Workflow, ParseError> {
    let dependencies: Vec<(String, Vec<String>)> = doc
        .steps
        .iter()
        .map(|s| (s.id.clone(), s.depends_on.clone()))
        .collect();

    let steps = doc
        .steps
        .into_iter()
        .map(lower_step)
        .collect::<Result<Vec<_>, _>>()?;

    let mut workflow = Workflow {
        id: doc.id.unwrap_or_else(Uuid::now_v7),
        name: doc.name,
        version: doc.version.unwrap_or_else(|| "1.0.0".to_string()),
        description: doc.description,
        triggers: doc.triggers,
        variables: doc.variables,
        steps,
    };

    resolve_dependencies(&mut workflow, &dependencies)?;

    tracing::debug!(
        workflow = %workflow.name,
        steps = workflow.steps.len(),
        "parsed workflow spec"
    );
    Ok(workflow)
}

fn lower_step(spec: SpecStep) -> Result<WorkflowStep, ParseError> {
    if spec.id.trim().is_empty() {
        return Err(ParseError::InvalidStep {
            step: spec.id,
            message: "step id must not be empty".into(),
        });
    }

    let step_type = match (spec.step_type, spec.condition.is_some()) {
        (None, true) | (Some(StepType::Condition), _) => StepType::Condition,
        (Some(other), true) => {
            return Err(ParseError::InvalidStep {
                step: spec.id,
                message: format!("'if' is only allowed on condition steps, not {other}"),
            });
        }
        (Some(other), false) => other,
        (None, false) => {
            return Err(ParseError::InvalidStep {
                step: spec.id,
                message: "missing step type".into(),
            });
        }
    };

    let mut branches = Vec::new();
    if let Some(target) = spec.on_true {
        branches.push(BranchConfig {
            id: "true".into(),
            condition: None,
            step_id: target,
        });
    }
    if let Some(target) = spec.on_false {
        branches.push(BranchConfig {
            id: "false".into(),
            condition: None,
            step_id: target,
        });
    }

    let error_handling = if spec.retry.is_some() || spec.on_error.is_some() || spec.fallback.is_some() {
        let (max_retries, retry_delay_ms) = spec
            .retry
            .map(|r| (r.max_attempts, r.delay))
            .unwrap_or_default();
        Some(ErrorHandling {
            max_retries,
            retry_delay_ms,
            on_error: spec.on_error,
            fallback: spec.fallback,
        })
    } else {
        None
    };

    Ok(WorkflowStep {
        name: spec.name.unwrap_or_else(|| spec.id.clone()),
        id: spec.id,
        step_type,
        config: StepConfig {
            model: spec.model,
            prompt: spec.prompt,
            tool: spec.tool,
            input: spec.tool_input.unwrap_or_default(),
            output_key: spec.output_key,
            timeout_ms: spec.timeout,
            retries: None,
            delay_ms: spec.delay,
            max_iterations: spec.max_iterations,
            loop_condition: spec.loop_condition,
            body: spec.body,
            steps: spec.steps,
            concurrency: spec.concurrency,
        },
        next: spec.next,
        error_handling,
        condition: spec.condition,
        branches,
    })
}

/// Turn `depends_on` declarations into forward `next` edges, then chain
/// steps without successors to the following step in declaration order.
///
/// A step is chained only to a following step with no incoming edge (no
/// `depends_on`, and not a branch, `on_error`, fallback, child or body
/// target), and never to a step that already leads back to it.
pub fn resolve_dependencies(
    workflow: &mut Workflow,
    dependencies: &[(String, Vec<String>)],
) -> Result<(), ParseError> {
    let index: HashMap<String, usize> = workflow
        .steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.clone(), i))
        .collect();

    for (step_id, deps) in dependencies {
        for dep in deps {
            let &i = index.get(dep).ok_or_else(|| ParseError::UnknownDependency {
                step: step_id.clone(),
                dependency: dep.clone(),
            })?;
            let next = &mut workflow.steps[i].next;
            if !next.contains(step_id) {
                next.push(step_id.clone());
            }
        }
    }

    let mut has_incoming: HashSet<String> = workflow
        .steps
        .iter()
        .flat_map(|s| s.references().into_iter().map(|(_, t)| t.to_string()))
        .collect();
    has_incoming.extend(
        dependencies
            .iter()
            .filter(|(_, deps)| !deps.is_empty())
            .map(|(id, _)| id.clone()),
    );

    let owned: HashSet<String> = workflow
        .owned_step_ids()
        .into_iter()
        .map(str::to_string)
        .collect();

    for i in 0..workflow.steps.len().saturating_sub(1) {
        let following = workflow.steps[i + 1].id.clone();
        let current = &workflow.steps[i];
        let has_successor = !current.next.is_empty() || !current.branches.is_empty();
        if has_successor || owned.contains(&current.id) || has_incoming.contains(&following) {
            continue;
        }
        if reaches(workflow, &following, &current.id) {
            continue;
        }
        workflow.steps[i].next.push(following.clone());
        has_incoming.insert(following);
    }

    Ok(())
}

/// Whether `to` is reachable from `from` over `next` and branch edges.
fn reaches(workflow: &Workflow, from: &str, to: &str) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![from];
    while let Some(id) = stack.pop() {
        if id == to {
            return true;
        }
        if !seen.insert(id) {
            continue;
        }
        if let Some(step) = workflow.step(id) {
            stack.extend(step.next.iter().map(String::as_str));
            stack.extend(step.branches.iter().map(|b| b.step_id.as_str()));
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Convert a workflow back into spec form.
///
/// Lossy: custom branch conditions, branch ids other than `"true"` /
/// `"false"` and the `retries` shorthand have no spec representation.
/// Dependencies are emitted as `depends_on` rebuilt from `next` edges.
pub fn to_document(workflow: &Workflow) -> SpecDocument {
    let mut depends_on: HashMap<&str, Vec<String>> = HashMap::new();
    for step in &workflow.steps {
        for target in &step.next {
            depends_on
                .entry(target.as_str())
                .or_default()
                .push(step.id.clone());
        }
    }

    let steps = workflow
        .steps
        .iter()
        .map(|step| {
            let branch = |id: &str| {
                step.branches
                    .iter()
                    .find(|b| b.id == id)
                    .map(|b| b.step_id.clone())
            };
            let eh = step.error_handling.clone().unwrap_or_default();
            SpecStep {
                id: step.id.clone(),
                name: (step.name != step.id).then(|| step.name.clone()),
                step_type: Some(step.step_type),
                prompt: step.config.prompt.clone(),
                model: step.config.model.clone(),
                tool: step.config.tool.clone(),
                tool_input: (!step.config.input.is_empty()).then(|| step.config.input.clone()),
                output_key: step.config.output_key.clone(),
                depends_on: depends_on.remove(step.id.as_str()).unwrap_or_default(),
                next: Vec::new(),
                condition: step.condition.clone(),
                on_true: branch("true"),
                on_false: branch("false"),
                retry: (eh.max_retries > 0).then_some(SpecRetry {
                    max_attempts: eh.max_retries,
                    delay: eh.retry_delay_ms,
                }),
                timeout: step.config.timeout_ms,
                on_error: eh.on_error,
                fallback: eh.fallback,
                steps: step.config.steps.clone(),
                concurrency: step.config.concurrency,
                max_iterations: step.config.max_iterations,
                loop_condition: step.config.loop_condition.clone(),
                body: step.config.body.clone(),
                delay: step.config.delay_ms,
            }
        })
        .collect();

    SpecDocument {
        name: workflow.name.clone(),
        id: Some(workflow.id),
        version: Some(workflow.version.clone()),
        description: workflow.description.clone(),
        triggers: workflow.triggers.clone(),
        variables: workflow.variables.clone(),
        steps,
    }
}

/// Export a workflow as a pretty-printed JSON spec.
pub fn to_json(workflow: &Workflow) -> Result<String, ParseError> {
    Ok(serde_json::to_string_pretty(&to_document(workflow))?)
}

/// Export a workflow as a YAML spec.
pub fn to_yaml(workflow: &Workflow) -> Result<String, ParseError> {
    Ok(serde_yaml_ng::to_string(&to_document(workflow))?)
}
