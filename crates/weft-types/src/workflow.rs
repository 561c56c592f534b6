//! Workflow graph types for Weft.
//!
//! A `Workflow` is the immutable, validated in-memory form of a workflow spec
//! document. Steps reference each other by id through `next` edges, condition
//! branches, error-handling targets and the child lists of `parallel` / `loop`
//! steps.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// An immutable workflow definition: metadata plus a graph of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// UUIDv7 assigned by the parser when the document carries none.
    pub id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    /// Version string (default "1.0.0").
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared triggers. Stored metadata only; the engine never fires them.
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    /// Initial variable bindings, overridden by caller input.
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    /// Steps in declaration order.
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Ids of steps that are only ever run on behalf of another step:
    /// parallel children, loop bodies and fallback steps.
    ///
    /// The engine never schedules these on its own.
    pub fn owned_step_ids(&self) -> Vec<&str> {
        let mut owned = Vec::new();
        for step in &self.steps {
            owned.extend(step.config.steps.iter().map(String::as_str));
            if let Some(body) = step.config.body.as_deref() {
                owned.push(body);
            }
            if let Some(fallback) = step
                .error_handling
                .as_ref()
                .and_then(|eh| eh.fallback.as_deref())
            {
                owned.push(fallback);
            }
        }
        owned
    }
}

/// How a workflow can be started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Schedule { cron: String },
    Event { event: String },
    Webhook { path: String },
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// A single unit of work in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Unique within the workflow.
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub config: StepConfig,
    /// Successors, followed unconditionally unless this is a condition step.
    #[serde(default)]
    pub next: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandling>,
    /// Boolean expression, only meaningful for condition steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<BranchConfig>,
}

impl WorkflowStep {
    /// Create a step with default configuration and no edges.
    pub fn new(id: impl Into<String>, step_type: StepType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            step_type,
            config: StepConfig::default(),
            next: Vec::new(),
            error_handling: None,
            condition: None,
            branches: Vec::new(),
        }
    }

    /// Every step id this step refers to, with the kind of reference.
    pub fn references(&self) -> Vec<(&'static str, &str)> {
        let mut refs: Vec<(&'static str, &str)> =
            self.next.iter().map(|t| ("next", t.as_str())).collect();
        refs.extend(self.branches.iter().map(|b| ("branch", b.step_id.as_str())));
        if let Some(eh) = &self.error_handling {
            if let Some(target) = eh.on_error.as_deref() {
                refs.push(("on_error", target));
            }
            if let Some(target) = eh.fallback.as_deref() {
                refs.push(("fallback", target));
            }
        }
        refs.extend(self.config.steps.iter().map(|t| ("parallel step", t.as_str())));
        if let Some(body) = self.config.body.as_deref() {
            refs.push(("loop body", body));
        }
        refs
    }
}

/// The kind of step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Thought,
    Task,
    Tool,
    Condition,
    Parallel,
    Loop,
    Input,
    Output,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepType::Thought => "thought",
            StepType::Task => "task",
            StepType::Tool => "tool",
            StepType::Condition => "condition",
            StepType::Parallel => "parallel",
            StepType::Loop => "loop",
            StepType::Input => "input",
            StepType::Output => "output",
        };
        write!(f, "{s}")
    }
}

/// Per-step configuration. Which fields matter depends on the step type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepConfig {
    /// Model hint passed to the reasoning provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Prompt template for thought steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Tool name for tool steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Tool input template; string values are substituted before the call.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub input: serde_json::Map<String, Value>,
    /// Key under which the step's result is stored in the run outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    /// Per-attempt deadline in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Retry count used when no `error_handling` block is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    /// Delay between loop iterations in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    /// Evaluated after each loop iteration; the loop continues while truthy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_condition: Option<String>,
    /// Loop body step id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Child step ids of a parallel step, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    /// Batch size for parallel steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

/// Failure policy for a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorHandling {
    /// Additional attempts after the first failure.
    #[serde(default)]
    pub max_retries: u32,
    /// Base retry delay in milliseconds; attempt `n` waits `n * retry_delay_ms`.
    #[serde(default)]
    pub retry_delay_ms: u64,
    /// Step to continue with when this step fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<String>,
    /// Step run in place of this one when it fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

/// A condition-gated successor of a condition step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchConfig {
    /// Branch id; `"true"` and `"false"` match the evaluated condition.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub step_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_workflow() -> Workflow {
        let mut fetch = WorkflowStep::new("fetch", StepType::Tool);
        fetch.config.tool = Some("http".into());
        fetch.next = vec!["fan".into()];
        fetch.error_handling = Some(ErrorHandling {
            max_retries: 2,
            retry_delay_ms: 100,
            on_error: None,
            fallback: Some("cached".into()),
        });

        let mut fan = WorkflowStep::new("fan", StepType::Parallel);
        fan.config.steps = vec!["a".into(), "b".into()];

        Workflow {
            id: Uuid::now_v7(),
            name: "sample".into(),
            version: "1.0.0".into(),
            description: None,
            triggers: vec![Trigger::Manual],
            variables: HashMap::new(),
            steps: vec![
                fetch,
                fan,
                WorkflowStep::new("a", StepType::Task),
                WorkflowStep::new("b", StepType::Task),
                WorkflowStep::new("cached", StepType::Task),
            ],
        }
    }

    #[test]
    fn test_owned_step_ids() {
        let wf = sample_workflow();
        let mut owned = wf.owned_step_ids();
        owned.sort_unstable();
        assert_eq!(owned, vec!["a", "b", "cached"]);
    }

    #[test]
    fn test_references_cover_all_edge_kinds() {
        let wf = sample_workflow();
        let refs = wf.step("fetch").unwrap().references();
        assert!(refs.contains(&("next", "fan")));
        assert!(refs.contains(&("fallback", "cached")));

        let refs = wf.step("fan").unwrap().references();
        assert_eq!(refs, vec![("parallel step", "a"), ("parallel step", "b")]);
    }

    #[test]
    fn test_workflow_json_roundtrip() {
        let wf = sample_workflow();
        let json = serde_json::to_string(&wf).unwrap();
        let parsed: Workflow = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, wf.id);
        assert_eq!(parsed.steps.len(), 5);
        assert_eq!(parsed.steps[0].step_type, StepType::Tool);
        assert_eq!(parsed.steps[1].config.steps, vec!["a", "b"]);
    }

    #[test]
    fn test_trigger_serde_tagged() {
        let trigger = Trigger::Schedule {
            cron: "0 9 * * *".into(),
        };
        let json = serde_json::to_value(&trigger).unwrap();
        assert_eq!(json["type"], "schedule");
        assert_eq!(json["cron"], "0 9 * * *");

        let yaml = "type: webhook\npath: /hooks/deploy\n";
        let parsed: Trigger = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(
            parsed,
            Trigger::Webhook {
                path: "/hooks/deploy".into()
            }
        );
    }

    #[test]
    fn test_step_type_display() {
        assert_eq!(StepType::Loop.to_string(), "loop");
        assert_eq!(
            serde_json::to_value(StepType::Condition).unwrap(),
            serde_json::json!("condition")
        );
    }
}
