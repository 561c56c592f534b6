//! Execution tracking types.
//!
//! `WorkflowExecution` is the persisted record of one run. The engine is its
//! only writer; storage backends treat it as an opaque record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Lifecycle of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
}

impl ExecutionStatus {
    /// Whether the execution has reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Paused => "paused",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle of a single step within a run.
///
/// `pending -> running -> {completed | failed}`; steps on an unselected or
/// abandoned path are marked `skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Whether the step has been resolved and will not run again in this execution.
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecution
// ---------------------------------------------------------------------------

/// Persisted record of one workflow run.
///
/// Immutable once `finished_at` is set; storage backends reject later writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    /// Step currently (or most recently) dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default)]
    pub step_statuses: HashMap<String, StepStatus>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default)]
    pub outputs: HashMap<String, Value>,
    /// Branch selected by each condition step that has run (step id -> branch id).
    #[serde(default)]
    pub branches: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    /// Create a pending execution record for a workflow.
    pub fn new(workflow_id: Uuid, variables: HashMap<String, Value>) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id,
            status: ExecutionStatus::Pending,
            current_step: None,
            step_statuses: HashMap::new(),
            variables,
            outputs: HashMap::new(),
            branches: HashMap::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            paused_at: None,
        }
    }

    /// Whether the record is sealed against further writes.
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

// ---------------------------------------------------------------------------
// StepResult
// ---------------------------------------------------------------------------

/// Outcome of running one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock time spent in the step, in milliseconds.
    pub duration_ms: u64,
}

impl StepResult {
    pub fn ok(output: Option<Value>, duration_ms: u64) -> Self {
        Self {
            success: true,
            output,
            error: None,
            duration_ms,
        }
    }

    pub fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_status_serde() {
        let json = serde_json::to_value(ExecutionStatus::Paused).unwrap();
        assert_eq!(json, serde_json::json!("paused"));
        let parsed: ExecutionStatus = serde_json::from_value(serde_json::json!("failed")).unwrap();
        assert_eq!(parsed, ExecutionStatus::Failed);
        assert!(parsed.is_terminal());
        assert!(!ExecutionStatus::Paused.is_terminal());
    }

    #[test]
    fn test_step_status_resolved() {
        assert!(StepStatus::Skipped.is_resolved());
        assert!(StepStatus::Failed.is_resolved());
        assert!(!StepStatus::Running.is_resolved());
        assert_eq!(StepStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn test_new_execution_is_pending() {
        let exec = WorkflowExecution::new(Uuid::now_v7(), HashMap::new());
        assert_eq!(exec.status, ExecutionStatus::Pending);
        assert!(!exec.is_finished());
        assert!(exec.step_statuses.is_empty());
    }

    #[test]
    fn test_step_result_constructors() {
        let ok = StepResult::ok(Some(serde_json::json!(1)), 5);
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = StepResult::failed("boom", 7);
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert_eq!(failed.duration_ms, 7);
    }
}
