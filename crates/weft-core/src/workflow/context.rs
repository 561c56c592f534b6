//! Execution context with write-once outputs and `{{path}}` substitution.
//!
//! `ExecutionContext` is the mutable state that flows through one workflow
//! run: caller-visible variables, step outputs keyed by `output_key`, the
//! status of every step, and the branch each condition step selected.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use weft_types::execution::{StepStatus, WorkflowExecution};

/// Errors raised while mutating an execution context.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("output '{0}' has already been written in this run")]
    OutputAlreadySet(String),
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Mutable state scoped to a single workflow run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Workflow variables merged with caller input (input wins).
    pub variables: HashMap<String, Value>,
    /// Step outputs, each key written at most once per run.
    pub outputs: HashMap<String, Value>,
    pub step_statuses: HashMap<String, StepStatus>,
    /// Branch selected by each condition step (step id -> branch id).
    pub branches: HashMap<String, String>,
}

impl ExecutionContext {
    /// Create a context seeded with `variables`, overridden by `input`.
    pub fn new(variables: &HashMap<String, Value>, input: HashMap<String, Value>) -> Self {
        let mut merged = variables.clone();
        merged.extend(input);
        Self {
            variables: merged,
            ..Self::default()
        }
    }

    /// Rebuild the context of a persisted execution (used by resume).
    pub fn from_execution(execution: &WorkflowExecution) -> Self {
        Self {
            variables: execution.variables.clone(),
            outputs: execution.outputs.clone(),
            step_statuses: execution.step_statuses.clone(),
            branches: execution.branches.clone(),
        }
    }

    /// Store a step output. Each key may be written once per run.
    pub fn set_output(&mut self, key: &str, value: Value) -> Result<(), ContextError> {
        if self.outputs.contains_key(key) {
            return Err(ContextError::OutputAlreadySet(key.to_string()));
        }
        self.outputs.insert(key.to_string(), value);
        Ok(())
    }

    pub fn output(&self, key: &str) -> Option<&Value> {
        self.outputs.get(key)
    }

    pub fn set_status(&mut self, step_id: &str, status: StepStatus) {
        self.step_statuses.insert(step_id.to_string(), status);
    }

    pub fn status(&self, step_id: &str) -> Option<StepStatus> {
        self.step_statuses.get(step_id).copied()
    }

    /// Resolve a dot-separated path, first against variables, then outputs.
    ///
    /// Numeric segments index into arrays (`items.0.name`).
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let head = segments.next().filter(|s| !s.is_empty())?;
        let root = self
            .variables
            .get(head)
            .or_else(|| self.outputs.get(head))?;

        segments.try_fold(root, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Replace `{{path}}` tokens in `template`.
    ///
    /// String values are inserted raw, anything else as compact JSON.
    /// Tokens that do not resolve are left verbatim.
    pub fn replace_variables(&self, template: &str) -> String {
        let mut result = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            let end = start + 2 + len + 2;
            result.push_str(&rest[..start]);

            let path = rest[start + 2..end - 2].trim();
            match self.lookup(path) {
                Some(value) => result.push_str(&value_to_string(value)),
                None => result.push_str(&rest[start..end]),
            }
            rest = &rest[end..];
        }

        result.push_str(rest);
        result
    }

    /// Substitute every string value of a tool input template, recursing
    /// into nested arrays and objects.
    pub fn prepare_input(&self, input: &Map<String, Value>) -> Map<String, Value> {
        input
            .iter()
            .map(|(k, v)| (k.clone(), self.prepare_value(v)))
            .collect()
    }

    fn prepare_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.replace_variables(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.prepare_value(v)).collect()),
            Value::Object(map) => Value::Object(self.prepare_input(map)),
            other => other.clone(),
        }
    }

    /// Fold the results of a child context back into this one.
    ///
    /// Outputs this context does not have yet are adopted; statuses and
    /// branch selections are overwritten. Returns the output keys that were
    /// already present and therefore dropped.
    pub fn absorb(&mut self, child: ExecutionContext) -> Vec<String> {
        let mut dropped = Vec::new();
        for (key, value) in child.outputs {
            match self.outputs.get(&key) {
                None => {
                    self.outputs.insert(key, value);
                }
                Some(existing) if *existing == value => {}
                Some(_) => dropped.push(key),
            }
        }
        self.step_statuses.extend(child.step_statuses);
        self.branches.extend(child.branches);
        dropped
    }
}

/// Render a JSON value for template substitution.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ctx(variables: Value, outputs: Value) -> ExecutionContext {
        let to_map = |v: Value| -> HashMap<String, Value> {
            serde_json::from_value(v).unwrap()
        };
        ExecutionContext {
            variables: to_map(variables),
            outputs: to_map(outputs),
            ..ExecutionContext::default()
        }
    }

    #[test]
    fn test_new_merges_input_over_variables() {
        let vars = HashMap::from([
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!(2)),
        ]);
        let input = HashMap::from([("b".to_string(), json!(20))]);
        let ctx = ExecutionContext::new(&vars, input);
        assert_eq!(ctx.variables["a"], json!(1));
        assert_eq!(ctx.variables["b"], json!(20));
    }

    #[test]
    fn test_replace_variables_prefers_variables_then_outputs() {
        let ctx = ctx(json!({"a": "x"}), json!({"b": "y", "a": "shadowed"}));
        assert_eq!(ctx.replace_variables("{{a}}-{{b}}"), "x-y");
    }

    #[test]
    fn test_replace_variables_is_idempotent() {
        let ctx = ctx(json!({"a": "x"}), json!({"b": "y"}));
        let once = ctx.replace_variables("{{a}}-{{b}}");
        let twice = ctx.replace_variables(&once);
        assert_eq!(once, twice);
        assert!(!twice.contains("{{"));
    }

    #[test]
    fn test_replace_variables_leaves_unresolved_tokens() {
        let ctx = ctx(json!({"a": "x"}), json!({}));
        assert_eq!(
            ctx.replace_variables("{{a}} and {{missing.path}} and {{ }}"),
            "x and {{missing.path}} and {{ }}"
        );
        assert_eq!(ctx.replace_variables("open {{a"), "open {{a");
    }

    #[test]
    fn test_replace_variables_nested_paths_and_json() {
        let ctx = ctx(
            json!({"user": {"name": "Ada", "tags": ["x", "y"]}}),
            json!({"count": 3, "obj": {"k": true}}),
        );
        assert_eq!(ctx.replace_variables("{{ user.name }}"), "Ada");
        assert_eq!(ctx.replace_variables("{{user.tags.1}}"), "y");
        assert_eq!(ctx.replace_variables("n={{count}}"), "n=3");
        assert_eq!(ctx.replace_variables("{{obj}}"), r#"{"k":true}"#);
    }

    #[test]
    fn test_prepare_input_recurses() {
        let ctx = ctx(json!({"url": "http://x"}), json!({}));
        let input = json!({
            "url": "{{url}}",
            "retries": 3,
            "headers": {"referer": "{{url}}/home"},
            "list": ["{{url}}", 1]
        });
        let prepared = ctx.prepare_input(input.as_object().unwrap());
        assert_eq!(
            Value::Object(prepared),
            json!({
                "url": "http://x",
                "retries": 3,
                "headers": {"referer": "http://x/home"},
                "list": ["http://x", 1]
            })
        );
    }

    #[test]
    fn test_outputs_are_write_once() {
        let mut ctx = ExecutionContext::default();
        ctx.set_output("result", json!(1)).unwrap();
        let err = ctx.set_output("result", json!(2)).unwrap_err();
        assert_eq!(err, ContextError::OutputAlreadySet("result".into()));
        assert_eq!(ctx.output("result"), Some(&json!(1)));
    }

    #[test]
    fn test_absorb_keeps_existing_outputs() {
        let mut parent = ExecutionContext::default();
        parent.set_output("shared", json!("parent")).unwrap();

        let mut child = parent.clone();
        child.outputs.insert("shared".into(), json!("child"));
        child.set_output("fresh", json!(42)).unwrap();
        child.set_status("c1", StepStatus::Completed);

        let dropped = parent.absorb(child);
        assert_eq!(dropped, vec!["shared".to_string()]);
        assert_eq!(parent.outputs["shared"], json!("parent"));
        assert_eq!(parent.outputs["fresh"], json!(42));
        assert_eq!(parent.status("c1"), Some(StepStatus::Completed));
    }
}
