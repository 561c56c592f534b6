//! In-memory storage backend for tests and ephemeral runs.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;
use weft_types::error::RepositoryError;
use weft_types::execution::WorkflowExecution;
use weft_types::workflow::Workflow;

use super::storage::StorageBackend;

/// Map-backed [`StorageBackend`]. Clones share the same maps.
///
/// Writes to one execution id serialize on the DashMap shard lock.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    workflows: Arc<DashMap<Uuid, Workflow>>,
    executions: Arc<DashMap<Uuid, WorkflowExecution>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for InMemoryStore {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        self.workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.workflows.get(id).map(|w| w.clone()))
    }

    async fn get_workflow_by_name(&self, name: &str) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self
            .workflows
            .iter()
            .filter(|w| w.name == name)
            .max_by_key(|w| w.id)
            .map(|w| w.clone()))
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let mut all: Vec<Workflow> = self.workflows.iter().map(|w| w.clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn delete_workflow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        Ok(self.workflows.remove(id).is_some())
    }

    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        match self.executions.entry(execution.id) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_finished() {
                    return Err(RepositoryError::Conflict(format!(
                        "execution {} is already finished",
                        execution.id
                    )));
                }
                entry.insert(execution.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(execution.clone());
            }
        }
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        Ok(self.executions.get(id).map(|e| e.clone()))
    }

    async fn list_executions(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let mut matching: Vec<WorkflowExecution> = self
            .executions
            .iter()
            .filter(|e| workflow_id.is_none_or(|wf| e.workflow_id == *wf))
            .map(|e| e.clone())
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn delete_execution(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        Ok(self.executions.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{Duration, Utc};
    use weft_types::execution::ExecutionStatus;
    use weft_types::workflow::{StepType, WorkflowStep};

    use super::*;

    fn sample_workflow(name: &str) -> Workflow {
        Workflow {
            id: Uuid::now_v7(),
            name: name.to_string(),
            version: "1.0.0".to_string(),
            description: None,
            triggers: Vec::new(),
            variables: HashMap::new(),
            steps: vec![WorkflowStep::new("only", StepType::Task)],
        }
    }

    #[tokio::test]
    async fn test_workflow_crud() {
        let store = InMemoryStore::new();
        let wf = sample_workflow("daily");
        store.save_workflow(&wf).await.unwrap();

        let fetched = store.get_workflow(&wf.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "daily");
        assert!(store.get_workflow_by_name("daily").await.unwrap().is_some());
        assert_eq!(store.list_workflows().await.unwrap().len(), 1);

        assert!(store.delete_workflow(&wf.id).await.unwrap());
        assert!(!store.delete_workflow(&wf.id).await.unwrap());
        assert!(store.get_workflow(&wf.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_executions_newest_first_with_filter() {
        let store = InMemoryStore::new();
        let wf_a = Uuid::now_v7();
        let wf_b = Uuid::now_v7();
        let now = Utc::now();

        for (i, wf) in [wf_a, wf_b, wf_a, wf_a].into_iter().enumerate() {
            let mut exec = WorkflowExecution::new(wf, HashMap::new());
            exec.started_at = now + Duration::seconds(i as i64);
            store.save_execution(&exec).await.unwrap();
        }

        let all = store.list_executions(None, 10).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].started_at >= w[1].started_at));

        let only_a = store.list_executions(Some(&wf_a), 2).await.unwrap();
        assert_eq!(only_a.len(), 2);
        assert!(only_a.iter().all(|e| e.workflow_id == wf_a));
        assert_eq!(only_a[0].started_at, now + Duration::seconds(3));
    }

    #[tokio::test]
    async fn test_finished_execution_is_immutable() {
        let store = InMemoryStore::new();
        let mut exec = WorkflowExecution::new(Uuid::now_v7(), HashMap::new());
        exec.status = ExecutionStatus::Running;
        store.save_execution(&exec).await.unwrap();

        exec.status = ExecutionStatus::Completed;
        exec.finished_at = Some(Utc::now());
        store.save_execution(&exec).await.unwrap();

        exec.status = ExecutionStatus::Failed;
        let err = store.save_execution(&exec).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let stored = store.get_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
        assert!(store.delete_execution(&exec.id).await.unwrap());
    }
}
