//! Storage backend trait definition.
//!
//! Defines the persistence interface for workflow definitions and execution
//! records. The in-memory backend lives in this crate; the infrastructure
//! layer (weft-infra) implements the trait with SQLite persistence.

use uuid::Uuid;
use weft_types::error::RepositoryError;
use weft_types::execution::WorkflowExecution;
use weft_types::workflow::Workflow;

/// Repository trait for workflow and execution persistence.
///
/// Records are opaque to the backend: all structural validation happens
/// above this layer. Writes to one execution id must be serialized; there is
/// no cross-execution locking requirement.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait StorageBackend: Send + Sync {
    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    /// Upsert a workflow definition (insert or replace by ID).
    fn save_workflow(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a workflow definition by its UUID.
    fn get_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// Get the most recently saved workflow with the given name.
    fn get_workflow_by_name(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// List all workflow definitions, ordered by name.
    fn list_workflows(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    /// Delete a workflow definition. Returns true if it existed.
    fn delete_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Upsert an execution record.
    ///
    /// Fails with [`RepositoryError::Conflict`] when the stored record already
    /// has `finished_at` set.
    fn save_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an execution record by its UUID.
    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowExecution>, RepositoryError>> + Send;

    /// List executions, newest first, optionally filtered by workflow.
    fn list_executions(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowExecution>, RepositoryError>> + Send;

    /// Delete an execution record. Returns true if it existed.
    fn delete_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
