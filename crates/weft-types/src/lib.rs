//! Shared domain types for Weft.
//!
//! This crate contains the workflow graph (`Workflow`, `WorkflowStep`), the
//! persisted execution record (`WorkflowExecution`), engine configuration and
//! the error types shared across crates.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod execution;
pub mod workflow;
