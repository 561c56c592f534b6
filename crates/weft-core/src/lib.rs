//! Workflow orchestration core for Weft.
//!
//! This crate holds the workflow file parser, the step and flow-control executors, the
//! workflow engine, and the "ports" the engine depends on: the
//! `StorageBackend` repository trait and the `ToolInvoker` /
//! `ReasoningProvider` collaborator traits. It depends only on `weft-types`
//! -- never on `weft-infra` or any database/IO crate.

pub mod invoker;
pub mod repository;
pub mod workflow;
