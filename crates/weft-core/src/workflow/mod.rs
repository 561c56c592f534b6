//! Workflow engine core: spec parsing, validation, step execution, and the
//! ready-queue scheduler.
//!
//! - `parser` -- JSON/YAML spec parsing, dependency resolution, export
//! - `graph` -- structural validation and cycle detection
//! - `context` -- execution context with write-once outputs and templating
//! - `expression` -- boolean expression language for conditions and loops
//! - `executors` -- one executor per step type plus retry/fallback policy
//! - `runner` -- step dispatch, timeouts, and failure policy
//! - `engine` -- scheduling, persistence, pause and resume

pub mod context;
pub mod engine;
pub mod executors;
pub mod expression;
pub mod graph;
pub mod parser;
pub mod runner;
