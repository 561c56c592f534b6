//! Collaborator ports the engine calls through: tools and reasoning.

pub mod reasoning;
pub mod tool;

pub use reasoning::{BoxReasoningProvider, ReasoningProvider, Unconfigured};
pub use tool::{BoxToolInvoker, NoTools, ToolInvoker};
