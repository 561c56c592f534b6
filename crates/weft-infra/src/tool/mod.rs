//! Tool invoker implementations.
//!
//! The engine only sees `weft_core::invoker::ToolInvoker`; this module
//! provides the built-in set that the CLI wires in.

pub mod builtin;

pub use builtin::BuiltinToolInvoker;
