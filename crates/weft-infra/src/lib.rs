//! Infrastructure layer for Weft.
//!
//! Contains implementations of the ports defined in `weft-core`: the SQLite
//! storage backend, the built-in tool invoker, and the OpenAI-compatible
//! reasoning provider. Also owns data directory resolution and config loading.

pub mod config;
pub mod reasoning;
pub mod sqlite;
pub mod tool;
