//! Repository trait definitions (ports) and the in-memory adapter.

pub mod memory;
pub mod storage;
