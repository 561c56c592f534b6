//! Application state wiring the engine to its concrete collaborators.
//!
//! The engine is generic over its storage backend; the CLI pins it to SQLite
//! in the data directory and injects the built-in tools and, when configured,
//! the OpenAI-compatible reasoning provider.

use std::path::Path;

use weft_core::invoker::{BoxReasoningProvider, BoxToolInvoker, Unconfigured};
use weft_core::workflow::engine::WorkflowEngine;
use weft_infra::config::{load_config, resolve_data_dir};
use weft_infra::reasoning::OpenAiReasoningProvider;
use weft_infra::sqlite::pool::{DatabasePool, database_url};
use weft_infra::sqlite::store::SqliteStore;
use weft_infra::tool::BuiltinToolInvoker;
use weft_types::config::{ReasoningConfig, WeftConfig};

/// Engine pinned to the SQLite store.
pub type Engine = WorkflowEngine<SqliteStore>;

/// Shared state for CLI command handlers.
pub struct AppState {
    pub engine: Engine,
    pub config: WeftConfig,
}

impl AppState {
    /// Initialize from the resolved data directory.
    pub async fn init() -> anyhow::Result<Self> {
        Self::open(&resolve_data_dir()).await
    }

    /// Initialize against an explicit data directory.
    pub async fn open(data_dir: &Path) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;

        let config = load_config(data_dir).await;
        let db_pool = DatabasePool::new(&database_url(data_dir)).await?;
        let store = SqliteStore::new(db_pool);

        let tools = BuiltinToolInvoker::new(&config.tools)?;
        let reasoning = build_reasoning(config.reasoning.as_ref());

        let engine = WorkflowEngine::new(
            store,
            BoxToolInvoker::new(tools),
            reasoning,
            config.engine.clone(),
        );

        tracing::debug!(data_dir = %data_dir.display(), "application state ready");

        Ok(Self { engine, config })
    }

    pub fn store(&self) -> &SqliteStore {
        self.engine.store()
    }
}

/// Thought steps fail with "not configured" rather than aborting startup.
fn build_reasoning(config: Option<&ReasoningConfig>) -> BoxReasoningProvider {
    let Some(config) = config else {
        return BoxReasoningProvider::new(Unconfigured);
    };
    match OpenAiReasoningProvider::from_config(config) {
        Ok(provider) => {
            tracing::debug!(base_url = %config.base_url, model = %config.model, "reasoning provider configured");
            BoxReasoningProvider::new(provider)
        }
        Err(e) => {
            tracing::warn!(error = %e, "reasoning provider unavailable, thought steps will fail");
            BoxReasoningProvider::new(Unconfigured)
        }
    }
}
