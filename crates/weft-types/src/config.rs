//! Configuration types for Weft.
//!
//! `WeftConfig` is the top-level `config.toml` in the data directory. All
//! fields have defaults so an empty or missing file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeftConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    /// OpenAI-compatible endpoint used by thought steps. Absent = thought steps fail.
    #[serde(default)]
    pub reasoning: Option<ReasoningConfig>,

    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Engine-wide defaults applied when a step does not specify its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Batch size for parallel steps without `concurrency`.
    #[serde(default = "default_concurrency")]
    pub default_concurrency: usize,

    /// Iteration cap for loop steps without `max_iterations`.
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: u32,

    /// Number of executions shown by history listings.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
}

fn default_concurrency() -> usize {
    5
}

fn default_max_iterations() -> u32 {
    10
}

fn default_history_limit() -> u32 {
    20
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_concurrency: default_concurrency(),
            default_max_iterations: default_max_iterations(),
            history_limit: default_history_limit(),
        }
    }
}

/// Connection settings for the OpenAI-compatible reasoning provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// API base URL (e.g. "https://api.openai.com/v1" or a local server).
    pub base_url: String,
    /// Model used when a step gives no model hint.
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Settings for the built-in tool invoker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Request timeout for the `http` tool, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = WeftConfig::default();
        assert_eq!(config.engine.default_concurrency, 5);
        assert_eq!(config.engine.default_max_iterations, 10);
        assert!(config.reasoning.is_none());
        assert_eq!(config.tools.http_timeout_secs, 30);
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: WeftConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_config_deserialize_with_values() {
        let toml_str = r#"
[engine]
default_concurrency = 2

[reasoning]
base_url = "http://localhost:11434/v1"
model = "llama3"
"#;
        let config: WeftConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.default_concurrency, 2);
        assert_eq!(config.engine.default_max_iterations, 10);
        let reasoning = config.reasoning.unwrap();
        assert_eq!(reasoning.model, "llama3");
        assert_eq!(reasoning.api_key_env, "OPENAI_API_KEY");
    }
}
