//! Configuration loading and data directory resolution.
//!
//! Reads `config.toml` from the data directory (`~/.weft/` by default) into
//! [`WeftConfig`]. A missing or malformed file yields the defaults, so the
//! engine always starts.

use std::path::{Path, PathBuf};

use weft_types::config::WeftConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "WEFT_DATA_DIR";

/// Resolve the data directory.
///
/// Order: `$WEFT_DATA_DIR`, then `~/.weft`, then `.weft` in the working directory.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".weft");
    }

    PathBuf::from(".weft")
}

/// Load configuration from `{data_dir}/config.toml`.
pub async fn load_config(data_dir: &Path) -> WeftConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %config_path.display(), "no config.toml, using defaults");
            return WeftConfig::default();
        }
        Err(err) => {
            tracing::warn!(path = %config_path.display(), error = %err, "failed to read config, using defaults");
            return WeftConfig::default();
        }
    };

    match toml::from_str::<WeftConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(path = %config_path.display(), error = %err, "failed to parse config, using defaults");
            WeftConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config.engine.default_concurrency, 5);
        assert_eq!(config.engine.default_max_iterations, 10);
        assert!(config.reasoning.is_none());
        assert_eq!(config.tools.http_timeout_secs, 30);
    }

    #[tokio::test]
    async fn valid_toml_is_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[engine]
default_concurrency = 2

[reasoning]
base_url = "http://localhost:11434/v1"
model = "llama3"

[tools]
http_timeout_secs = 5
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.engine.default_concurrency, 2);
        assert_eq!(config.engine.default_max_iterations, 10);
        let reasoning = config.reasoning.unwrap();
        assert_eq!(reasoning.model, "llama3");
        assert_eq!(reasoning.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.tools.http_timeout_secs, 5);
    }

    #[tokio::test]
    async fn invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "engine = [ not toml")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.engine.default_concurrency, 5);
        assert!(config.reasoning.is_none());
    }

    #[test]
    fn data_dir_from_env() {
        // SAFETY: no other test in this crate touches WEFT_DATA_DIR.
        unsafe {
            std::env::set_var(DATA_DIR_ENV, "/tmp/weft-test-data");
        }
        let dir = resolve_data_dir();
        unsafe {
            std::env::remove_var(DATA_DIR_ENV);
        }
        assert_eq!(dir, PathBuf::from("/tmp/weft-test-data"));
    }
}
