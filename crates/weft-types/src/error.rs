use thiserror::Error;

/// Errors from storage backend operations (used by trait definitions in weft-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors raised by a tool invoker.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: '{0}'")]
    UnknownTool(String),

    #[error("invalid input for tool '{tool}': {message}")]
    InvalidInput { tool: String, message: String },

    #[error("tool '{tool}' failed: {message}")]
    Failed { tool: String, message: String },
}

/// Errors raised by a reasoning provider.
#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("reasoning provider not configured")]
    NotConfigured,

    #[error("reasoning request failed: {0}")]
    Request(String),

    #[error("reasoning provider returned an empty response")]
    EmptyResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_tool_error_display() {
        let err = ToolError::Failed {
            tool: "http".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "tool 'http' failed: connection refused");
        assert_eq!(
            ToolError::UnknownTool("nope".into()).to_string(),
            "unknown tool: 'nope'"
        );
    }
}
