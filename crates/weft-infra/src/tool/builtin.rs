//! Built-in tools available to every workflow.
//!
//! | name    | input                                   | output                      |
//! |---------|-----------------------------------------|-----------------------------|
//! | `echo`  | any object                              | the same object             |
//! | `sleep` | `{ms}`                                  | `{slept_ms}`                |
//! | `http`  | `{url, method?, headers?, body?}`       | `{status, headers, body}`   |
//!
//! The `http` body is parsed as JSON when possible, otherwise returned as text.
//! Non-2xx responses fail the invocation.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value, json};
use weft_core::invoker::ToolInvoker;
use weft_types::config::ToolsConfig;
use weft_types::error::ToolError;

/// Tool invoker backing the `echo`, `sleep` and `http` tools.
pub struct BuiltinToolInvoker {
    http_client: reqwest::Client,
}

impl BuiltinToolInvoker {
    pub fn new(config: &ToolsConfig) -> Result<Self, ToolError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(concat!("weft/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::Failed {
                tool: "http".to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { http_client })
    }

    async fn sleep(&self, input: &Map<String, Value>) -> Result<Value, ToolError> {
        let ms = input
            .get("ms")
            .and_then(Value::as_u64)
            .ok_or_else(|| invalid("sleep", "'ms' must be a non-negative integer"))?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({ "slept_ms": ms }))
    }

    async fn http(&self, input: &Map<String, Value>) -> Result<Value, ToolError> {
        let url = input
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("http", "'url' is required"))?;

        let method = input.get("method").and_then(Value::as_str).unwrap_or("GET");
        let http_method: reqwest::Method = method
            .to_uppercase()
            .parse()
            .map_err(|_| invalid("http", &format!("invalid HTTP method: {method}")))?;

        let mut request = self.http_client.request(http_method, url);

        if let Some(headers) = input.get("headers").and_then(Value::as_object) {
            for (key, value) in headers {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                request = request.header(key.as_str(), value);
            }
        }

        request = match input.get("body") {
            None | Some(Value::Null) => request,
            Some(Value::String(text)) => request.body(text.clone()),
            Some(other) => request.json(other),
        };

        let response = request.send().await.map_err(|e| failed("http", format!("request to '{url}' failed: {e}")))?;

        let status = response.status();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or("<binary>").to_string()))
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| failed("http", format!("failed to read response body: {e}")))?;

        tracing::info!(url, status = status.as_u16(), body_len = text.len(), "http tool completed");

        if !status.is_success() {
            return Err(failed("http", format!("'{url}' returned {status}")));
        }

        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        Ok(json!({
            "status": status.as_u16(),
            "headers": headers,
            "body": body,
        }))
    }
}

impl ToolInvoker for BuiltinToolInvoker {
    async fn invoke(&self, name: &str, input: Map<String, Value>) -> Result<Value, ToolError> {
        match name {
            "echo" => Ok(Value::Object(input)),
            "sleep" => self.sleep(&input).await,
            "http" => self.http(&input).await,
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

fn invalid(tool: &str, message: &str) -> ToolError {
    ToolError::InvalidInput {
        tool: tool.to_string(),
        message: message.to_string(),
    }
}

fn failed(tool: &str, message: String) -> ToolError {
    ToolError::Failed {
        tool: tool.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn invoker() -> BuiltinToolInvoker {
        BuiltinToolInvoker::new(&ToolsConfig::default()).unwrap()
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    /// Serve exactly one canned HTTP response on a local port.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/data")
    }

    #[tokio::test]
    async fn echo_returns_input() {
        let out = invoker()
            .invoke("echo", object(json!({"text": "hi", "n": 2})))
            .await
            .unwrap();
        assert_eq!(out, json!({"text": "hi", "n": 2}));
    }

    #[tokio::test]
    async fn sleep_requires_ms() {
        let out = invoker().invoke("sleep", object(json!({"ms": 5}))).await.unwrap();
        assert_eq!(out, json!({"slept_ms": 5}));

        let err = invoker().invoke("sleep", Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let err = invoker().invoke("teleport", Map::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "unknown tool: 'teleport'");
    }

    #[tokio::test]
    async fn http_requires_url() {
        let err = invoker().invoke("http", Map::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid input for tool 'http': 'url' is required");
    }

    #[tokio::test]
    async fn http_get_parses_json_body() {
        let url = serve_once("200 OK", r#"{"items":[1,2,3]}"#).await;
        let out = invoker().invoke("http", object(json!({"url": url}))).await.unwrap();
        assert_eq!(out["status"], json!(200));
        assert_eq!(out["body"]["items"], json!([1, 2, 3]));
        assert_eq!(out["headers"]["content-type"], json!("application/json"));
    }

    #[tokio::test]
    async fn http_error_status_fails() {
        let url = serve_once("503 Service Unavailable", "{}").await;
        let err = invoker().invoke("http", object(json!({"url": url}))).await.unwrap_err();
        assert!(matches!(err, ToolError::Failed { .. }));
        assert!(err.to_string().contains("503"));
    }
}
