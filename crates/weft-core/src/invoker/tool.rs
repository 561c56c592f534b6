//! Tool invoker trait and its object-safe wrapper.
//!
//! Follows the blanket-impl pattern used for the reasoning provider:
//! 1. `ToolInvoker` uses RPITIT for zero-cost static dispatch
//! 2. `ToolInvokerDyn` is the object-safe version with boxed futures
//! 3. `BoxToolInvoker` wraps `Box<dyn ToolInvokerDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};
use weft_types::error::ToolError;

/// Executes named side-effecting operations on behalf of tool steps.
///
/// The engine never inspects `name` beyond forwarding it.
pub trait ToolInvoker: Send + Sync {
    /// Run the tool `name` with an already-substituted input object.
    fn invoke(
        &self,
        name: &str,
        input: Map<String, Value>,
    ) -> impl Future<Output = Result<Value, ToolError>> + Send;
}

/// Object-safe version of [`ToolInvoker`].
pub trait ToolInvokerDyn: Send + Sync {
    fn invoke_boxed<'a>(
        &'a self,
        name: &'a str,
        input: Map<String, Value>,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>>;
}

impl<T: ToolInvoker> ToolInvokerDyn for T {
    fn invoke_boxed<'a>(
        &'a self,
        name: &'a str,
        input: Map<String, Value>,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>> {
        Box::pin(self.invoke(name, input))
    }
}

/// Type-erased tool invoker injected into the engine at construction.
pub struct BoxToolInvoker {
    inner: Box<dyn ToolInvokerDyn>,
}

impl BoxToolInvoker {
    pub fn new<T: ToolInvoker + 'static>(invoker: T) -> Self {
        Self {
            inner: Box::new(invoker),
        }
    }

    pub async fn invoke(&self, name: &str, input: Map<String, Value>) -> Result<Value, ToolError> {
        self.inner.invoke_boxed(name, input).await
    }
}

/// Invoker with no tools; every call fails with [`ToolError::UnknownTool`].
pub struct NoTools;

impl ToolInvoker for NoTools {
    async fn invoke(&self, name: &str, _input: Map<String, Value>) -> Result<Value, ToolError> {
        Err(ToolError::UnknownTool(name.to_string()))
    }
}
