//! Reasoning provider trait and its object-safe wrapper.

use std::future::Future;
use std::pin::Pin;

use weft_types::error::ReasoningError;

/// Turns a fully-substituted prompt into text. Used by thought steps.
pub trait ReasoningProvider: Send + Sync {
    /// Generate a response to `prompt`, optionally using the step's model hint.
    fn reason(
        &self,
        prompt: &str,
        model: Option<&str>,
    ) -> impl Future<Output = Result<String, ReasoningError>> + Send;
}

/// Object-safe version of [`ReasoningProvider`].
pub trait ReasoningProviderDyn: Send + Sync {
    fn reason_boxed<'a>(
        &'a self,
        prompt: &'a str,
        model: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<String, ReasoningError>> + Send + 'a>>;
}

impl<T: ReasoningProvider> ReasoningProviderDyn for T {
    fn reason_boxed<'a>(
        &'a self,
        prompt: &'a str,
        model: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<String, ReasoningError>> + Send + 'a>> {
        Box::pin(self.reason(prompt, model))
    }
}

/// Type-erased reasoning provider for runtime provider selection.
pub struct BoxReasoningProvider {
    inner: Box<dyn ReasoningProviderDyn>,
}

impl BoxReasoningProvider {
    pub fn new<T: ReasoningProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    pub async fn reason(&self, prompt: &str, model: Option<&str>) -> Result<String, ReasoningError> {
        self.inner.reason_boxed(prompt, model).await
    }
}

/// Provider used when no reasoning backend is configured.
pub struct Unconfigured;

impl ReasoningProvider for Unconfigured {
    async fn reason(&self, _prompt: &str, _model: Option<&str>) -> Result<String, ReasoningError> {
        Err(ReasoningError::NotConfigured)
    }
}
