//! Reasoning provider implementations used by thought steps.

pub mod openai_compat;

pub use openai_compat::OpenAiReasoningProvider;
