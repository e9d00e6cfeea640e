//! Embedding and generation capability interfaces and their backends.

pub mod any;
pub mod error;
pub mod gemini;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod provider;
pub mod retry;

pub use error::LlmError;
pub use provider::{EmbedFn, EmbedFuture, GenerationParams, LlmProvider, Message, Role};
