use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling controls passed with every generation call.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

pub type EmbedFuture = Pin<Box<dyn Future<Output = Result<Vec<f32>, LlmError>> + Send>>;

/// Type-erased embedding function shared by the index and the assistant.
pub type EmbedFn = Arc<dyn Fn(&str) -> EmbedFuture + Send + Sync>;

/// Capability interface for a generation and embedding backend.
///
/// Implementations must embed deterministically: identical input text yields an
/// identical vector for as long as a collection built from it lives.
pub trait LlmProvider: Send + Sync {
    /// Send messages to the model and return the assistant response.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn chat(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Produce an embedding vector for `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend does not support embeddings or the call fails.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    fn supports_embeddings(&self) -> bool;

    fn name(&self) -> &str;
}

/// Wrap a provider's `embed` as a cloneable [`EmbedFn`].
pub fn embed_fn<P>(provider: Arc<P>) -> EmbedFn
where
    P: LlmProvider + 'static,
{
    Arc::new(move |text: &str| -> EmbedFuture {
        let p = Arc::clone(&provider);
        let owned = text.to_owned();
        Box::pin(async move { p.embed(&owned).await })
    })
}
