//! Test-only mock provider with deterministic embeddings.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::LlmError;
use crate::provider::{GenerationParams, LlmProvider, Message};

pub const MOCK_EMBEDDING_DIM: usize = 64;

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<Vec<(Vec<Message>, GenerationParams)>>>,
    transient_failures: Arc<AtomicU32>,
    pub default_response: String,
    pub dimensions: usize,
    pub supports_embeddings: bool,
    pub fail_chat: bool,
    /// Embedding fails for any text containing this marker.
    pub fail_embed_on: Option<String>,
    /// Milliseconds to sleep before returning a chat response.
    pub delay_ms: u64,
    /// Milliseconds to sleep before returning an embedding.
    pub embed_delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            transient_failures: Arc::new(AtomicU32::new(0)),
            default_response: "mock response".into(),
            dimensions: MOCK_EMBEDDING_DIM,
            supports_embeddings: true,
            fail_chat: false,
            fail_embed_on: None,
            delay_ms: 0,
            embed_delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    /// Every chat call fails with a permanent error.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    /// The next `n` chat calls fail with a transient error.
    #[must_use]
    pub fn with_transient_failures(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn with_embed_delay(mut self, ms: u64) -> Self {
        self.embed_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn with_embed_failure_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_embed_on = Some(marker.into());
        self
    }

    /// Messages and parameters of every chat call received so far.
    #[must_use]
    pub fn recorded_calls(&self) -> Vec<(Vec<Message>, GenerationParams)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Hashed bag-of-words vector: identical texts embed identically and texts
    /// with disjoint vocabularies are close to orthogonal.
    #[must_use]
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions.max(1)];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = blake3::hash(word.to_lowercase().as_bytes());
            let bytes = hash.as_bytes();
            let slot = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]);
            #[allow(clippy::cast_possible_truncation)]
            let idx = (slot % vector.len() as u64) as usize;
            vector[idx] += if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        }
        vector
    }
}

impl LlmProvider for MockProvider {
    async fn chat(&self, messages: &[Message], params: &GenerationParams) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((messages.to_vec(), *params));
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(LlmError::Unavailable);
        }
        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        if self.embed_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.embed_delay_ms)).await;
        }
        if !self.supports_embeddings {
            return Err(LlmError::EmbedUnsupported { provider: "mock" });
        }
        if let Some(marker) = &self.fail_embed_on
            && text.contains(marker.as_str())
        {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        Ok(self.embed_sync(text))
    }

    fn supports_embeddings(&self) -> bool {
        self.supports_embeddings
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}
