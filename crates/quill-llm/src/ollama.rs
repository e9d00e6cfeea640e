use ollama_rs::Ollama;
use ollama_rs::error::OllamaError;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::models::ModelOptions;

use crate::error::LlmError;
use crate::provider::{GenerationParams, LlmProvider, Message, Role};

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Ollama,
    model: String,
    embedding_model: String,
}

impl OllamaProvider {
    #[must_use]
    pub fn new(base_url: &str, model: String, embedding_model: String) -> Self {
        let (host, port) = parse_host_port(base_url);
        Self {
            client: Ollama::new(host, port),
            model,
            embedding_model,
        }
    }

    /// Check if Ollama is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection to Ollama fails.
    pub async fn health_check(&self) -> Result<(), LlmError> {
        self.client
            .list_local_models()
            .await
            .map_err(|e| LlmError::Other(format!("failed to connect to Ollama: {e}")))?;
        Ok(())
    }
}

impl LlmProvider for OllamaProvider {
    async fn chat(&self, messages: &[Message], params: &GenerationParams) -> Result<String, LlmError> {
        let ollama_messages: Vec<ChatMessage> = messages.iter().map(convert_message).collect();
        let options = ModelOptions::default()
            .temperature(params.temperature)
            .num_predict(i32::try_from(params.max_tokens).unwrap_or(i32::MAX));
        let request =
            ChatMessageRequest::new(self.model.clone(), ollama_messages).options(options);

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| map_error("chat", e))?;

        Ok(response.message.content)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let request = GenerateEmbeddingsRequest::new(
            self.embedding_model.clone(),
            EmbeddingsInput::from(text),
        );

        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| map_error("embedding", e))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse { provider: "ollama" })
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ollama"
    }
}

/// Connection failures, timeouts and 5xx responses are retryable; the rest is not.
fn map_error(operation: &str, err: OllamaError) -> LlmError {
    match err {
        OllamaError::ReqwestError(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
            tracing::warn!("Ollama {operation} request failed: {e}");
            LlmError::Unavailable
        }
        OllamaError::ReqwestError(e) => match e.status() {
            Some(status) if status.is_server_error() => LlmError::Api {
                provider: "ollama",
                status: status.as_u16(),
            },
            _ => LlmError::Other(format!("Ollama {operation} request failed: {e}")),
        },
        OllamaError::JsonError(e) => LlmError::Json(e),
        other => LlmError::Other(format!("Ollama {operation} request failed: {other}")),
    }
}

fn convert_message(msg: &Message) -> ChatMessage {
    match msg.role {
        Role::System => ChatMessage::system(msg.content.clone()),
        Role::Assistant => ChatMessage::assistant(msg.content.clone()),
        Role::User => ChatMessage::user(msg.content.clone()),
    }
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':')
        && let Ok(port) = url[colon_pos + 1..].parse::<u16>()
    {
        return (url[..colon_pos].to_string(), port);
    }
    (url.to_string(), 11434)
}
