//! Google Gemini generation and embedding backend over the public REST API.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{GenerationParams, LlmProvider, Message, Role};
use crate::retry::send_with_retry;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl GeminiProvider {
    #[must_use]
    pub fn new(api_key: String, model: String, embedding_model: String) -> Self {
        Self {
            client: crate::http::default_client(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_owned(),
            model,
            embedding_model,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{model}:{method}", self.base_url)
    }

    async fn post<B: Serialize>(&self, url: &str, body: &B) -> Result<String, LlmError> {
        let response = send_with_retry("gemini", MAX_RATE_LIMIT_RETRIES, || {
            self.client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .header("Content-Type", "application/json")
                .json(body)
                .send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;

        if !status.is_success() {
            tracing::error!("Gemini API error {status}: {text}");
            return Err(LlmError::Api {
                provider: "gemini",
                status: status.as_u16(),
            });
        }
        Ok(text)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    content: Content<'a>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

fn build_request<'a>(messages: &'a [Message], params: &GenerationParams) -> GenerateRequest<'a> {
    let system: Vec<Part<'a>> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| Part { text: &m.content })
        .collect();
    let contents = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| Content {
            role: Some(match m.role {
                Role::Assistant => "model",
                Role::User | Role::System => "user",
            }),
            parts: vec![Part { text: &m.content }],
        })
        .collect();

    GenerateRequest {
        contents,
        system_instruction: (!system.is_empty()).then_some(Content {
            role: None,
            parts: system,
        }),
        generation_config: GenerationConfig {
            temperature: params.temperature,
            max_output_tokens: params.max_tokens,
        },
    }
}

impl LlmProvider for GeminiProvider {
    async fn chat(&self, messages: &[Message], params: &GenerationParams) -> Result<String, LlmError> {
        let body = build_request(messages, params);
        let text = self
            .post(&self.endpoint(&self.model, "generateContent"), &body)
            .await?;
        let resp: GenerateResponse = serde_json::from_str(&text)?;

        let answer: String = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if answer.is_empty() {
            return Err(LlmError::EmptyResponse { provider: "gemini" });
        }
        Ok(answer)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = EmbedRequest {
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
        };
        let raw = self
            .post(&self.endpoint(&self.embedding_model, "embedContent"), &body)
            .await?;
        let resp: EmbedResponse = serde_json::from_str(&raw)?;
        if resp.embedding.values.is_empty() {
            return Err(LlmError::EmptyResponse { provider: "gemini" });
        }
        Ok(resp.embedding.values)
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "gemini"
    }
}
