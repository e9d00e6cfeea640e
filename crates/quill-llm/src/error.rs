#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("provider unavailable")]
    Unavailable,

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: &'static str },

    #[error("{provider} API request failed (status {status})")]
    Api { provider: &'static str, status: u16 },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::RateLimited | Self::Unavailable => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Json(_)
            | Self::EmptyResponse { .. }
            | Self::EmbedUnsupported { .. }
            | Self::Other(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
