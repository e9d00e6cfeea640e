use std::time::Duration;

use quill_index::{IndexError, VectorStoreError};
use quill_llm::LlmError;
use quill_ocr::ExtractError;
use serde::Serialize;

/// Caller-facing failure taxonomy shared by every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    UnsupportedFormat,
    CorruptFile,
    FileTooLarge,
    InvalidConfiguration,
    InvalidArgument,
    EmbeddingError,
    GenerationError,
    Timeout,
    Storage,
    Io,
}

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("generation failed: {0}")]
    Generation(LlmError),

    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VectorStoreError> for AssistantError {
    fn from(err: VectorStoreError) -> Self {
        Self::Index(err.into())
    }
}

impl AssistantError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Extract(e) => match e {
                ExtractError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
                ExtractError::CorruptFile(_) => ErrorKind::CorruptFile,
                ExtractError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
                ExtractError::Timeout(_) => ErrorKind::Timeout,
                ExtractError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
                ExtractError::Io(_) | ExtractError::Engine(_) => ErrorKind::Io,
            },
            Self::Index(e) => match e {
                IndexError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
                IndexError::InvalidArgument(_) => ErrorKind::InvalidArgument,
                IndexError::Embedding(_) => ErrorKind::EmbeddingError,
                IndexError::Timeout(_) => ErrorKind::Timeout,
                IndexError::Io(_) => ErrorKind::Io,
                IndexError::VectorStore(_)
                | IndexError::Sqlite(_)
                | IndexError::Migration(_)
                | IndexError::Json(_)
                | IndexError::IntConversion(_) => ErrorKind::Storage,
            },
            Self::Generation(_) => ErrorKind::GenerationError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Structured failure value: `{"status":"error","kind":..,"message":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&AssistantError> for ErrorBody {
    fn from(err: &AssistantError) -> Self {
        Self {
            status: "error",
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_failures_keep_their_kind() {
        let cases = [
            (ExtractError::UnsupportedFormat("txt".into()), ErrorKind::UnsupportedFormat),
            (ExtractError::CorruptFile("bad xref".into()), ErrorKind::CorruptFile),
            (
                ExtractError::FileTooLarge {
                    size: 11,
                    limit: 10,
                },
                ErrorKind::FileTooLarge,
            ),
            (ExtractError::Timeout(Duration::from_secs(1)), ErrorKind::Timeout),
        ];
        for (err, kind) in cases {
            assert_eq!(AssistantError::from(err).kind(), kind);
        }
    }

    #[test]
    fn index_failures_map_to_taxonomy() {
        let embed: AssistantError = IndexError::Embedding(LlmError::Unavailable).into();
        assert_eq!(embed.kind(), ErrorKind::EmbeddingError);

        let mismatch: AssistantError = VectorStoreError::DimensionMismatch {
            expected: 3,
            actual: 4,
        }
        .into();
        assert_eq!(mismatch.kind(), ErrorKind::InvalidConfiguration);

        let store: AssistantError = VectorStoreError::Search("down".into()).into();
        assert_eq!(store.kind(), ErrorKind::Storage);
    }

    #[test]
    fn generation_is_distinct_from_embedding() {
        let err = AssistantError::Generation(LlmError::RateLimited);
        assert_eq!(err.kind(), ErrorKind::GenerationError);
        assert!(err.to_string().starts_with("generation failed"));
    }

    #[test]
    fn error_body_serializes_status_kind_and_message() {
        let err = AssistantError::InvalidArgument("n_context_docs must be positive".into());
        let json = serde_json::to_value(ErrorBody::from(&err)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "error",
                "kind": "InvalidArgument",
                "message": "invalid argument: n_context_docs must be positive",
            })
        );
    }
}
