use std::time::Duration;

use crate::vector_store::VectorStoreError;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] quill_llm::LlmError),

    #[error("embedding timed out after {0:?}")]
    Timeout(Duration),

    #[error("vector store error: {0}")]
    VectorStore(VectorStoreError),

    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("integer conversion: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),
}

impl From<VectorStoreError> for IndexError {
    fn from(err: VectorStoreError) -> Self {
        match err {
            VectorStoreError::DimensionMismatch { .. } => {
                Self::InvalidConfiguration(err.to_string())
            }
            other => Self::VectorStore(other),
        }
    }
}
