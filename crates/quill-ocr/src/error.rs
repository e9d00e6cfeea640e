use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt file: {0}")]
    CorruptFile(String),

    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("OCR engine failed: {0}")]
    Engine(String),

    #[error("invalid extractor configuration: {0}")]
    InvalidConfiguration(String),
}
