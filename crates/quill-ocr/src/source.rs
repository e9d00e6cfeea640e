use std::path::{Path, PathBuf};

use crate::error::ExtractError;
use crate::format::{self, DocumentFormat};

const DEFAULT_STEM: &str = "document";

/// A raw document handed to the extractor, either on disk or already in memory.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Path(PathBuf),
    Bytes { name: Option<String>, data: Vec<u8> },
}

impl DocumentSource {
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self::Bytes { name: None, data }
    }

    /// In-memory bytes carrying the original file name, e.g. from an upload.
    #[must_use]
    pub fn named(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self::Bytes {
            name: Some(name.into()),
            data,
        }
    }

    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::Path(p) => p.file_name().and_then(|n| n.to_str()),
            Self::Bytes { name, .. } => name.as_deref(),
        }
    }

    /// File stem used to name persisted page images.
    #[must_use]
    pub fn stem(&self) -> String {
        self.file_name()
            .and_then(|n| Path::new(n).file_stem())
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_STEM)
            .to_owned()
    }

    /// Check the size ceiling, read the content and detect its format.
    ///
    /// The size check runs on file metadata (or buffer length) before any content is
    /// read or decoded.
    pub(crate) async fn load(&self, max_size: u64) -> Result<LoadedDocument, ExtractError> {
        let data = match self {
            Self::Path(path) => {
                let meta = tokio::fs::metadata(path).await?;
                check_size(meta.len(), max_size)?;
                tokio::fs::read(path).await?
            }
            Self::Bytes { data, .. } => {
                check_size(data.len() as u64, max_size)?;
                data.clone()
            }
        };
        let format = format::detect(&data, self.file_name())?;
        Ok(LoadedDocument {
            stem: self.stem(),
            format,
            data,
        })
    }
}

fn check_size(size: u64, limit: u64) -> Result<(), ExtractError> {
    if size > limit {
        return Err(ExtractError::FileTooLarge { size, limit });
    }
    Ok(())
}

#[derive(Debug)]
pub(crate) struct LoadedDocument {
    pub stem: String,
    pub format: DocumentFormat,
    pub data: Vec<u8>,
}
