//! Document ingestion: extract text from a file, then index it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use quill_index::{IngestedDocument, Metadata, VectorIndex, file_document_id};
use quill_ocr::{DocumentFormat, DocumentSource, ExtractError, TextExtractor};

use crate::error::AssistantError;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

#[derive(Debug)]
pub struct IngestOutcome {
    pub path: PathBuf,
    pub result: Result<IngestedDocument, AssistantError>,
}

/// Per-file outcomes of a batch, in input order.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub items: Vec<IngestOutcome>,
}

impl IngestReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.result.is_ok()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.items
            .iter()
            .filter_map(|i| i.result.as_ref().ok())
            .map(|d| d.chunk_ids.len())
            .sum()
    }
}

pub struct IngestionPipeline {
    extractor: Arc<TextExtractor>,
    index: Arc<VectorIndex>,
    concurrency: usize,
    item_timeout: Duration,
}

impl IngestionPipeline {
    /// Concurrency follows the index's `ingest_concurrency`; the per-file deadline covers
    /// extraction and embedding together and defaults to twice the extraction timeout.
    #[must_use]
    pub fn new(extractor: Arc<TextExtractor>, index: Arc<VectorIndex>) -> Self {
        let concurrency = index.config().ingest_concurrency.max(1);
        let item_timeout = extractor.config().timeout.saturating_mul(2);
        Self {
            extractor,
            index,
            concurrency,
            item_timeout,
        }
    }

    #[must_use]
    pub fn with_item_timeout(mut self, limit: Duration) -> Self {
        self.item_timeout = limit;
        self
    }

    /// Extract and index one file.
    ///
    /// Plain-text files are read as is; anything else goes through OCR. A document that
    /// yields no text succeeds with no chunks. Re-ingesting the same path replaces its
    /// chunks, and drops them when the file no longer yields text.
    ///
    /// # Errors
    ///
    /// `FileTooLarge` before anything is read, then the extraction and index failures.
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestedDocument, AssistantError> {
        let size = tokio::fs::metadata(path).await?.len();
        let limit = self.extractor.config().max_file_size;
        if size > limit {
            return Err(ExtractError::FileTooLarge { size, limit }.into());
        }

        let mut metadata = Metadata::new();
        let text = if is_plain_text(path) {
            metadata.insert("source_type".into(), "text".into());
            tokio::fs::read_to_string(path).await?
        } else {
            let extracted = self.extractor.extract(&DocumentSource::from_path(path)).await?;
            if let Some(format) = extracted.format {
                metadata.insert("source_type".into(), source_type(format).into());
            }
            if !extracted.pages.is_empty() {
                metadata.insert("pages".into(), extracted.pages.len().into());
            }
            extracted.text
        };
        if let Some(name) = path.file_name() {
            metadata.insert("source".into(), name.to_string_lossy().into_owned().into());
        }

        let canonical = tokio::fs::canonicalize(path).await?;
        let id = file_document_id(&canonical);
        if text.trim().is_empty() {
            let removed = self.index.remove_document(&id).await?;
            tracing::info!(path = %path.display(), removed, "no text extracted, nothing to index");
            return Ok(IngestedDocument {
                id,
                chunk_ids: Vec::new(),
            });
        }

        let doc = self.index.add_document(&text, metadata, Some(id)).await?;
        tracing::info!(path = %path.display(), id = %doc.id, chunks = doc.chunk_ids.len(), "ingested");
        Ok(doc)
    }

    /// Ingest files concurrently. Each file succeeds, fails or times out on its own.
    pub async fn ingest_paths(&self, paths: Vec<PathBuf>) -> IngestReport {
        let limit = self.item_timeout;
        let items = futures::stream::iter(paths)
            .map(|path| async move {
                let result = tokio::time::timeout(limit, self.ingest_path(&path))
                    .await
                    .unwrap_or(Err(AssistantError::Timeout {
                        operation: "ingestion",
                        limit,
                    }));
                if let Err(e) = &result {
                    tracing::warn!(path = %path.display(), "ingestion failed: {e}");
                }
                IngestOutcome { path, result }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let report = IngestReport { items };
        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            chunks = report.chunk_count(),
            "batch ingestion finished"
        );
        report
    }
}

fn is_plain_text(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn source_type(format: DocumentFormat) -> &'static str {
    match format {
        DocumentFormat::Pdf => "pdf",
        DocumentFormat::Image(_) => "image",
    }
}
