use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use quill_llm::EmbedFn;
use quill_llm::retry::retry_transient;
use uuid::Uuid;

use crate::chunker::ChunkerConfig;
use crate::error::IndexError;
use crate::types::{
    BatchReport, Chunk, CollectionStats, IngestedDocument, Metadata, RetrievalResult, ScoredChunk,
};
use crate::vector_store::{VectorFilter, VectorPoint, VectorStore, VectorStoreError};

const EMBED_RETRY_BASE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub collection: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Minimum similarity a chunk needs to be returned. `None` keeps the plain top-k.
    pub relevance_floor: Option<f32>,
    /// Upper bound on a single embedding call, retries included.
    pub embed_timeout: Duration,
    pub embed_retries: u32,
    pub ingest_concurrency: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            collection: "documents".into(),
            chunk_size: 1000,
            chunk_overlap: 200,
            relevance_floor: None,
            embed_timeout: Duration::from_secs(60),
            embed_retries: 2,
            ingest_concurrency: 4,
        }
    }
}

impl IndexConfig {
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for an empty collection name, a chunk window that
    /// cannot advance, zero concurrency or a zero timeout.
    pub fn validate(&self) -> Result<ChunkerConfig, IndexError> {
        if self.collection.trim().is_empty() {
            return Err(IndexError::InvalidConfiguration(
                "collection name must not be empty".into(),
            ));
        }
        if self.ingest_concurrency == 0 {
            return Err(IndexError::InvalidConfiguration(
                "ingest_concurrency must be positive".into(),
            ));
        }
        if self.embed_timeout.is_zero() {
            return Err(IndexError::InvalidConfiguration(
                "embed_timeout must be positive".into(),
            ));
        }
        ChunkerConfig::new(self.chunk_size, self.chunk_overlap)
    }
}

/// One named collection: chunking, embedding, upsert and similarity search.
///
/// Writes into the collection are serialized through a write gate; embeddings are
/// computed before the gate is taken so concurrent ingestion only queues on storage.
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    embed: EmbedFn,
    config: IndexConfig,
    chunker: ChunkerConfig,
    write_gate: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `config` does not validate.
    pub fn new(
        store: Arc<dyn VectorStore>,
        embed: EmbedFn,
        config: IndexConfig,
    ) -> Result<Self, IndexError> {
        let chunker = config.validate()?;
        Ok(Self {
            store,
            embed,
            config,
            chunker,
            write_gate: tokio::sync::Mutex::new(()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Add one text, splitting it when it exceeds the chunk size.
    ///
    /// Without `id` a `doc_<uuid>` id is generated. A text that fits in one chunk is
    /// stored under the id itself; a split text stores `<id>_<n>` chunks. Chunks left
    /// over from an earlier version of the same id are removed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for blank text, `Embedding`/`Timeout` when embedding
    /// fails and `InvalidConfiguration` when the vectors do not match the collection.
    pub async fn add_document(
        &self,
        text: &str,
        metadata: Metadata,
        id: Option<String>,
    ) -> Result<IngestedDocument, IndexError> {
        self.add_with_chunker(text, metadata, id, &self.chunker)
            .await
    }

    /// Add many texts. The batch is not atomic: each item reports its own outcome.
    ///
    /// `metadatas` may be empty; otherwise it and `ids` must match `texts` in length.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty batch or mismatched input lengths.
    pub async fn add_documents(
        &self,
        texts: Vec<String>,
        metadatas: Vec<Metadata>,
        ids: Option<Vec<String>>,
    ) -> Result<BatchReport, IndexError> {
        if texts.is_empty() {
            return Err(IndexError::InvalidArgument("no documents to add".into()));
        }
        if !metadatas.is_empty() && metadatas.len() != texts.len() {
            return Err(IndexError::InvalidArgument(format!(
                "{} metadata entries for {} texts",
                metadatas.len(),
                texts.len()
            )));
        }
        if let Some(ids) = &ids
            && ids.len() != texts.len()
        {
            return Err(IndexError::InvalidArgument(format!(
                "{} ids for {} texts",
                ids.len(),
                texts.len()
            )));
        }

        let mut metadatas = metadatas.into_iter();
        let mut ids = ids.map(Vec::into_iter);
        let items: Vec<(String, Metadata, Option<String>)> = texts
            .into_iter()
            .map(|text| {
                let metadata = metadatas.next().unwrap_or_default();
                let id = ids.as_mut().and_then(|ids| ids.next());
                (text, metadata, id)
            })
            .collect();

        let results: Vec<_> = futures::stream::iter(items.into_iter().enumerate())
            .map(|(position, (text, metadata, id))| async move {
                let result = self.add_document(&text, metadata, id).await;
                if let Err(e) = &result {
                    tracing::warn!(position, "batch item failed: {e}");
                }
                result
            })
            .buffered(self.config.ingest_concurrency)
            .collect()
            .await;

        let report = BatchReport { results };
        tracing::info!(
            collection = %self.config.collection,
            succeeded = report.succeeded(),
            failed = report.failed(),
            chunks = report.chunk_count(),
            "batch ingested"
        );
        Ok(report)
    }

    /// Read a UTF-8 text file and index it with a sliding window of `chunk_size`
    /// characters advancing by `chunk_size - chunk_overlap`.
    ///
    /// The base id is derived from the file stem and its canonical path, so ingesting
    /// the same file again replaces its chunks.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when `chunk_overlap >= chunk_size` (checked before
    /// the file is touched), `Io` when the file cannot be read, and the errors of
    /// [`Self::add_document`].
    pub async fn add_document_from_file(
        &self,
        path: &Path,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<IngestedDocument, IndexError> {
        let chunker = ChunkerConfig::new(chunk_size, chunk_overlap)?;
        let text = tokio::fs::read_to_string(path).await?;
        let canonical = tokio::fs::canonicalize(path).await?;

        let mut metadata = Metadata::new();
        if let Some(name) = path.file_name() {
            metadata.insert(
                "source".into(),
                serde_json::Value::String(name.to_string_lossy().into_owned()),
            );
        }
        self.add_with_chunker(&text, metadata, Some(file_document_id(&canonical)), &chunker)
            .await
    }

    /// The `n_results` chunks most similar to `query`, best first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when `n_results` is zero, `Embedding`/`Timeout` when the
    /// query cannot be embedded and `InvalidConfiguration` when the query vector does not
    /// match the collection's dimension.
    pub async fn search(&self, query: &str, n_results: usize) -> Result<RetrievalResult, IndexError> {
        self.search_filtered(query, n_results, None).await
    }

    /// [`Self::search`] restricted to chunks whose metadata satisfies `filter`.
    ///
    /// # Errors
    ///
    /// See [`Self::search`].
    pub async fn search_filtered(
        &self,
        query: &str,
        n_results: usize,
        filter: Option<VectorFilter>,
    ) -> Result<RetrievalResult, IndexError> {
        if n_results == 0 {
            return Err(IndexError::InvalidArgument(
                "n_results must be positive".into(),
            ));
        }
        let vector = self.embed_text(query).await?;
        let info = self.store.collection_info(&self.config.collection).await?;
        if let Some(expected) = info.dimension
            && expected != vector.len()
        {
            return Err(VectorStoreError::DimensionMismatch {
                expected,
                actual: vector.len(),
            }
            .into());
        }
        let hits = self
            .store
            .search(&self.config.collection, vector, n_results, filter)
            .await?;

        let chunks: Vec<ScoredChunk> = hits
            .into_iter()
            .filter(|hit| self.config.relevance_floor.is_none_or(|floor| hit.score >= floor))
            .map(|hit| ScoredChunk {
                chunk: hit.chunk,
                score: hit.score,
            })
            .collect();
        tracing::debug!(
            collection = %self.config.collection,
            results = chunks.len(),
            "search completed"
        );
        Ok(RetrievalResult { chunks })
    }

    /// # Errors
    ///
    /// Returns an error if the backing store cannot be queried.
    pub async fn get_stats(&self) -> Result<CollectionStats, IndexError> {
        let info = self.store.collection_info(&self.config.collection).await?;
        Ok(CollectionStats {
            count: info.count,
            collection_name: self.config.collection.clone(),
            dimensionality: info.dimension,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the backing store cannot be queried.
    pub async fn get(&self, id: &str) -> Result<Option<Chunk>, IndexError> {
        Ok(self.store.get(&self.config.collection, id).await?)
    }

    /// Drop every chunk in the collection. The dimension is released with it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    pub async fn delete_collection(&self) -> Result<(), IndexError> {
        let _gate = self.write_gate.lock().await;
        self.store.delete_collection(&self.config.collection).await?;
        tracing::info!(collection = %self.config.collection, "collection deleted");
        Ok(())
    }

    /// Remove every chunk of document `id`. Returns how many chunks were stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    pub async fn remove_document(&self, id: &str) -> Result<usize, IndexError> {
        let _gate = self.write_gate.lock().await;
        let ids = self.stored_chunk_ids(id).await?;
        let removed = ids.len();
        self.store.delete_by_ids(&self.config.collection, ids).await?;
        if removed > 0 {
            tracing::debug!(collection = %self.config.collection, id, removed, "document removed");
        }
        Ok(removed)
    }

    async fn add_with_chunker(
        &self,
        text: &str,
        metadata: Metadata,
        id: Option<String>,
        chunker: &ChunkerConfig,
    ) -> Result<IngestedDocument, IndexError> {
        if text.trim().is_empty() {
            return Err(IndexError::InvalidArgument(
                "document text must not be empty".into(),
            ));
        }
        let id = match id {
            Some(id) if id.trim().is_empty() => {
                return Err(IndexError::InvalidArgument(
                    "document id must not be empty".into(),
                ));
            }
            Some(id) => id,
            None => format!("doc_{}", Uuid::new_v4()),
        };

        let pieces = chunker.split(text);
        let points = self.build_points(&id, pieces, &metadata).await?;
        let chunk_ids: Vec<String> = points.iter().map(|p| p.id.clone()).collect();
        let dimension = points.first().map_or(0, |p| p.vector.len());

        {
            let _gate = self.write_gate.lock().await;
            let stale: Vec<String> = self
                .stored_chunk_ids(&id)
                .await?
                .into_iter()
                .filter(|old| !chunk_ids.contains(old))
                .collect();
            self.store
                .ensure_collection(&self.config.collection, dimension)
                .await?;
            self.store.upsert(&self.config.collection, points).await?;
            self.store
                .delete_by_ids(&self.config.collection, stale)
                .await?;
        }

        tracing::debug!(
            collection = %self.config.collection,
            id = %id,
            chunks = chunk_ids.len(),
            "document indexed"
        );
        Ok(IngestedDocument { id, chunk_ids })
    }

    /// Chunk ids currently stored for document `id`: the id itself for a single-chunk
    /// version, `<id>_0..<id>_<total>` for a split one.
    async fn stored_chunk_ids(&self, id: &str) -> Result<Vec<String>, IndexError> {
        let collection = &self.config.collection;
        let mut ids = Vec::new();
        if self.store.get(collection, id).await?.is_some() {
            ids.push(id.to_owned());
        }
        if let Some(first) = self.store.get(collection, &format!("{id}_0")).await?
            && first.metadata.get("parent_id").and_then(serde_json::Value::as_str) == Some(id)
        {
            let total = first
                .metadata
                .get("total_chunks")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(1);
            ids.extend((0..total).map(|n| format!("{id}_{n}")));
        }
        Ok(ids)
    }

    async fn build_points(
        &self,
        id: &str,
        pieces: Vec<String>,
        metadata: &Metadata,
    ) -> Result<Vec<VectorPoint>, IndexError> {
        let total = pieces.len();
        let added_at = chrono::Utc::now().to_rfc3339();
        let mut points = Vec::with_capacity(total);

        for (index, content) in pieces.into_iter().enumerate() {
            let vector = self.embed_text(&content).await?;
            let mut metadata = metadata.clone();
            metadata.insert("added_at".into(), serde_json::json!(added_at));
            metadata.insert("text_length".into(), serde_json::json!(content.chars().count()));

            let chunk_id = if total == 1 {
                id.to_owned()
            } else {
                metadata.insert("parent_id".into(), serde_json::json!(id));
                metadata.insert("chunk_index".into(), serde_json::json!(index));
                metadata.insert("total_chunks".into(), serde_json::json!(total));
                format!("{id}_{index}")
            };

            points.push(VectorPoint {
                id: chunk_id,
                vector,
                content,
                metadata,
            });
        }
        Ok(points)
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let limit = self.config.embed_timeout;
        let vector = tokio::time::timeout(
            limit,
            retry_transient("embed", self.config.embed_retries, EMBED_RETRY_BASE, || {
                (self.embed)(text)
            }),
        )
        .await
        .map_err(|_| IndexError::Timeout(limit))??;

        if vector.is_empty() {
            return Err(IndexError::InvalidConfiguration(
                "embedding function returned an empty vector".into(),
            ));
        }
        Ok(vector)
    }
}

/// Stable document id for a file: its stem plus a short hash of the canonical path.
#[must_use]
pub fn file_document_id(canonical: &Path) -> String {
    let stem = canonical
        .file_stem()
        .map_or_else(|| "file".into(), |s| s.to_string_lossy().into_owned());
    let hash = blake3::hash(canonical.to_string_lossy().as_bytes());
    format!("{stem}_{}", &hash.to_hex()[..8])
}
