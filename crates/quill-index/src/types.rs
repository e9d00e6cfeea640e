use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// Arbitrary key/value metadata attached to a chunk.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A stored slice of ingested text, the unit of storage and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    /// Human-readable origin of the chunk: its `source` metadata, else its id.
    #[must_use]
    pub fn source(&self) -> &str {
        self.metadata
            .get("source")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub score: f32,
}

/// Chunks ranked by similarity, highest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<ScoredChunk>,
}

impl RetrievalResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredChunk> {
        self.chunks.iter()
    }
}

impl IntoIterator for RetrievalResult {
    type Item = ScoredChunk;
    type IntoIter = std::vec::IntoIter<ScoredChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.into_iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub count: u64,
    pub collection_name: String,
    pub dimensionality: Option<usize>,
}

/// Identifier assigned to an added document and the ids of the chunks stored for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestedDocument {
    pub id: String,
    pub chunk_ids: Vec<String>,
}

/// Per-item outcome of a non-atomic batch, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<Result<IngestedDocument, IndexError>>,
}

impl BatchReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Document ids of successful items, `None` for failed ones.
    #[must_use]
    pub fn ids(&self) -> Vec<Option<&str>> {
        self.results
            .iter()
            .map(|r| r.as_ref().ok().map(|d| d.id.as_str()))
            .collect()
    }

    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|d| d.chunk_ids.len())
            .sum()
    }
}
