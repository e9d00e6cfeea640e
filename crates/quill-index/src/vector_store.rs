use crate::BoxFuture;
use crate::types::{Chunk, Metadata};

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("collection error: {0}")]
    Collection(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("delete error: {0}")]
    Delete(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("embedding dimension {actual} does not match collection dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub content: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub must: Vec<FieldCondition>,
    pub must_not: Vec<FieldCondition>,
}

impl VectorFilter {
    /// Filter requiring `field` to equal `value`.
    #[must_use]
    pub fn must(field: impl Into<String>, value: FieldValue) -> Self {
        Self {
            must: vec![FieldCondition {
                field: field.into(),
                value,
            }],
            must_not: Vec::new(),
        }
    }

    #[must_use]
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.must.iter().all(|c| {
            metadata
                .get(&c.field)
                .is_some_and(|v| c.value.matches(v))
        }) && !self.must_not.iter().any(|c| {
            metadata
                .get(&c.field)
                .is_some_and(|v| c.value.matches(v))
        })
    }
}

#[derive(Debug, Clone)]
pub struct FieldCondition {
    pub field: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
}

impl FieldValue {
    fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            Self::Integer(i) => value.as_i64() == Some(*i),
            Self::Text(s) => value.as_str() == Some(s.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredVectorPoint {
    pub chunk: Chunk,
    pub score: f32,
    /// Insertion sequence. Lower was inserted earlier and wins score ties.
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionInfo {
    pub count: u64,
    /// `None` until the first vector is written.
    pub dimension: Option<usize>,
}

/// Durable storage of (chunk, embedding, metadata) triples keyed by chunk id.
///
/// Contract shared by all backends:
/// - `upsert` replaces the content, vector and metadata of an existing id in place and
///   keeps its original insertion sequence;
/// - every vector in a collection has the dimension fixed by `ensure_collection` while
///   the collection holds data;
/// - `search` orders by descending similarity, then ascending insertion sequence, and
///   returns an empty list for a missing or empty collection.
pub trait VectorStore: Send + Sync {
    /// Create `collection` if missing and pin its dimension to `vector_size`.
    ///
    /// An empty collection adopts the new size; a non-empty one with a different
    /// size fails with `DimensionMismatch`.
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: usize,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn collection_info(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<CollectionInfo, VectorStoreError>>;

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>>;

    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> BoxFuture<'_, Result<Option<Chunk>, VectorStoreError>>;

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Order by score descending, then insertion sequence ascending, and keep `limit`.
pub(crate) fn rank(mut scored: Vec<ScoredVectorPoint>, limit: usize) -> Vec<ScoredVectorPoint> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.seq.cmp(&b.seq))
    });
    scored.truncate(limit);
    scored
}

pub(crate) fn check_dimensions(
    points: &[VectorPoint],
    expected: usize,
) -> Result<(), VectorStoreError> {
    match points.iter().find(|p| p.vector.len() != expected) {
        Some(p) => Err(VectorStoreError::DimensionMismatch {
            expected,
            actual: p.vector.len(),
        }),
        None => Ok(()),
    }
}
