use std::collections::HashMap;
use std::sync::RwLock;

use crate::BoxFuture;
use crate::types::{Chunk, Metadata};
use crate::vector_store::{
    CollectionInfo, ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore, VectorStoreError,
    check_dimensions, cosine_similarity, rank,
};

struct StoredPoint {
    seq: u64,
    vector: Vec<f32>,
    content: String,
    metadata: Metadata,
}

#[derive(Default)]
struct InMemoryCollection {
    dimension: Option<usize>,
    next_seq: u64,
    points: HashMap<String, StoredPoint>,
}

/// Process-local vector store for tests and ephemeral sessions.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore").finish_non_exhaustive()
    }
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: usize,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            let col = cols.entry(collection).or_default();
            match col.dimension {
                Some(expected) if expected != vector_size && !col.points.is_empty() => {
                    Err(VectorStoreError::DimensionMismatch {
                        expected,
                        actual: vector_size,
                    })
                }
                _ => {
                    col.dimension = Some(vector_size);
                    Ok(())
                }
            }
        })
    }

    fn collection_info(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<CollectionInfo, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(cols
                .get(&collection)
                .map(|col| CollectionInfo {
                    count: col.points.len() as u64,
                    dimension: col.dimension.filter(|_| !col.points.is_empty()),
                })
                .unwrap_or_default())
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            cols.remove(&collection);
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not found"))
            })?;
            let Some(dimension) = col.dimension else {
                return Err(VectorStoreError::Upsert(format!(
                    "collection {collection} has no dimension"
                )));
            };
            check_dimensions(&points, dimension)?;

            for p in points {
                let seq = match col.points.get(&p.id) {
                    Some(existing) => existing.seq,
                    None => {
                        col.next_seq += 1;
                        col.next_seq
                    }
                };
                col.points.insert(
                    p.id,
                    StoredPoint {
                        seq,
                        vector: p.vector,
                        content: p.content,
                        metadata: p.metadata,
                    },
                );
            }
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            let Some(col) = cols.get(&collection) else {
                return Ok(Vec::new());
            };

            let empty_filter = VectorFilter::default();
            let f = filter.as_ref().unwrap_or(&empty_filter);

            let scored: Vec<ScoredVectorPoint> = col
                .points
                .iter()
                .filter(|(_, sp)| f.matches(&sp.metadata))
                .map(|(id, sp)| ScoredVectorPoint {
                    chunk: Chunk {
                        id: id.clone(),
                        content: sp.content.clone(),
                        metadata: sp.metadata.clone(),
                    },
                    score: cosine_similarity(&vector, &sp.vector),
                    seq: sp.seq,
                })
                .collect();
            Ok(rank(scored, limit))
        })
    }

    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> BoxFuture<'_, Result<Option<Chunk>, VectorStoreError>> {
        let collection = collection.to_owned();
        let id = id.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            Ok(cols
                .get(&collection)
                .and_then(|col| col.points.get(&id))
                .map(|sp| Chunk {
                    id: id.clone(),
                    content: sp.content.clone(),
                    metadata: sp.metadata.clone(),
                }))
        })
    }

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(());
            }
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            if let Some(col) = cols.get_mut(&collection) {
                for id in &ids {
                    col.points.remove(id);
                }
            }
            Ok(())
        })
    }
}
