//! Qdrant-backed [`VectorStore`].

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    GetPointsBuilder, PointId, PointStruct, PointsIdsList, SearchPointsBuilder,
    UpsertPointsBuilder, Value, VectorParamsBuilder, value::Kind, vectors_config,
};
use uuid::Uuid;

use crate::BoxFuture;
use crate::types::{Chunk, Metadata};
use crate::vector_store::{
    CollectionInfo, FieldCondition, FieldValue, ScoredVectorPoint, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError, check_dimensions, rank,
};

const CHUNK_ID: &str = "_chunk_id";
const CONTENT: &str = "_content";
const METADATA: &str = "_metadata";
const SEQ: &str = "_seq";

type Payload = HashMap<String, Value>;

/// Chunks stored as Qdrant points.
///
/// Point ids are UUIDv5 of the chunk id. Metadata fields are copied to the top level of
/// the payload so they can be filtered on; the full metadata and the insertion sequence
/// travel in reserved `_`-prefixed fields.
#[derive(Clone)]
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantVectorStore").finish_non_exhaustive()
    }
}

impl QdrantVectorStore {
    /// # Errors
    ///
    /// Returns `Connection` if the client cannot be built for `url`.
    pub fn new(url: &str) -> Result<Self, VectorStoreError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    async fn exists(&self, collection: &str) -> Result<bool, VectorStoreError> {
        self.client
            .collection_exists(collection)
            .await
            .map_err(|e| VectorStoreError::Connection(e.to_string()))
    }

    async fn dimension(&self, collection: &str) -> Result<Option<usize>, VectorStoreError> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
        let size = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|config| match config {
                vectors_config::Config::Params(params) => Some(params.size),
                vectors_config::Config::ParamsMap(_) => None,
            });
        Ok(size.and_then(|s| usize::try_from(s).ok()))
    }

    async fn count(&self, collection: &str) -> Result<u64, VectorStoreError> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
        Ok(response.result.map_or(0, |r| r.count))
    }

    async fn create(&self, collection: &str, vector_size: usize) -> Result<(), VectorStoreError> {
        let size =
            u64::try_from(vector_size).map_err(|e| VectorStoreError::Collection(e.to_string()))?;
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(size, Distance::Cosine)),
            )
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
        tracing::info!(collection, vector_size, "qdrant collection created");
        Ok(())
    }

    async fn fetch(
        &self,
        collection: &str,
        ids: Vec<PointId>,
    ) -> Result<Vec<Payload>, VectorStoreError> {
        let response = self
            .client
            .get_points(GetPointsBuilder::new(collection, ids).with_payload(true))
            .await
            .map_err(|e| VectorStoreError::Search(e.to_string()))?;
        Ok(response.result.into_iter().map(|p| p.payload).collect())
    }
}

fn point_id(chunk_id: &str) -> PointId {
    PointId::from(Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string())
}

fn build_payload(point: &VectorPoint, seq: u64) -> Result<Payload, VectorStoreError> {
    let mut object: serde_json::Map<String, serde_json::Value> = point
        .metadata
        .iter()
        .filter(|(k, _)| !k.starts_with('_'))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let metadata = serde_json::to_string(&point.metadata)
        .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
    object.insert(CHUNK_ID.into(), serde_json::json!(point.id));
    object.insert(CONTENT.into(), serde_json::json!(point.content));
    object.insert(METADATA.into(), serde_json::json!(metadata));
    object.insert(SEQ.into(), serde_json::json!(seq));
    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| VectorStoreError::Serialization(e.to_string()))
}

fn string_field(payload: &Payload, key: &str) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn seq_field(payload: &Payload) -> Option<u64> {
    match payload.get(SEQ)?.kind.as_ref()? {
        Kind::IntegerValue(i) => u64::try_from(*i).ok(),
        _ => None,
    }
}

fn parse_payload(payload: &Payload) -> Result<(Chunk, u64), VectorStoreError> {
    let missing = |field: &str| VectorStoreError::Serialization(format!("point without {field}"));
    let id = string_field(payload, CHUNK_ID).ok_or_else(|| missing(CHUNK_ID))?;
    let content = string_field(payload, CONTENT).ok_or_else(|| missing(CONTENT))?;
    let metadata: Metadata = match string_field(payload, METADATA) {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| VectorStoreError::Serialization(e.to_string()))?,
        None => Metadata::new(),
    };
    let seq = seq_field(payload).unwrap_or_default();
    Ok((
        Chunk {
            id,
            content,
            metadata,
        },
        seq,
    ))
}

fn condition(cond: FieldCondition) -> Condition {
    match cond.value {
        FieldValue::Integer(v) => Condition::matches(cond.field, v),
        FieldValue::Text(v) => Condition::matches(cond.field, v),
    }
}

fn to_qdrant_filter(filter: VectorFilter) -> Filter {
    Filter {
        must: filter.must.into_iter().map(condition).collect(),
        must_not: filter.must_not.into_iter().map(condition).collect(),
        ..Filter::default()
    }
}

/// Sequence numbers for a write: later writes sort after earlier ones.
fn next_sequences(n: usize) -> impl Iterator<Item = u64> {
    let base = u64::try_from(chrono::Utc::now().timestamp_micros()).unwrap_or_default() * 1000;
    (0_u64..).take(n).map(move |i| base + i)
}

impl VectorStore for QdrantVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: usize,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if !self.exists(&collection).await? {
                return self.create(&collection, vector_size).await;
            }
            let dimension = self.dimension(&collection).await?;
            if dimension == Some(vector_size) {
                return Ok(());
            }
            if self.count(&collection).await? > 0
                && let Some(expected) = dimension
            {
                return Err(VectorStoreError::DimensionMismatch {
                    expected,
                    actual: vector_size,
                });
            }
            self.client
                .delete_collection(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            self.create(&collection, vector_size).await
        })
    }

    fn collection_info(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<CollectionInfo, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if !self.exists(&collection).await? {
                return Ok(CollectionInfo::default());
            }
            let count = self.count(&collection).await?;
            if count == 0 {
                return Ok(CollectionInfo::default());
            }
            Ok(CollectionInfo {
                count,
                dimension: self.dimension(&collection).await?,
            })
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if self.exists(&collection).await? {
                self.client
                    .delete_collection(&collection)
                    .await
                    .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            }
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
            if points.is_empty() {
                return Ok(());
            }
            if let Some(dimension) = self.dimension(&collection).await? {
                check_dimensions(&points, dimension)?;
            }

            let ids: Vec<PointId> = points.iter().map(|p| point_id(&p.id)).collect();
            let existing: HashMap<String, u64> = self
                .fetch(&collection, ids)
                .await?
                .iter()
                .filter_map(|payload| Some((string_field(payload, CHUNK_ID)?, seq_field(payload)?)))
                .collect();

            let mut structs = Vec::with_capacity(points.len());
            let fresh_seqs = next_sequences(points.len());
            for (point, fresh) in points.into_iter().zip(fresh_seqs) {
                let seq = existing.get(&point.id).copied().unwrap_or(fresh);
                let payload = build_payload(&point, seq)?;
                structs.push(PointStruct::new(point_id(&point.id), point.vector, payload));
            }

            self.client
                .upsert_points(UpsertPointsBuilder::new(&collection, structs).wait(true))
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
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
            if !self.exists(&collection).await? {
                return Ok(Vec::new());
            }
            // Overfetch so equal scores just past `limit` can still win on insertion order.
            let fetch = u64::try_from(limit.saturating_mul(2).saturating_add(8)).unwrap_or(u64::MAX);
            let mut builder =
                SearchPointsBuilder::new(&collection, vector, fetch).with_payload(true);
            if let Some(f) = filter {
                builder = builder.filter(to_qdrant_filter(f));
            }
            let response = self
                .client
                .search_points(builder)
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;

            let mut scored = Vec::with_capacity(response.result.len());
            for point in response.result {
                let (chunk, seq) = parse_payload(&point.payload)?;
                scored.push(ScoredVectorPoint {
                    chunk,
                    score: point.score,
                    seq,
                });
            }
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
            if !self.exists(&collection).await? {
                return Ok(None);
            }
            let payloads = self.fetch(&collection, vec![point_id(&id)]).await?;
            payloads
                .first()
                .map(|payload| parse_payload(payload).map(|(chunk, _)| chunk))
                .transpose()
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
            let ids: Vec<PointId> = ids.iter().map(|id| point_id(id)).collect();
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&collection)
                        .points(PointsIdsList { ids })
                        .wait(true),
                )
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            Ok(())
        })
    }
}
