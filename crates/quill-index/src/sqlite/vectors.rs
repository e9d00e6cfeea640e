use super::SqliteStore;
use crate::BoxFuture;
use crate::types::{Chunk, Metadata};
use crate::vector_store::{
    CollectionInfo, ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore, VectorStoreError,
    check_dimensions, cosine_similarity, rank,
};

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn parse_metadata(raw: &str) -> Result<Metadata, VectorStoreError> {
    serde_json::from_str(raw).map_err(|e| VectorStoreError::Serialization(e.to_string()))
}

fn to_usize(v: i64) -> usize {
    usize::try_from(v).unwrap_or_default()
}

impl SqliteStore {
    async fn collection_row(
        &self,
        collection: &str,
    ) -> Result<Option<(Option<i64>, i64)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT c.dimension, (SELECT COUNT(*) FROM chunks WHERE collection = c.name) \
             FROM collections c WHERE c.name = ?",
        )
        .bind(collection)
        .fetch_optional(&self.pool)
        .await
    }
}

impl VectorStore for SqliteStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: usize,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let err = |e: sqlx::Error| VectorStoreError::Collection(e.to_string());
            let size = i64::try_from(vector_size)
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;

            sqlx::query(
                "INSERT INTO collections (name, dimension) VALUES (?, ?) \
                 ON CONFLICT(name) DO NOTHING",
            )
            .bind(&collection)
            .bind(size)
            .execute(&self.pool)
            .await
            .map_err(err)?;

            let (dimension, count) = self
                .collection_row(&collection)
                .await
                .map_err(err)?
                .unwrap_or((None, 0));

            if dimension == Some(size) {
                return Ok(());
            }
            if count > 0
                && let Some(expected) = dimension
            {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: to_usize(expected),
                    actual: vector_size,
                });
            }
            sqlx::query("UPDATE collections SET dimension = ? WHERE name = ?")
                .bind(size)
                .bind(&collection)
                .execute(&self.pool)
                .await
                .map_err(err)?;
            Ok(())
        })
    }

    fn collection_info(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<CollectionInfo, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let row = self
                .collection_row(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(match row {
                Some((dimension, count)) if count > 0 => CollectionInfo {
                    count: u64::try_from(count).unwrap_or_default(),
                    dimension: dimension.map(to_usize),
                },
                _ => CollectionInfo::default(),
            })
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let err = |e: sqlx::Error| VectorStoreError::Collection(e.to_string());
            let mut tx = self.pool.begin().await.map_err(err)?;
            sqlx::query("DELETE FROM chunks WHERE collection = ?")
                .bind(&collection)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
            sqlx::query("DELETE FROM collections WHERE name = ?")
                .bind(&collection)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
            tx.commit().await.map_err(err)?;
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
            let err = |e: sqlx::Error| VectorStoreError::Upsert(e.to_string());
            let mut tx = self.pool.begin().await.map_err(err)?;

            let dimension: Option<Option<i64>> =
                sqlx::query_scalar("SELECT dimension FROM collections WHERE name = ?")
                    .bind(&collection)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(err)?;
            let Some(Some(dimension)) = dimension else {
                return Err(VectorStoreError::Upsert(format!(
                    "collection {collection} not initialized"
                )));
            };
            check_dimensions(&points, to_usize(dimension))?;

            for p in points {
                let metadata = serde_json::to_string(&p.metadata)
                    .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
                sqlx::query(
                    "INSERT INTO chunks (collection, id, seq, content, metadata, embedding) \
                     VALUES (?, ?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM chunks WHERE collection = ?), ?, ?, ?) \
                     ON CONFLICT(collection, id) DO UPDATE SET \
                        content = excluded.content, \
                        metadata = excluded.metadata, \
                        embedding = excluded.embedding, \
                        updated_at = datetime('now')",
                )
                .bind(&collection)
                .bind(&p.id)
                .bind(&collection)
                .bind(&p.content)
                .bind(metadata)
                .bind(encode_vector(&p.vector))
                .execute(&mut *tx)
                .await
                .map_err(err)?;
            }
            tx.commit().await.map_err(err)?;
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
            let rows: Vec<(String, i64, String, String, Vec<u8>)> = sqlx::query_as(
                "SELECT id, seq, content, metadata, embedding FROM chunks WHERE collection = ?",
            )
            .bind(&collection)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Search(e.to_string()))?;

            let filter = filter.unwrap_or_default();
            let mut scored = Vec::with_capacity(rows.len());
            for (id, seq, content, metadata, embedding) in rows {
                let metadata = parse_metadata(&metadata)?;
                if !filter.matches(&metadata) {
                    continue;
                }
                scored.push(ScoredVectorPoint {
                    score: cosine_similarity(&vector, &decode_vector(&embedding)),
                    seq: u64::try_from(seq).unwrap_or_default(),
                    chunk: Chunk {
                        id,
                        content,
                        metadata,
                    },
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
            let row: Option<(String, String)> = sqlx::query_as(
                "SELECT content, metadata FROM chunks WHERE collection = ? AND id = ?",
            )
            .bind(&collection)
            .bind(&id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Search(e.to_string()))?;

            row.map(|(content, metadata)| {
                Ok(Chunk {
                    id: id.clone(),
                    content,
                    metadata: parse_metadata(&metadata)?,
                })
            })
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
            let err = |e: sqlx::Error| VectorStoreError::Delete(e.to_string());
            let mut tx = self.pool.begin().await.map_err(err)?;
            for id in &ids {
                sqlx::query("DELETE FROM chunks WHERE collection = ? AND id = ?")
                    .bind(&collection)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(err)?;
            }
            tx.commit().await.map_err(err)?;
            Ok(())
        })
    }
}
