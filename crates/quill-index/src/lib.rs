//! Chunking, embedding, durable storage and similarity search for ingested text.

pub mod chunker;
pub mod error;
pub mod history;
pub mod in_memory_store;
pub mod index;
#[cfg(feature = "qdrant")]
pub mod qdrant_store;
pub mod sqlite;
pub mod types;
pub mod vector_store;

pub use chunker::ChunkerConfig;
pub use error::IndexError;
pub use history::{ConversationId, ConversationStore, MessageId};
pub use in_memory_store::InMemoryVectorStore;
pub use index::{IndexConfig, VectorIndex, file_document_id};
#[cfg(feature = "qdrant")]
pub use qdrant_store::QdrantVectorStore;
pub use sqlite::SqliteStore;
pub use types::{BatchReport, Chunk, CollectionStats, IngestedDocument, Metadata, RetrievalResult, ScoredChunk};
pub use vector_store::{
    CollectionInfo, FieldCondition, FieldValue, ScoredVectorPoint, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError,
};

pub(crate) type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
