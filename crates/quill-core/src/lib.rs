//! Retrieval assistant and ingestion orchestration on top of the extractor and the index.

pub mod assistant;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod ingest;
pub mod prompt;
pub mod vault;

pub use assistant::{Answer, DirectoryReport, FileOutcome, RetrievalAssistant};
pub use config::Config;
pub use error::{AssistantError, ErrorBody, ErrorKind};
pub use ingest::{IngestOutcome, IngestReport, IngestionPipeline};
