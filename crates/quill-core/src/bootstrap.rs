//! Construction of providers, stores and components from a loaded [`Config`].

use std::path::Path;
use std::sync::Arc;

use quill_index::{InMemoryVectorStore, SqliteStore, VectorIndex, VectorStore};
use quill_llm::any::AnyProvider;
use quill_llm::gemini::GeminiProvider;
use quill_llm::ollama::OllamaProvider;
use quill_llm::provider::embed_fn;
use quill_ocr::TextExtractor;

use crate::config::{Config, IndexBackend, IndexConfig, LlmConfig, ProviderKind, ResolvedSecrets};
use crate::error::AssistantError;

/// # Errors
///
/// Returns `InvalidConfiguration` when Gemini is selected without an API key.
pub fn build_provider(
    kind: ProviderKind,
    llm: &LlmConfig,
    secrets: &ResolvedSecrets,
) -> Result<AnyProvider, AssistantError> {
    match kind {
        ProviderKind::Ollama => Ok(AnyProvider::Ollama(OllamaProvider::new(
            &llm.base_url,
            llm.model.clone(),
            llm.embedding_model.clone(),
        ))),
        ProviderKind::Gemini => {
            let key = secrets.gemini_api_key.as_ref().ok_or_else(|| {
                AssistantError::InvalidConfiguration(
                    "gemini provider selected but QUILL_GEMINI_API_KEY is not set".into(),
                )
            })?;
            Ok(AnyProvider::Gemini(
                GeminiProvider::new(
                    key.expose().to_owned(),
                    llm.gemini.model.clone(),
                    llm.gemini.embedding_model.clone(),
                )
                .with_base_url(llm.gemini.base_url.clone()),
            ))
        }
    }
}

/// Chunk vectors and conversation history.
pub struct Stores {
    pub vectors: Arc<dyn VectorStore>,
    pub history: Arc<SqliteStore>,
}

/// Open the configured vector backend. History always lives in `SQLite`; with the memory
/// backend it is in-memory too.
///
/// # Errors
///
/// Returns `Storage` when the database cannot be opened and `InvalidConfiguration` for
/// the qdrant backend in a build without the `qdrant` feature.
pub async fn open_stores(config: &IndexConfig) -> Result<Stores, AssistantError> {
    if config.backend == IndexBackend::Memory {
        return Ok(Stores {
            vectors: Arc::new(InMemoryVectorStore::new()),
            history: Arc::new(SqliteStore::new(":memory:").await?),
        });
    }

    if let Some(parent) = Path::new(&config.sqlite_path).parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let sqlite = Arc::new(SqliteStore::new(&config.sqlite_path).await?);

    let vectors: Arc<dyn VectorStore> = match config.backend {
        IndexBackend::Qdrant => qdrant_store(&config.qdrant_url)?,
        IndexBackend::Sqlite | IndexBackend::Memory => {
            Arc::clone(&sqlite) as Arc<dyn VectorStore>
        }
    };
    tracing::info!(backend = ?config.backend, path = %config.sqlite_path, "stores opened");
    Ok(Stores {
        vectors,
        history: sqlite,
    })
}

#[cfg(feature = "qdrant")]
fn qdrant_store(url: &str) -> Result<Arc<dyn VectorStore>, AssistantError> {
    Ok(Arc::new(quill_index::QdrantVectorStore::new(url)?))
}

#[cfg(not(feature = "qdrant"))]
fn qdrant_store(_url: &str) -> Result<Arc<dyn VectorStore>, AssistantError> {
    Err(AssistantError::InvalidConfiguration(
        "qdrant backend requires building with the `qdrant` feature".into(),
    ))
}

/// Index over `store` embedding through the configured embedding provider.
///
/// # Errors
///
/// Returns `InvalidConfiguration` for a missing key or unusable index settings.
pub fn build_index(
    config: &Config,
    store: Arc<dyn VectorStore>,
) -> Result<VectorIndex, AssistantError> {
    let embedder = build_provider(config.llm.embedding_provider, &config.llm, &config.secrets)?;
    Ok(VectorIndex::new(
        store,
        embed_fn(Arc::new(embedder)),
        config.index.index_config(),
    )?)
}

/// # Errors
///
/// Returns `InvalidConfiguration` if the OCR settings do not validate.
pub fn build_extractor(config: &Config) -> Result<TextExtractor, AssistantError> {
    Ok(TextExtractor::new(config.ocr.extractor_config())?)
}

#[cfg(test)]
mod tests {
    use quill_llm::LlmProvider;

    use super::*;
    use crate::error::ErrorKind;
    use crate::vault::Secret;

    #[test]
    fn ollama_needs_no_secret() {
        let provider = build_provider(
            ProviderKind::Ollama,
            &LlmConfig::default(),
            &ResolvedSecrets::default(),
        )
        .unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn gemini_without_key_is_rejected() {
        let err = build_provider(
            ProviderKind::Gemini,
            &LlmConfig::default(),
            &ResolvedSecrets::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn gemini_with_key() {
        let secrets = ResolvedSecrets {
            gemini_api_key: Some(Secret::new("k")),
        };
        let provider =
            build_provider(ProviderKind::Gemini, &LlmConfig::default(), &secrets).unwrap();
        assert_eq!(provider.name(), "gemini");
    }

    #[tokio::test]
    async fn memory_backend_opens_without_files() {
        let config = IndexConfig {
            backend: IndexBackend::Memory,
            sqlite_path: "/nonexistent/dir/never.db".into(),
            ..IndexConfig::default()
        };
        let stores = open_stores(&config).await.unwrap();
        let info = stores.vectors.collection_info("documents").await.unwrap();
        assert_eq!(info.count, 0);
        assert!(info.dimension.is_none());
    }

    #[tokio::test]
    async fn sqlite_backend_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/quill.db");
        let config = IndexConfig {
            sqlite_path: path.to_string_lossy().into_owned(),
            ..IndexConfig::default()
        };
        open_stores(&config).await.unwrap();
        assert!(path.exists());
    }

    #[cfg(not(feature = "qdrant"))]
    #[tokio::test]
    async fn qdrant_backend_needs_feature() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig {
            backend: IndexBackend::Qdrant,
            sqlite_path: dir.path().join("q.db").to_string_lossy().into_owned(),
            ..IndexConfig::default()
        };
        let err = open_stores(&config).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn extractor_and_index_from_defaults() {
        let config = Config::default();
        assert!(build_extractor(&config).is_ok());
        assert!(build_index(&config, Arc::new(InMemoryVectorStore::new())).is_ok());
    }
}
