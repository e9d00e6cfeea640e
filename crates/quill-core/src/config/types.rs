use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::vault::Secret;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

/// Generation / embedding backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    Gemini,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend answering questions.
    pub provider: ProviderKind,
    /// Backend embedding chunks and queries. Changing it invalidates existing collections.
    pub embedding_provider: ProviderKind,
    /// Ollama server URL.
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub gemini: GeminiConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            embedding_provider: ProviderKind::Ollama,
            base_url: "http://localhost:11434".into(),
            model: "llama3.2".into(),
            embedding_model: "all-minilm".into(),
            gemini: GeminiConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: quill_llm::gemini::DEFAULT_BASE_URL.into(),
            model: "gemini-2.5-flash".into(),
            embedding_model: "text-embedding-004".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OcrConfig {
    pub languages: Vec<String>,
    pub page_segmentation_mode: u8,
    pub dpi: u32,
    pub max_file_size: u64,
    pub timeout_secs: u64,
    pub save_page_images: bool,
    pub page_image_dir: PathBuf,
    pub tesseract_path: PathBuf,
    pub pdftoppm_path: PathBuf,
    pub min_confidence: f32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        let defaults = quill_ocr::ExtractorConfig::default();
        Self {
            languages: defaults.languages,
            page_segmentation_mode: defaults.page_segmentation_mode,
            dpi: defaults.dpi,
            max_file_size: defaults.max_file_size,
            timeout_secs: defaults.timeout.as_secs(),
            save_page_images: defaults.save_page_images,
            page_image_dir: defaults.page_image_dir,
            tesseract_path: defaults.tesseract_path,
            pdftoppm_path: defaults.pdftoppm_path,
            min_confidence: quill_ocr::extractor::DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl OcrConfig {
    #[must_use]
    pub fn extractor_config(&self) -> quill_ocr::ExtractorConfig {
        quill_ocr::ExtractorConfig {
            languages: self.languages.clone(),
            page_segmentation_mode: self.page_segmentation_mode,
            dpi: self.dpi,
            max_file_size: self.max_file_size,
            timeout: Duration::from_secs(self.timeout_secs),
            save_page_images: self.save_page_images,
            page_image_dir: self.page_image_dir.clone(),
            tesseract_path: self.tesseract_path.clone(),
            pdftoppm_path: self.pdftoppm_path.clone(),
        }
    }
}

/// Where chunk vectors live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Sqlite,
    Memory,
    Qdrant,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    /// Vector collections (sqlite backend) and conversation history.
    pub sqlite_path: String,
    pub qdrant_url: String,
    pub collection: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_floor: Option<f32>,
    pub embed_timeout_secs: u64,
    pub embed_retries: u32,
    pub ingest_concurrency: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let defaults = quill_index::IndexConfig::default();
        Self {
            backend: IndexBackend::Sqlite,
            sqlite_path: "data/quill.db".into(),
            qdrant_url: "http://localhost:6334".into(),
            collection: defaults.collection,
            chunk_size: defaults.chunk_size,
            chunk_overlap: defaults.chunk_overlap,
            relevance_floor: defaults.relevance_floor,
            embed_timeout_secs: defaults.embed_timeout.as_secs(),
            embed_retries: defaults.embed_retries,
            ingest_concurrency: defaults.ingest_concurrency,
        }
    }
}

impl IndexConfig {
    #[must_use]
    pub fn index_config(&self) -> quill_index::IndexConfig {
        quill_index::IndexConfig {
            collection: self.collection.clone(),
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            relevance_floor: self.relevance_floor,
            embed_timeout: Duration::from_secs(self.embed_timeout_secs),
            embed_retries: self.embed_retries,
            ingest_concurrency: self.ingest_concurrency,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub n_context_docs: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound on the characters of retrieved text placed in one prompt.
    pub max_context_chars: usize,
    pub generation_retries: u32,
    pub retry_base_ms: u64,
    pub generation_timeout_secs: u64,
    /// Messages of earlier turns sent along in a conversation.
    pub history_limit: u32,
    pub directory_pattern: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            n_context_docs: 3,
            temperature: 0.7,
            max_tokens: 2048,
            max_context_chars: 12_000,
            generation_retries: 2,
            retry_base_ms: 500,
            generation_timeout_secs: 120,
            history_limit: 20,
            directory_pattern: "*.txt".into(),
        }
    }
}

impl AssistantConfig {
    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    #[must_use]
    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }
}

#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    pub gemini_api_key: Option<Secret>,
}
