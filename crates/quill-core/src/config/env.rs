use std::str::FromStr;

use super::Config;

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring invalid {key} value: {raw}");
            None
        }
    }
}

fn kind<T: serde::de::DeserializeOwned>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    if let Ok(v) = serde_json::from_value(serde_json::Value::String(raw.trim().to_lowercase())) {
        Some(v)
    } else {
        tracing::warn!("ignoring invalid {key} value: {raw}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_ocr();
        self.apply_env_overrides_index();
        self.apply_env_overrides_assistant();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Some(provider) = kind("QUILL_LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(provider) = kind("QUILL_LLM_EMBEDDING_PROVIDER") {
            self.llm.embedding_provider = provider;
        }
        if let Ok(v) = std::env::var("QUILL_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("QUILL_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("QUILL_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("QUILL_GEMINI_MODEL") {
            self.llm.gemini.model = v;
        }
    }

    fn apply_env_overrides_ocr(&mut self) {
        if let Ok(v) = std::env::var("QUILL_OCR_LANGUAGES") {
            self.ocr.languages = v
                .split(['+', ','])
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(dpi) = parsed("QUILL_OCR_DPI") {
            self.ocr.dpi = dpi;
        }
        if let Some(bytes) = parsed("QUILL_OCR_MAX_FILE_SIZE") {
            self.ocr.max_file_size = bytes;
        }
        if let Some(enabled) = parsed("QUILL_OCR_SAVE_PAGE_IMAGES") {
            self.ocr.save_page_images = enabled;
        }
        if let Ok(v) = std::env::var("QUILL_OCR_PAGE_IMAGE_DIR") {
            self.ocr.page_image_dir = v.into();
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Some(backend) = kind("QUILL_INDEX_BACKEND") {
            self.index.backend = backend;
        }
        if let Ok(v) = std::env::var("QUILL_INDEX_SQLITE_PATH") {
            self.index.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("QUILL_INDEX_QDRANT_URL") {
            self.index.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("QUILL_INDEX_COLLECTION") {
            self.index.collection = v;
        }
        if let Some(size) = parsed("QUILL_INDEX_CHUNK_SIZE") {
            self.index.chunk_size = size;
        }
        if let Some(overlap) = parsed("QUILL_INDEX_CHUNK_OVERLAP") {
            self.index.chunk_overlap = overlap;
        }
        if let Some(floor) = parsed("QUILL_INDEX_RELEVANCE_FLOOR") {
            self.index.relevance_floor = Some(floor);
        }
        if let Some(n) = parsed("QUILL_INDEX_INGEST_CONCURRENCY") {
            self.index.ingest_concurrency = n;
        }
    }

    fn apply_env_overrides_assistant(&mut self) {
        if let Some(n) = parsed("QUILL_ASSISTANT_N_CONTEXT_DOCS") {
            self.assistant.n_context_docs = n;
        }
        if let Some(t) = parsed("QUILL_ASSISTANT_TEMPERATURE") {
            self.assistant.temperature = t;
        }
        if let Some(n) = parsed("QUILL_ASSISTANT_MAX_TOKENS") {
            self.assistant.max_tokens = n;
        }
        if let Some(secs) = parsed("QUILL_TIMEOUT_GENERATION") {
            self.assistant.generation_timeout_secs = secs;
        }
    }
}
