use std::io::Write;
use std::path::Path;

use serial_test::serial;

use super::*;
use crate::error::ErrorKind;
use crate::vault::MockVaultProvider;

const ENV_KEYS: [&str; 25] = [
    "QUILL_CONFIG",
    "QUILL_LLM_PROVIDER",
    "QUILL_LLM_EMBEDDING_PROVIDER",
    "QUILL_LLM_BASE_URL",
    "QUILL_LLM_MODEL",
    "QUILL_LLM_EMBEDDING_MODEL",
    "QUILL_GEMINI_MODEL",
    "QUILL_GEMINI_API_KEY",
    "QUILL_OCR_LANGUAGES",
    "QUILL_OCR_DPI",
    "QUILL_OCR_MAX_FILE_SIZE",
    "QUILL_OCR_SAVE_PAGE_IMAGES",
    "QUILL_OCR_PAGE_IMAGE_DIR",
    "QUILL_INDEX_BACKEND",
    "QUILL_INDEX_SQLITE_PATH",
    "QUILL_INDEX_QDRANT_URL",
    "QUILL_INDEX_COLLECTION",
    "QUILL_INDEX_CHUNK_SIZE",
    "QUILL_INDEX_CHUNK_OVERLAP",
    "QUILL_INDEX_RELEVANCE_FLOOR",
    "QUILL_INDEX_INGEST_CONCURRENCY",
    "QUILL_ASSISTANT_N_CONTEXT_DOCS",
    "QUILL_ASSISTANT_TEMPERATURE",
    "QUILL_ASSISTANT_MAX_TOKENS",
    "QUILL_TIMEOUT_GENERATION",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("quill.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(f, "{body}").unwrap();
    path
}

#[test]
fn defaults_match_documented_values() {
    let config = Config::default();
    assert_eq!(config.llm.provider, ProviderKind::Ollama);
    assert_eq!(config.llm.base_url, "http://localhost:11434");
    assert_eq!(config.llm.gemini.model, "gemini-2.5-flash");
    assert_eq!(config.ocr.languages, ["vie", "eng"]);
    assert_eq!(config.ocr.dpi, 300);
    assert_eq!(config.ocr.max_file_size, 10 * 1024 * 1024);
    assert_eq!(config.index.backend, IndexBackend::Sqlite);
    assert_eq!(config.index.collection, "documents");
    assert_eq!(config.index.chunk_size, 1000);
    assert_eq!(config.index.chunk_overlap, 200);
    assert!(config.index.relevance_floor.is_none());
    assert_eq!(config.assistant.n_context_docs, 3);
    assert!((config.assistant.temperature - 0.7).abs() < f32::EPSILON);
    assert_eq!(config.assistant.max_tokens, 2048);
    assert_eq!(config.assistant.generation_retries, 2);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn missing_file_falls_back_to_defaults() {
    clear_env();
    let config = Config::load(Path::new("/nonexistent/quill.toml")).unwrap();
    assert_eq!(config.index.sqlite_path, "data/quill.db");
}

#[test]
#[serial]
fn parse_partial_toml() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[llm]
provider = "gemini"
embedding_provider = "ollama"

[ocr]
languages = ["eng"]
dpi = 200

[index]
backend = "memory"
chunk_size = 500
chunk_overlap = 50
relevance_floor = 0.25

[assistant]
n_context_docs = 5
"#,
    );

    let config = Config::load(&path).unwrap();
    assert_eq!(config.llm.provider, ProviderKind::Gemini);
    assert_eq!(config.llm.embedding_provider, ProviderKind::Ollama);
    assert_eq!(config.llm.model, "llama3.2");
    assert_eq!(config.ocr.languages, ["eng"]);
    assert_eq!(config.ocr.dpi, 200);
    assert_eq!(config.ocr.page_segmentation_mode, 6);
    assert_eq!(config.index.backend, IndexBackend::Memory);
    assert_eq!(config.index.relevance_floor, Some(0.25));
    assert_eq!(config.assistant.n_context_docs, 5);
    assert_eq!(config.assistant.max_tokens, 2048);

    let index = config.index.index_config();
    assert_eq!(index.chunk_size, 500);
    assert_eq!(index.chunk_overlap, 50);
}

#[test]
#[serial]
fn malformed_toml_is_an_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[index\nchunk_size = ");
    assert!(Config::load(&path).is_err());
}

#[test]
#[serial]
fn env_overrides_apply_after_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[index]\nchunk_size = 500\n");

    unsafe {
        std::env::set_var("QUILL_LLM_PROVIDER", "Gemini");
        std::env::set_var("QUILL_OCR_LANGUAGES", "vie+eng+fra");
        std::env::set_var("QUILL_INDEX_CHUNK_SIZE", "800");
        std::env::set_var("QUILL_INDEX_RELEVANCE_FLOOR", "0.5");
        std::env::set_var("QUILL_INDEX_BACKEND", "memory");
    }
    let config = Config::load(&path).unwrap();
    clear_env();

    assert_eq!(config.llm.provider, ProviderKind::Gemini);
    assert_eq!(config.ocr.languages, ["vie", "eng", "fra"]);
    assert_eq!(config.index.chunk_size, 800);
    assert_eq!(config.index.relevance_floor, Some(0.5));
    assert_eq!(config.index.backend, IndexBackend::Memory);
}

#[test]
#[serial]
fn invalid_env_values_are_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("QUILL_LLM_PROVIDER", "openai");
        std::env::set_var("QUILL_OCR_DPI", "high");
        std::env::set_var("QUILL_INDEX_CHUNK_OVERLAP", "-3");
    }
    let config = Config::load(Path::new("/nonexistent/quill.toml")).unwrap();
    clear_env();

    assert_eq!(config.llm.provider, ProviderKind::Ollama);
    assert_eq!(config.ocr.dpi, 300);
    assert_eq!(config.index.chunk_overlap, 200);
}

#[test]
fn validate_rejects_impossible_values() {
    let mut config = Config::default();
    config.index.chunk_overlap = config.index.chunk_size;
    assert_eq!(
        config.validate().unwrap_err().kind(),
        ErrorKind::InvalidConfiguration
    );

    let mut config = Config::default();
    config.ocr.dpi = 0;
    assert_eq!(
        config.validate().unwrap_err().kind(),
        ErrorKind::InvalidConfiguration
    );

    let mut config = Config::default();
    config.ocr.languages.clear();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.ocr.max_file_size = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.assistant.n_context_docs = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.index.relevance_floor = Some(2.0);
    assert!(config.validate().is_err());
}

#[tokio::test]
async fn secrets_resolve_through_vault() {
    let mut config = Config::default();
    let vault = MockVaultProvider::default().with_secret("QUILL_GEMINI_API_KEY", "k-123");
    config.resolve_secrets(&vault).await.unwrap();
    let key = config.secrets.gemini_api_key.as_ref().unwrap();
    assert_eq!(key.expose(), "k-123");
    assert_eq!(format!("{:?}", config.secrets), "ResolvedSecrets { gemini_api_key: Some([REDACTED]) }");
}

#[test]
#[serial]
fn config_path_resolution_order() {
    clear_env();
    assert_eq!(
        resolve_config_path(Some(Path::new("custom.toml"))),
        Path::new("custom.toml")
    );
    assert_eq!(resolve_config_path(None), Path::new(DEFAULT_CONFIG_PATH));

    unsafe { std::env::set_var("QUILL_CONFIG", "/etc/quill.toml") };
    assert_eq!(resolve_config_path(None), Path::new("/etc/quill.toml"));
    assert_eq!(
        resolve_config_path(Some(Path::new("flag.toml"))),
        Path::new("flag.toml")
    );
    clear_env();
}

#[test]
fn config_roundtrips_through_toml() {
    let config = Config::default();
    let toml_str = toml::to_string_pretty(&config).unwrap();
    let back: Config = toml::from_str(&toml_str).unwrap();
    assert_eq!(back.index.chunk_size, config.index.chunk_size);
    assert_eq!(back.ocr.languages, config.ocr.languages);
    assert_eq!(back.llm.gemini.base_url, config.llm.gemini.base_url);
}

#[test]
fn shipped_default_config_matches_builtin_defaults() {
    let shipped: Config = toml::from_str(include_str!("../../../../config/default.toml")).unwrap();
    let builtin = Config::default();
    assert!(shipped.validate().is_ok());
    assert_eq!(
        toml::to_string(&shipped).unwrap(),
        toml::to_string(&builtin).unwrap()
    );
}
