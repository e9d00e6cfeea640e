//! Extraction, indexing and grounded answering wired together over mock backends.

use std::sync::Arc;

use quill_core::bootstrap::open_stores;
use quill_core::config::{AssistantConfig, IndexBackend, IndexConfig};
use quill_core::{ErrorKind, IngestionPipeline, RetrievalAssistant};
use quill_index::VectorIndex;
use quill_llm::mock::MockProvider;
use quill_llm::provider::embed_fn;
use quill_ocr::testing::{FakeEngine, FakeRasterizer, inked_image, pdf_with_pages};
use quill_ocr::{DocumentSource, ExtractorConfig, TextExtractor, UploadResponse, upload};

fn extractor(text: &str) -> Arc<TextExtractor> {
    Arc::new(
        TextExtractor::with_backends(
            ExtractorConfig {
                save_page_images: false,
                ..ExtractorConfig::default()
            },
            Arc::new(FakeEngine::reading(text)),
            Arc::new(FakeRasterizer::new(vec![inked_image()])),
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn scanned_pdf_answers_grounded_question() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("handbook.pdf");
    std::fs::write(&pdf, pdf_with_pages(1)).unwrap();

    let index_config = IndexConfig {
        backend: IndexBackend::Sqlite,
        sqlite_path: dir.path().join("quill.db").to_string_lossy().into_owned(),
        ..IndexConfig::default()
    };
    let stores = open_stores(&index_config).await.unwrap();
    let provider = Arc::new(MockProvider::with_responses(vec![
        "Leave requests go to the team lead.".into(),
    ]));
    let index = Arc::new(
        VectorIndex::new(
            stores.vectors,
            embed_fn(Arc::clone(&provider)),
            index_config.index_config(),
        )
        .unwrap(),
    );

    let text = "Leave requests are approved by the team lead";
    let pipeline = IngestionPipeline::new(extractor(text), Arc::clone(&index));
    let report = pipeline.ingest_paths(vec![pdf]).await;
    assert_eq!(report.succeeded(), 1);

    let assistant =
        RetrievalAssistant::new(Arc::clone(&provider), index, AssistantConfig::default()).unwrap();
    let answer = assistant.query(text, 3, 0.2, 256).await.unwrap();

    assert!(answer.used_sources);
    assert_eq!(answer.sources[0].chunk.source(), "handbook.pdf");
    assert_eq!(answer.answer, "Leave requests go to the team lead.");
    let prompt = &provider.recorded_calls()[0].0[0].content;
    assert!(prompt.contains("Document 1 (source: handbook.pdf):"));
    assert!(prompt.contains(text));
}

#[tokio::test]
async fn empty_knowledge_base_still_answers() {
    let stores = open_stores(&IndexConfig {
        backend: IndexBackend::Memory,
        ..IndexConfig::default()
    })
    .await
    .unwrap();
    let provider = Arc::new(MockProvider::default());
    let index = Arc::new(
        VectorIndex::new(
            stores.vectors,
            embed_fn(Arc::clone(&provider)),
            quill_index::IndexConfig::default(),
        )
        .unwrap(),
    );
    let assistant =
        RetrievalAssistant::new(provider, Arc::clone(&index), AssistantConfig::default()).unwrap();

    assert!(index.search("anything", 3).await.unwrap().is_empty());
    let answer = assistant.query("anything", 3, 0.7, 64).await.unwrap();
    assert!(!answer.used_sources);
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn upload_contract_bodies() {
    let extractor = extractor("Hello AI");

    let ok = upload::submit_pdf(&extractor, &DocumentSource::named("sample.pdf", pdf_with_pages(1)))
        .await;
    assert_eq!(
        serde_json::to_value(&ok).unwrap(),
        serde_json::json!({"status": "success", "content": "Hello AI"})
    );

    let corrupt =
        upload::submit_pdf(&extractor, &DocumentSource::named("corrupt.pdf", b"%PDF-1.4 junk".to_vec()))
            .await;
    assert_eq!(
        corrupt,
        UploadResponse::Error {
            message: "Invalid PDF file".into()
        }
    );

    let text = upload::submit_pdf(
        &extractor,
        &DocumentSource::named("sample.txt", b"just some text".to_vec()),
    )
    .await;
    assert_eq!(
        text,
        UploadResponse::Error {
            message: "Unsupported file type".into()
        }
    );
}

#[tokio::test]
async fn oversized_upload_fails_before_decoding() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge.png");
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(quill_ocr::DEFAULT_MAX_FILE_SIZE + 1).unwrap();

    let pipeline = IngestionPipeline::new(
        extractor("unused"),
        Arc::new(
            VectorIndex::new(
                Arc::new(quill_index::InMemoryVectorStore::new()),
                embed_fn(Arc::new(MockProvider::default())),
                quill_index::IndexConfig::default(),
            )
            .unwrap(),
        ),
    );
    let err = pipeline.ingest_path(&path).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileTooLarge);
}
