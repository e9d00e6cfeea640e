use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use quill_index::{
    BatchReport, ChunkerConfig, CollectionStats, ConversationId, ConversationStore, IndexError,
    IngestedDocument, Metadata, ScoredChunk, VectorIndex,
};
use quill_llm::retry::retry_transient;
use quill_llm::{GenerationParams, LlmProvider, Message};
use serde::Serialize;

use crate::config::{AssistantConfig, assistant_settings};
use crate::error::AssistantError;
use crate::prompt;

/// A generated answer and the chunks that grounded it.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    pub sources: Vec<ScoredChunk>,
    pub used_sources: bool,
}

#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<IngestedDocument, IndexError>,
}

/// Per-file outcome of a directory ingestion, in enumeration order.
#[derive(Debug, Default)]
pub struct DirectoryReport {
    pub files: Vec<FileOutcome>,
}

impl DirectoryReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.result.is_ok()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.files.len() - self.succeeded()
    }

    #[must_use]
    pub fn total_chunks(&self) -> usize {
        self.files
            .iter()
            .filter_map(|f| f.result.as_ref().ok())
            .map(|d| d.chunk_ids.len())
            .sum()
    }

    /// Ids of every document that was stored.
    #[must_use]
    pub fn document_ids(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter_map(|f| f.result.as_ref().ok())
            .map(|d| d.id.as_str())
            .collect()
    }
}

/// Answers questions from a [`VectorIndex`] through a generation backend.
pub struct RetrievalAssistant<P: LlmProvider> {
    provider: Arc<P>,
    index: Arc<VectorIndex>,
    config: AssistantConfig,
    generation_timeout: Duration,
}

impl<P: LlmProvider> RetrievalAssistant<P> {
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when the assistant settings are unusable.
    pub fn new(
        provider: Arc<P>,
        index: Arc<VectorIndex>,
        config: AssistantConfig,
    ) -> Result<Self, AssistantError> {
        assistant_settings(&config)?;
        let generation_timeout = config.generation_timeout();
        Ok(Self {
            provider,
            index,
            config,
            generation_timeout,
        })
    }

    /// Override the per-call generation deadline.
    #[must_use]
    pub fn with_generation_timeout(mut self, limit: Duration) -> Self {
        self.generation_timeout = limit;
        self
    }

    #[must_use]
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    #[must_use]
    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    /// # Errors
    ///
    /// Returns `InvalidArgument` for mismatched input lengths; item failures are in the report.
    pub async fn add_documents_to_knowledge_base(
        &self,
        texts: Vec<String>,
        metadatas: Vec<Metadata>,
    ) -> Result<BatchReport, AssistantError> {
        Ok(self.index.add_documents(texts, metadatas, None).await?)
    }

    /// Ingest every file under `dir` matching `pattern`, one at a time.
    ///
    /// A file that fails is recorded in the report and the remaining files are still
    /// processed. The chunk overlap is the index's configured overlap.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when `chunk_size` is not larger than the overlap and
    /// `InvalidArgument` when `dir` is not a directory or `pattern` is malformed.
    pub async fn add_documents_from_directory(
        &self,
        dir: &Path,
        pattern: &str,
        chunk_size: usize,
    ) -> Result<DirectoryReport, AssistantError> {
        let chunk_overlap = self.index.config().chunk_overlap;
        ChunkerConfig::new(chunk_size, chunk_overlap)?;
        if !dir.is_dir() {
            return Err(AssistantError::InvalidArgument(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        let full = dir.join(pattern);
        let full = full.to_str().ok_or_else(|| {
            AssistantError::InvalidArgument(format!("non UTF-8 path: {}", full.display()))
        })?;
        let entries = glob::glob(full)
            .map_err(|e| AssistantError::InvalidArgument(format!("bad pattern {pattern:?}: {e}")))?;

        let mut report = DirectoryReport::default();
        for entry in entries {
            let (path, result) = match entry {
                Ok(path) => {
                    if !path.is_file() {
                        continue;
                    }
                    let result = self
                        .index
                        .add_document_from_file(&path, chunk_size, chunk_overlap)
                        .await;
                    (path, result)
                }
                Err(e) => {
                    let path = e.path().to_owned();
                    (path, Err(IndexError::Io(e.into_error())))
                }
            };
            if let Err(e) = &result {
                tracing::warn!(path = %path.display(), "file ingestion failed: {e}");
            }
            report.files.push(FileOutcome { path, result });
        }

        tracing::info!(
            dir = %dir.display(),
            pattern,
            succeeded = report.succeeded(),
            failed = report.failed(),
            chunks = report.total_chunks(),
            "directory ingested"
        );
        Ok(report)
    }

    /// Retrieve up to `n_context_docs` chunks and generate an answer grounded in them.
    ///
    /// With nothing retrieved the model is still asked, without context, and the answer
    /// reports `used_sources == false`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a blank question, zero documents, a negative temperature or
    /// zero tokens; `EmbeddingError` when the question cannot be embedded;
    /// `GenerationError`/`Timeout` when generation fails after retries.
    pub async fn query(
        &self,
        question: &str,
        n_context_docs: usize,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Answer, AssistantError> {
        let params = generation_params(temperature, max_tokens)?;
        let (prompt, sources) = self.ground(question, n_context_docs).await?;
        let answer = self.generate(vec![Message::user(prompt)], params).await?;
        Ok(Answer {
            question: question.to_owned(),
            answer,
            used_sources: !sources.is_empty(),
            sources,
        })
    }

    /// One-shot chat. Without RAG the message goes to the model verbatim.
    ///
    /// # Errors
    ///
    /// Same as [`Self::query`].
    pub async fn chat(
        &self,
        message: &str,
        use_rag: bool,
        n_context_docs: usize,
    ) -> Result<Answer, AssistantError> {
        if use_rag {
            return self
                .query(
                    message,
                    n_context_docs,
                    self.config.temperature,
                    self.config.max_tokens,
                )
                .await;
        }
        if message.trim().is_empty() {
            return Err(AssistantError::InvalidArgument("message is empty".into()));
        }
        let answer = self
            .generate(vec![Message::user(message)], self.default_params())
            .await?;
        Ok(Answer {
            question: message.to_owned(),
            answer,
            sources: Vec::new(),
            used_sources: false,
        })
    }

    /// Chat turn inside a stored conversation.
    ///
    /// The most recent `history_limit` messages precede the new turn. The user message and
    /// the answer are appended only after generation succeeds.
    ///
    /// # Errors
    ///
    /// Same as [`Self::chat`], plus `Storage` when the history store fails.
    pub async fn converse(
        &self,
        store: &dyn ConversationStore,
        conversation: ConversationId,
        message: &str,
        use_rag: bool,
        n_context_docs: usize,
    ) -> Result<Answer, AssistantError> {
        if message.trim().is_empty() {
            return Err(AssistantError::InvalidArgument("message is empty".into()));
        }
        let mut messages = store
            .fetch_history(conversation, self.config.history_limit)
            .await?;
        let (turn, sources) = if use_rag {
            self.ground(message, n_context_docs).await?
        } else {
            (message.to_owned(), Vec::new())
        };
        messages.push(Message::user(turn));

        let answer = self.generate(messages, self.default_params()).await?;

        store
            .append_message(conversation, Message::user(message))
            .await?;
        store
            .append_message(conversation, Message::assistant(answer.clone()))
            .await?;
        tracing::debug!(%conversation, used_sources = !sources.is_empty(), "turn stored");

        Ok(Answer {
            question: message.to_owned(),
            answer,
            used_sources: !sources.is_empty(),
            sources,
        })
    }

    /// # Errors
    ///
    /// Returns `Storage` if the collection cannot be read.
    pub async fn get_knowledge_base_stats(&self) -> Result<CollectionStats, AssistantError> {
        Ok(self.index.get_stats().await?)
    }

    async fn ground(
        &self,
        question: &str,
        n_context_docs: usize,
    ) -> Result<(String, Vec<ScoredChunk>), AssistantError> {
        if question.trim().is_empty() {
            return Err(AssistantError::InvalidArgument("question is empty".into()));
        }
        let retrieved = self.index.search(question, n_context_docs).await?;
        let context = prompt::build_context(retrieved.chunks, self.config.max_context_chars);
        let text = if context.is_empty() {
            tracing::debug!("no grounding found, answering without context");
            prompt::ungrounded_prompt(question)
        } else {
            prompt::grounded_prompt(question, &context.text)
        };
        Ok((text, context.sources))
    }

    fn default_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    async fn generate(
        &self,
        messages: Vec<Message>,
        params: GenerationParams,
    ) -> Result<String, AssistantError> {
        let provider: &P = &self.provider;
        let messages = messages.as_slice();
        let params = &params;
        let limit = self.generation_timeout;

        let attempt = retry_transient(
            "generate",
            self.config.generation_retries,
            self.config.retry_base(),
            move || provider.chat(messages, params),
        );
        let answer = tokio::time::timeout(limit, attempt)
            .await
            .map_err(|_| AssistantError::Timeout {
                operation: "generation",
                limit,
            })?
            .map_err(AssistantError::Generation)?;

        tracing::debug!(provider = provider.name(), chars = answer.len(), "answer generated");
        Ok(answer)
    }
}

fn generation_params(temperature: f32, max_tokens: u32) -> Result<GenerationParams, AssistantError> {
    if !temperature.is_finite() || temperature < 0.0 {
        return Err(AssistantError::InvalidArgument(format!(
            "temperature must be a non-negative number, got {temperature}"
        )));
    }
    if max_tokens == 0 {
        return Err(AssistantError::InvalidArgument(
            "max_tokens must be positive".into(),
        ));
    }
    Ok(GenerationParams {
        temperature,
        max_tokens,
    })
}

#[cfg(test)]
mod tests {
    use quill_index::{IndexConfig, InMemoryVectorStore, SqliteStore};
    use quill_llm::Role;
    use quill_llm::mock::MockProvider;
    use quill_llm::provider::embed_fn;

    use super::*;
    use crate::error::ErrorKind;

    fn fixture_with(
        mock: MockProvider,
        index_config: IndexConfig,
    ) -> (RetrievalAssistant<MockProvider>, Arc<MockProvider>) {
        let provider = Arc::new(mock);
        let index = VectorIndex::new(
            Arc::new(InMemoryVectorStore::new()),
            embed_fn(Arc::clone(&provider)),
            index_config,
        )
        .unwrap();
        let config = AssistantConfig {
            retry_base_ms: 1,
            ..AssistantConfig::default()
        };
        let assistant =
            RetrievalAssistant::new(Arc::clone(&provider), Arc::new(index), config).unwrap();
        (assistant, provider)
    }

    fn fixture(mock: MockProvider) -> (RetrievalAssistant<MockProvider>, Arc<MockProvider>) {
        fixture_with(mock, IndexConfig::default())
    }

    fn source(name: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("source".into(), serde_json::json!(name));
        m
    }

    async fn seed(assistant: &RetrievalAssistant<MockProvider>) {
        let report = assistant
            .add_documents_to_knowledge_base(
                vec![
                    "Rust ownership moves values between bindings".into(),
                    "Sourdough bread needs a long cold fermentation".into(),
                ],
                vec![source("rust.md"), source("baking.md")],
            )
            .await
            .unwrap();
        assert_eq!(report.succeeded(), 2);
    }

    #[test]
    fn invalid_settings_rejected_at_construction() {
        let provider = Arc::new(MockProvider::default());
        let index = VectorIndex::new(
            Arc::new(InMemoryVectorStore::new()),
            embed_fn(Arc::clone(&provider)),
            IndexConfig::default(),
        )
        .unwrap();
        let config = AssistantConfig {
            n_context_docs: 0,
            ..AssistantConfig::default()
        };
        let err = RetrievalAssistant::new(provider, Arc::new(index), config)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[tokio::test]
    async fn empty_collection_still_answers_without_sources() {
        let (assistant, provider) = fixture(MockProvider::default());
        let answer = assistant.query("What is Rust?", 3, 0.7, 256).await.unwrap();

        assert_eq!(answer.answer, "mock response");
        assert!(!answer.used_sources);
        assert!(answer.sources.is_empty());

        let calls = provider.recorded_calls();
        assert_eq!(calls.len(), 1);
        let prompt = &calls[0].0[0].content;
        assert!(prompt.contains("Question: What is Rust?"));
        assert!(!prompt.contains("Context:"));
    }

    #[tokio::test]
    async fn query_grounds_answer_in_ranked_chunks() {
        let (assistant, provider) = fixture(MockProvider::with_responses(vec![
            "Values move.".into(),
        ]));
        seed(&assistant).await;

        let answer = assistant
            .query("Rust ownership moves values between bindings", 1, 0.2, 128)
            .await
            .unwrap();

        assert_eq!(answer.answer, "Values move.");
        assert!(answer.used_sources);
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].chunk.source(), "rust.md");
        assert_eq!(answer.question, "Rust ownership moves values between bindings");

        let (messages, params) = &provider.recorded_calls()[0];
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert!(messages[0].content.contains("Document 1 (source: rust.md):"));
        assert!(messages[0].content.contains(prompt::NO_ANSWER));
        assert!(!messages[0].content.contains("Sourdough"));
        assert!((params.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(params.max_tokens, 128);
    }

    #[tokio::test]
    async fn query_rejects_bad_arguments() {
        let (assistant, provider) = fixture(MockProvider::default());
        for result in [
            assistant.query("  ", 3, 0.7, 10).await,
            assistant.query("q", 0, 0.7, 10).await,
            assistant.query("q", 3, -1.0, 10).await,
            assistant.query("q", 3, 0.7, 0).await,
        ] {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidArgument);
        }
        assert!(provider.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn chat_without_rag_sends_message_verbatim() {
        let (assistant, provider) = fixture(MockProvider::default());
        seed(&assistant).await;

        let answer = assistant.chat("Hello there", false, 3).await.unwrap();
        assert!(!answer.used_sources);
        assert!(answer.sources.is_empty());

        let (messages, params) = &provider.recorded_calls()[0];
        assert_eq!(messages[0].content, "Hello there");
        assert_eq!(params.max_tokens, 2048);
    }

    #[tokio::test]
    async fn chat_with_rag_behaves_as_query() {
        let (assistant, _provider) = fixture(MockProvider::default());
        seed(&assistant).await;
        let answer = assistant
            .chat("Sourdough bread needs a long cold fermentation", true, 2)
            .await
            .unwrap();
        assert!(answer.used_sources);
        assert_eq!(answer.sources[0].chunk.source(), "baking.md");
    }

    #[tokio::test]
    async fn transient_generation_failures_are_retried() {
        let (assistant, provider) = fixture(MockProvider::default().with_transient_failures(2));
        let answer = assistant.chat("hi", false, 1).await.unwrap();
        assert_eq!(answer.answer, "mock response");
        assert_eq!(provider.recorded_calls().len(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_generation_error() {
        let (assistant, provider) = fixture(MockProvider::default().with_transient_failures(5));
        let err = assistant.chat("hi", false, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenerationError);
        assert_eq!(provider.recorded_calls().len(), 3);
    }

    #[tokio::test]
    async fn permanent_generation_failure_is_not_degraded() {
        let (assistant, provider) = fixture(MockProvider::failing());
        seed(&assistant).await;
        let err = assistant.query("Rust ownership", 2, 0.7, 64).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenerationError);
        assert_eq!(provider.recorded_calls().len(), 1);
    }

    #[tokio::test]
    async fn slow_generation_times_out() {
        let (assistant, _provider) = fixture(MockProvider::default().with_delay(500));
        let assistant = assistant.with_generation_timeout(Duration::from_millis(20));
        let err = assistant.chat("hi", false, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(matches!(
            err,
            AssistantError::Timeout {
                operation: "generation",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn embedding_failure_during_search_is_embedding_error() {
        let (assistant, provider) =
            fixture(MockProvider::default().with_embed_failure_on("POISON"));
        let err = assistant.query("POISON question", 3, 0.7, 64).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmbeddingError);
        assert!(provider.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn stats_proxy_the_index() {
        let (assistant, _provider) = fixture(MockProvider::default());
        seed(&assistant).await;
        let stats = assistant.get_knowledge_base_stats().await.unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.collection_name, "documents");
    }

    #[tokio::test]
    async fn directory_ingestion_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha notes about rust").unwrap();
        std::fs::write(dir.path().join("b.txt"), "b".repeat(250)).unwrap();
        std::fs::write(dir.path().join("broken.txt"), [0xff, 0xfe, 0x00]).unwrap();
        std::fs::write(dir.path().join("skip.md"), "not matched").unwrap();
        std::fs::create_dir(dir.path().join("nested.txt")).unwrap();

        let (assistant, _provider) = fixture_with(
            MockProvider::default(),
            IndexConfig {
                chunk_size: 100,
                chunk_overlap: 20,
                ..IndexConfig::default()
            },
        );
        let report = assistant
            .add_documents_from_directory(dir.path(), "*.txt", 100)
            .await
            .unwrap();

        assert_eq!(report.files.len(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        // 250 chars, window 100 step 80: 0, 80, 160
        assert_eq!(report.total_chunks(), 1 + 3);
        let failed = report.files.iter().find(|f| f.result.is_err()).unwrap();
        assert!(failed.path.ends_with("broken.txt"));
    }

    #[tokio::test]
    async fn directory_ingestion_checks_chunk_size_first() {
        let (assistant, _provider) = fixture(MockProvider::default());
        let err = assistant
            .add_documents_from_directory(Path::new("/nonexistent"), "*.txt", 200)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);

        let err = assistant
            .add_documents_from_directory(Path::new("/nonexistent"), "*.txt", 1000)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn converse_carries_history_between_turns() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        let conversation = store.create_conversation().await.unwrap();
        let (assistant, provider) = fixture(MockProvider::with_responses(vec![
            "Nice to meet you, Ada.".into(),
            "Your name is Ada.".into(),
        ]));

        assistant
            .converse(&store, conversation, "My name is Ada", false, 3)
            .await
            .unwrap();
        let second = assistant
            .converse(&store, conversation, "What is my name?", false, 3)
            .await
            .unwrap();
        assert_eq!(second.answer, "Your name is Ada.");

        let calls = provider.recorded_calls();
        let contents: Vec<&str> = calls[1].0.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            ["My name is Ada", "Nice to meet you, Ada.", "What is my name?"]
        );
        assert_eq!(calls[1].0[1].role, Role::Assistant);

        let history = store.load_history(conversation, 10).await.unwrap();
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn failed_turn_is_not_stored() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        let conversation = store.create_conversation().await.unwrap();
        let (assistant, _provider) = fixture(MockProvider::failing());

        let err = assistant
            .converse(&store, conversation, "hello", false, 3)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenerationError);
        assert!(store.load_history(conversation, 10).await.unwrap().is_empty());
    }
}
