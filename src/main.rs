use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use quill_core::bootstrap;
use quill_core::config::{self, Config};
use quill_core::vault::EnvVaultProvider;
use quill_core::{Answer, AssistantError, ErrorBody, IngestionPipeline, RetrievalAssistant};
use quill_index::{ConversationId, SqliteStore};
use quill_llm::any::AnyProvider;
use quill_ocr::{DocumentSource, upload};

#[derive(Parser, Debug)]
#[command(
    name = "quill",
    about = "Extract, index and question scanned documents",
    version
)]
struct Cli {
    /// Config file (default: $QUILL_CONFIG, then config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract text from an image or PDF
    Extract {
        file: PathBuf,
        /// OCR the image as is, without binarization and denoising (images only)
        #[arg(long, conflicts_with_all = ["detailed", "json"])]
        no_preprocess: bool,
        /// Print tokens with confidence and bounding boxes as JSON
        #[arg(long)]
        detailed: bool,
        /// Print the upload response body
        #[arg(long, conflicts_with = "detailed")]
        json: bool,
    },

    /// Extract and index documents
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Index the text files of a directory
    IngestDir {
        dir: PathBuf,
        /// Glob pattern relative to the directory (default from config)
        #[arg(long)]
        pattern: Option<String>,
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Answer a question from the knowledge base
    Ask {
        question: String,
        /// Number of context chunks
        #[arg(short = 'n', long)]
        n_context_docs: Option<usize>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// Chat, optionally inside a stored conversation
    Chat {
        message: String,
        /// Skip retrieval and send the message as is
        #[arg(long)]
        no_rag: bool,
        /// Conversation id, or `new` to start one
        #[arg(long)]
        conversation: Option<ConversationArg>,
        #[arg(short = 'n', long)]
        n_context_docs: Option<usize>,
    },

    /// Show knowledge base statistics
    Stats,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConversationArg {
    New,
    Existing(ConversationId),
}

impl FromStr for ConversationArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("new") {
            return Ok(Self::New);
        }
        s.parse::<i64>()
            .map(|id| Self::Existing(ConversationId(id)))
            .map_err(|_| format!("expected a conversation id or `new`, got {s:?}"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();

    let config_path = config::resolve_config_path(cli.config.as_deref());
    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    config
        .resolve_secrets(&EnvVaultProvider)
        .await
        .context("failed to resolve secrets")?;
    config.validate().context("invalid configuration")?;

    if let Err(e) = run(cli.command, &config).await {
        tracing::error!("{e}");
        let body = serde_json::to_string(&ErrorBody::from(&e))?;
        println!("{body}");
        std::process::exit(1);
    }
    Ok(())
}

/// Logs go to stderr so stdout carries only command output.
fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Command, config: &Config) -> Result<(), AssistantError> {
    match command {
        Command::Extract {
            file,
            no_preprocess,
            detailed,
            json,
        } => extract(config, &file, no_preprocess, detailed, json).await,
        Command::Ingest { files } => ingest(config, files).await,
        Command::IngestDir {
            dir,
            pattern,
            chunk_size,
        } => {
            let (assistant, _) = assistant(config).await?;
            let pattern = pattern.unwrap_or_else(|| config.assistant.directory_pattern.clone());
            let chunk_size = chunk_size.unwrap_or(config.index.chunk_size);
            let report = assistant
                .add_documents_from_directory(&dir, &pattern, chunk_size)
                .await?;
            for file in &report.files {
                match &file.result {
                    Ok(doc) => println!(
                        "{}\t{}\t{} chunks",
                        file.path.display(),
                        doc.id,
                        doc.chunk_ids.len()
                    ),
                    Err(e) => println!("{}\terror\t{e}", file.path.display()),
                }
            }
            println!(
                "{} files indexed, {} failed, {} chunks",
                report.succeeded(),
                report.failed(),
                report.total_chunks()
            );
            Ok(())
        }
        Command::Ask {
            question,
            n_context_docs,
            temperature,
            max_tokens,
        } => {
            let (assistant, _) = assistant(config).await?;
            let answer = assistant
                .query(
                    &question,
                    n_context_docs.unwrap_or(config.assistant.n_context_docs),
                    temperature.unwrap_or(config.assistant.temperature),
                    max_tokens.unwrap_or(config.assistant.max_tokens),
                )
                .await?;
            print_answer(&answer);
            Ok(())
        }
        Command::Chat {
            message,
            no_rag,
            conversation,
            n_context_docs,
        } => {
            let (assistant, history) = assistant(config).await?;
            let n = n_context_docs.unwrap_or(config.assistant.n_context_docs);
            let answer = match conversation {
                None => assistant.chat(&message, !no_rag, n).await?,
                Some(arg) => {
                    let id = match arg {
                        ConversationArg::Existing(id) => id,
                        ConversationArg::New => {
                            let id = history.create_conversation().await?;
                            eprintln!("conversation {id}");
                            id
                        }
                    };
                    assistant
                        .converse(history.as_ref(), id, &message, !no_rag, n)
                        .await?
                }
            };
            print_answer(&answer);
            Ok(())
        }
        Command::Stats => {
            let (assistant, _) = assistant(config).await?;
            let stats = assistant.get_knowledge_base_stats().await?;
            println!("{}", to_json(&stats)?);
            Ok(())
        }
    }
}

async fn assistant(
    config: &Config,
) -> Result<(RetrievalAssistant<AnyProvider>, Arc<SqliteStore>), AssistantError> {
    let stores = bootstrap::open_stores(&config.index).await?;
    let index = Arc::new(bootstrap::build_index(config, stores.vectors)?);
    let provider = bootstrap::build_provider(config.llm.provider, &config.llm, &config.secrets)?;
    let assistant = RetrievalAssistant::new(Arc::new(provider), index, config.assistant.clone())?;
    Ok((assistant, stores.history))
}

async fn extract(
    config: &Config,
    file: &Path,
    no_preprocess: bool,
    detailed: bool,
    json: bool,
) -> Result<(), AssistantError> {
    let is_pdf = file
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    check_preprocess_option(is_pdf, no_preprocess)?;
    let extractor = bootstrap::build_extractor(config)?;
    let source = DocumentSource::from_path(file);

    if json {
        let response = if is_pdf {
            upload::submit_pdf(&extractor, &source).await
        } else {
            upload::submit_image(&extractor, &source).await
        };
        println!("{}", to_json(&response)?);
        return Ok(());
    }
    if detailed {
        let extracted = extractor.extract_detailed(&source).await?;
        println!("{}", to_json(&extracted)?);
        return Ok(());
    }
    let text = if no_preprocess {
        extractor.extract_from_image(&source, false).await?
    } else {
        extractor.extract(&source).await?.text
    };
    println!("{text}");
    Ok(())
}

fn check_preprocess_option(is_pdf: bool, no_preprocess: bool) -> Result<(), AssistantError> {
    if is_pdf && no_preprocess {
        return Err(AssistantError::InvalidArgument(
            "--no-preprocess applies to images only; PDF pages are always preprocessed".into(),
        ));
    }
    Ok(())
}

async fn ingest(config: &Config, files: Vec<PathBuf>) -> Result<(), AssistantError> {
    let stores = bootstrap::open_stores(&config.index).await?;
    let index = Arc::new(bootstrap::build_index(config, stores.vectors)?);
    let extractor = Arc::new(bootstrap::build_extractor(config)?);
    let report = IngestionPipeline::new(extractor, index)
        .ingest_paths(files)
        .await;

    for item in &report.items {
        match &item.result {
            Ok(doc) => println!(
                "{}\t{}\t{} chunks",
                item.path.display(),
                doc.id,
                doc.chunk_ids.len()
            ),
            Err(e) => println!("{}\t{:?}\t{e}", item.path.display(), e.kind()),
        }
    }
    println!(
        "{} ingested, {} failed, {} chunks",
        report.succeeded(),
        report.failed(),
        report.chunk_count()
    );
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.answer);
    if answer.used_sources {
        println!();
        println!("Sources:");
        for (i, source) in answer.sources.iter().enumerate() {
            println!(
                "  [{}] {} (score {:.3})",
                i + 1,
                source.chunk.source(),
                source.score
            );
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AssistantError> {
    serde_json::to_string_pretty(value).map_err(|e| AssistantError::Index(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ask_with_overrides() {
        let cli = Cli::try_parse_from([
            "quill",
            "--config",
            "custom.toml",
            "ask",
            "What is Rust?",
            "-n",
            "5",
            "--temperature",
            "0.1",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("custom.toml")));
        match cli.command {
            Command::Ask {
                question,
                n_context_docs,
                temperature,
                max_tokens,
            } => {
                assert_eq!(question, "What is Rust?");
                assert_eq!(n_context_docs, Some(5));
                assert_eq!(temperature, Some(0.1));
                assert!(max_tokens.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn ingest_requires_files() {
        assert!(Cli::try_parse_from(["quill", "ingest"]).is_err());
    }

    #[test]
    fn extract_json_and_detailed_conflict() {
        assert!(Cli::try_parse_from(["quill", "extract", "a.pdf", "--json", "--detailed"]).is_err());
    }

    #[test]
    fn no_preprocess_is_for_plain_image_extraction() {
        assert!(check_preprocess_option(false, true).is_ok());
        assert!(check_preprocess_option(true, false).is_ok());
        let err = check_preprocess_option(true, true).unwrap_err();
        assert_eq!(err.kind(), quill_core::ErrorKind::InvalidArgument);

        assert!(
            Cli::try_parse_from(["quill", "extract", "a.png", "--no-preprocess", "--json"]).is_err()
        );
        assert!(Cli::try_parse_from(["quill", "extract", "a.png", "--no-preprocess"]).is_ok());
    }

    #[test]
    fn conversation_argument() {
        assert_eq!("new".parse::<ConversationArg>(), Ok(ConversationArg::New));
        assert_eq!(
            "42".parse::<ConversationArg>(),
            Ok(ConversationArg::Existing(ConversationId(42)))
        );
        assert!("latest".parse::<ConversationArg>().is_err());

        let cli = Cli::try_parse_from(["quill", "chat", "hi", "--no-rag", "--conversation", "7"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Command::Chat {
                no_rag: true,
                conversation: Some(ConversationArg::Existing(ConversationId(7))),
                ..
            }
        ));
    }
}
