use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_rag_core::{
    read_upload, resolve_inputs, AnswerGenerator, CharacterNgramEmbedder, DocumentStore,
    EmbeddingProvider, FileDocumentStore, GeminiConfig, GeminiGenerator, HttpEmbedder,
    HttpEmbedderConfig, ProcessingStatus, QdrantStore, RetrievalConfig, RetrievalEngine,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "document_chunks")]
    qdrant_collection: String,

    /// Qdrant API key, if the instance requires one
    #[arg(long, env = "QDRANT_API_KEY")]
    qdrant_api_key: Option<String>,

    /// Embedding backend. Defaults to `http` when EMBEDDING_URL is set and
    /// to `local` when built with local embeddings.
    #[arg(long, env = "EMBEDDING_PROVIDER", value_enum)]
    embedding_provider: Option<EmbedderKind>,

    /// OpenAI-compatible embeddings endpoint
    #[arg(long, env = "EMBEDDING_URL")]
    embedding_url: Option<String>,

    /// Embedding model name sent to the endpoint or loaded locally
    #[arg(long, env = "EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    /// Vector size produced by the embedding model
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = 768)]
    embedding_dimensions: usize,

    #[arg(long, env = "EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,

    /// Gemini API key; queries with matches fail without it
    #[arg(long, env = "GOOGLE_API_KEY")]
    google_api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.5-flash")]
    gemini_model: String,

    /// JSON file holding document and chunk metadata
    #[arg(long, env = "DOCUMENT_STORE_PATH", default_value = "pdf-rag-documents.json")]
    document_store_path: PathBuf,

    /// Minimum cosine similarity for a passage to be used as a source
    #[arg(long, env = "SIMILARITY_THRESHOLD", default_value_t = 0.3)]
    similarity_threshold: f32,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest one PDF or every PDF below a folder and wait for processing.
    Ingest {
        /// PDF file or folder that contains PDFs recursively.
        #[arg(long)]
        path: PathBuf,
    },
    /// Ask a question answered from the ingested documents.
    Query {
        #[arg(long)]
        text: String,
        /// Maximum number of sources to retrieve.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Remove a document with its chunks and vectors.
    Delete {
        #[arg(long)]
        document_id: String,
    },
    /// List documents, newest first.
    List,
}

const DEFAULT_HTTP_MODEL: &str = "paraphrase-multilingual-mpnet-base-v2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// OpenAI-compatible embeddings endpoint
    Http,
    /// In-process multilingual model (requires the local-embeddings-fastembed feature)
    Local,
    /// Character-trigram hashing; surface similarity only, no cross-language matches
    Trigram,
}

/// The trigram embedder is never picked implicitly: it cannot match a query
/// to a passage in another language.
fn resolve_embedder_kind(
    requested: Option<EmbedderKind>,
    embedding_url: Option<&str>,
) -> anyhow::Result<EmbedderKind> {
    match (requested, embedding_url) {
        (Some(EmbedderKind::Http), None) => {
            anyhow::bail!("--embedding-provider http needs --embedding-url or EMBEDDING_URL")
        }
        (Some(kind), _) => Ok(kind),
        (None, Some(_)) => Ok(EmbedderKind::Http),
        (None, None) if cfg!(feature = "local-embeddings-fastembed") => Ok(EmbedderKind::Local),
        (None, None) => anyhow::bail!(
            "no embedding backend configured: set EMBEDDING_URL, build with \
             --features local-embeddings-fastembed, or opt into the non-multilingual \
             fallback with --embedding-provider trigram"
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
async fn build_local_embedder(
    model: Option<String>,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let model = model.unwrap_or_else(|| pdf_rag_core::DEFAULT_LOCAL_MODEL.to_string());
    info!(model = %model, "loading local embedding model");
    let embedder =
        tokio::task::spawn_blocking(move || pdf_rag_core::FastembedEmbedder::new(&model))
            .await??;
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "local-embeddings-fastembed"))]
async fn build_local_embedder(
    _model: Option<String>,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    anyhow::bail!("local embeddings require building with --features local-embeddings-fastembed")
}

async fn build_embedder(cli: &Cli) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let kind = resolve_embedder_kind(cli.embedding_provider, cli.embedding_url.as_deref())?;
    match kind {
        EmbedderKind::Http => {
            let endpoint = cli
                .embedding_url
                .clone()
                .context("EMBEDDING_URL is required for the http embedder")?;
            let embedder = HttpEmbedder::new(HttpEmbedderConfig {
                endpoint,
                model: cli
                    .embedding_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_HTTP_MODEL.to_string()),
                dimensions: cli.embedding_dimensions,
                api_key: cli.embedding_api_key.clone(),
                timeout: Duration::from_secs(30),
                max_retries: 3,
            })?;
            Ok(Arc::new(embedder))
        }
        EmbedderKind::Local => build_local_embedder(cli.embedding_model.clone()).await,
        EmbedderKind::Trigram => {
            warn!("using trigram embedder, queries will not match passages in other languages");
            Ok(Arc::new(CharacterNgramEmbedder {
                dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            }))
        }
    }
}

async fn build_engine(cli: &Cli) -> anyhow::Result<RetrievalEngine> {
    let embedder = build_embedder(cli).await?;

    let index = QdrantStore::new(&cli.qdrant_url, &cli.qdrant_collection, embedder.dimensions())?
        .with_api_key(cli.qdrant_api_key.clone());
    let store: Arc<dyn DocumentStore> = Arc::new(
        FileDocumentStore::open(&cli.document_store_path)
            .await
            .with_context(|| format!("opening {}", cli.document_store_path.display()))?,
    );
    let generator: Arc<dyn AnswerGenerator> = Arc::new(GeminiGenerator::new(GeminiConfig {
        api_key: cli.google_api_key.clone(),
        model: cli.gemini_model.clone(),
        ..GeminiConfig::default()
    })?);

    let config = RetrievalConfig {
        similarity_threshold: cli.similarity_threshold,
        ..RetrievalConfig::default()
    };

    let engine = RetrievalEngine::builder(store, Arc::new(index), embedder, generator)
        .config(config)
        .build()
        .await?;
    Ok(engine)
}

async fn ingest(engine: &RetrievalEngine, path: &Path) -> anyhow::Result<()> {
    let files = resolve_inputs(path)?;
    info!(path = %path.display(), file_count = files.len(), "ingesting");

    let mut skipped = 0usize;
    for file in files {
        let upload = match read_upload(&file).await {
            Ok(upload) => upload,
            Err(error) => {
                warn!(path = %file.display(), %error, "skipped pdf");
                skipped += 1;
                continue;
            }
        };

        match engine.ingest(upload.bytes, &upload.filename).await {
            Ok(document) if document.status.is_terminal() => {
                println!(
                    "{} already ingested as {} ({})",
                    upload.filename, document.id, document.status
                );
            }
            Ok(document) => {
                info!(document_id = %document.id, filename = %upload.filename, "queued")
            }
            Err(error) => {
                warn!(path = %upload.path.display(), %error, "skipped pdf");
                skipped += 1;
            }
        }
    }

    let outcomes = engine.wait_for_all().await;
    for outcome in &outcomes {
        match outcome.status {
            ProcessingStatus::Completed => println!(
                "{} completed with {} chunks",
                outcome.document_id, outcome.chunk_count
            ),
            _ => println!(
                "{} {}: {}",
                outcome.document_id,
                outcome.status,
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    let failed = outcomes
        .iter()
        .filter(|outcome| outcome.status == ProcessingStatus::Failed)
        .count();
    println!(
        "{} documents processed, {} failed, {} skipped at {}",
        outcomes.len(),
        failed,
        skipped,
        Utc::now().to_rfc3339()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let engine = build_engine(&cli).await?;
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    match &cli.command {
        Command::Ingest { path } => ingest(&engine, path).await?,
        Command::Query { text, limit } => {
            let answer = engine.query(text, *limit).await?;

            println!("{}", answer.content);
            println!("confidence={:.2}", answer.confidence);
            for (position, source) in answer.sources.iter().enumerate() {
                println!(
                    "[{}] document_id={} page={} similarity={:.4} language={}",
                    position + 1,
                    source.document_id,
                    source.page_number,
                    source.similarity_score,
                    source.language
                );
                println!("  {}", source.text);
            }
        }
        Command::Delete { document_id } => {
            let report = engine.delete_document(document_id).await?;
            if !report.document_removed && report.chunk_ids.is_empty() {
                println!("document {document_id} not found");
            } else {
                println!(
                    "deleted {}: chunk_rows={} vectors={}",
                    report.document_id, report.chunk_rows_removed, report.vectors_removed
                );
            }
            if !report.is_reconciled() {
                println!(
                    "warning: expected {} chunks, removed {} rows and {} vectors ({} stray)",
                    report.chunk_ids.len(),
                    report.chunk_rows_removed,
                    report.vectors_removed,
                    report.stray_vectors_removed
                );
            }
        }
        Command::List => {
            let documents = engine.list_documents().await?;
            if documents.is_empty() {
                println!("no documents");
            }
            for document in documents {
                println!(
                    "{} {} status={} pages={} chunks={} language={} uploaded_at={}",
                    document.id,
                    document.filename,
                    document.status,
                    document.page_count,
                    document.chunk_count,
                    document.language,
                    document.uploaded_at.to_rfc3339()
                );
            }
        }
    }

    Ok(())
}
