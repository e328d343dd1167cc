pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod hashing;
pub mod ingest;
pub mod language;
pub mod models;
pub mod queue;
pub mod stores;
pub mod traits;

pub use chunking::{normalize_whitespace, split_passages, ChunkingConfig, SemanticChunker};
pub use config::RetrievalConfig;
pub use embeddings::{
    cosine_similarity, CharacterNgramEmbedder, EmbeddingProvider, HttpEmbedder,
    HttpEmbedderConfig, DEFAULT_EMBEDDING_DIMENSIONS,
};
#[cfg(feature = "local-embeddings-fastembed")]
pub use embeddings::{FastembedEmbedder, DEFAULT_LOCAL_MODEL};
pub use engine::{build_context, EngineBuilder, RetrievalEngine};
pub use error::{
    ConfigError, DeletionError, DetectionError, EmbeddingError, ExtractionError,
    GenerationError, IndexError, IngestionError, PipelineError, QueryError, RetrievalError,
    SetupError, StoreError,
};
pub use extractor::{ExtractedText, LopdfExtractor, PageText, TextExtractor};
pub use generation::{GeminiConfig, GeminiGenerator};
pub use hashing::fingerprint;
pub use ingest::{discover_pdf_files, read_upload, resolve_inputs, Upload};
pub use language::{detect_or_default, LanguageDetector, WhatlangDetector};
pub use models::{
    ChatTurn, Chunk, DeletionReport, Document, Fingerprint, GeneratedAnswer, IndexPoint,
    LanguageCode, PointPayload, ProcessingStatus, RetrievedMatch, Role, ScoredPoint,
    SourceSummary,
};
pub use queue::{IngestionOutcome, IngestionQueue, TaskState};
pub use stores::{FileDocumentStore, InMemoryDocumentStore, InMemoryVectorIndex, QdrantStore};
pub use traits::{AnswerGenerator, DocumentStore, VectorIndex};
