use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("pdf had no readable page text ({page_count} pages)")]
    NoReadableText { page_count: u32 },

    #[error("extraction task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DetectionError {
    #[error("text too short to classify: {chars} chars")]
    TooShort { chars: usize },

    #[error("language is ambiguous")]
    Ambiguous,
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("embedding dimension {actual} != {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding count {actual} doesn't match input count {expected}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding request failed after {attempts} attempts: {details}")]
    RetriesExhausted { attempts: u32, details: String },

    #[error("local embedding model error: {0}")]
    LocalModel(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("vector dimension {actual} != collection dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("chunk {0} has no embedding")]
    MissingEmbedding(String),

    #[error("collection not ready: {0}")]
    NotReady(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("a document with fingerprint {0} already exists")]
    DuplicateFingerprint(String),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generator not configured: {0}")]
    NotConfigured(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },
}

/// Raised synchronously by `ingest`, before any background work is queued.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("upload {0} is empty")]
    EmptyUpload(String),

    #[error("no pdf files found in {0}")]
    NoPdfFiles(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document store error: {0}")]
    Store(#[from] StoreError),

    #[error("vector index error: {0}")]
    Index(#[from] IndexError),

    #[error("could not purge failed document: {0}")]
    Purge(#[from] DeletionError),
}

/// Failure inside the background unit of work. Recorded as document status.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("limit must be greater than zero")]
    ZeroLimit,

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Error)]
pub enum DeletionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid paragraph delimiter: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Index(#[from] IndexError),
}
