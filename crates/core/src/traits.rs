use crate::error::{GenerationError, IndexError, StoreError};
use crate::models::{
    Chunk, Document, Fingerprint, IndexPoint, LanguageCode, ProcessingStatus, ScoredPoint,
};
use async_trait::async_trait;

/// Nearest-neighbour capability over `(vector, payload)` points, cosine
/// distance throughout.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotent. Fails if the collection exists with another dimension.
    async fn ensure_collection(&self, dimension: usize) -> Result<(), IndexError>;

    async fn upsert(&self, points: &[IndexPoint]) -> Result<(), IndexError>;

    /// Ordered by descending similarity.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>, IndexError>;

    /// Returns how many of `ids` were present before the delete.
    async fn delete_by_ids(&self, ids: &[String]) -> Result<usize, IndexError>;

    /// Filter-based delete on the `document_id` payload field. Not the
    /// correctness path for document deletion; see `delete_by_ids`.
    async fn delete_by_document(&self, document_id: &str) -> Result<usize, IndexError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Document>, StoreError>;

    /// Fails with `DuplicateFingerprint` when the fingerprint is taken.
    async fn insert(&self, document: &Document) -> Result<(), StoreError>;

    async fn update_status(
        &self,
        id: &str,
        status: ProcessingStatus,
        chunk_count: Option<u64>,
    ) -> Result<(), StoreError>;

    async fn record_extraction(
        &self,
        id: &str,
        content: &str,
        page_count: u32,
        language: &LanguageCode,
    ) -> Result<(), StoreError>;

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), StoreError>;

    async fn find_chunk_ids_by_document(&self, id: &str) -> Result<Vec<String>, StoreError>;

    async fn chunks_by_document(&self, id: &str) -> Result<Vec<Chunk>, StoreError>;

    /// Returns whether a document row was removed.
    async fn delete_document(&self, id: &str) -> Result<bool, StoreError>;

    /// Returns the number of chunk rows removed.
    async fn delete_chunks_by_document(&self, id: &str) -> Result<usize, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// Newest upload first.
    async fn list(&self) -> Result<Vec<Document>, StoreError>;
}

/// Opaque single-shot text completion.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(
        &self,
        system_instructions: &str,
        context_prompt: &str,
    ) -> Result<String, GenerationError>;
}
