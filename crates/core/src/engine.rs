//! Ingestion and retrieval over the injected stores.
//!
//! `RetrievalEngine` owns no global state: every backend arrives as a trait
//! object through [`EngineBuilder`]. Ingestion returns as soon as a pending
//! record exists; the heavy work runs on the [`IngestionQueue`] and its
//! outcome lands in the document status.

use crate::chunking::SemanticChunker;
use crate::config::RetrievalConfig;
use crate::embeddings::{check_dimensions, EmbeddingProvider};
use crate::error::{
    DeletionError, EmbeddingError, ExtractionError, GenerationError, IngestionError,
    PipelineError, QueryError, RetrievalError, SetupError, StoreError,
};
use crate::extractor::{LopdfExtractor, TextExtractor};
use crate::generation::{build_prompt, INSUFFICIENT_INFORMATION, SYSTEM_INSTRUCTIONS};
use crate::hashing::fingerprint;
use crate::language::{detect_or_default, LanguageDetector, WhatlangDetector};
use crate::models::{
    Chunk, DeletionReport, Document, GeneratedAnswer, IndexPoint, ProcessingStatus,
    RetrievedMatch, SourceSummary,
};
use crate::queue::{IngestionOutcome, IngestionQueue, TaskState};
use crate::traits::{AnswerGenerator, DocumentStore, VectorIndex};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Characters of extracted text used for document-level language detection.
const LANGUAGE_SAMPLE_CHARS: usize = 1000;

pub struct EngineBuilder {
    config: RetrievalConfig,
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn AnswerGenerator>,
    extractor: Arc<dyn TextExtractor>,
    detector: Arc<dyn LanguageDetector>,
}

impl EngineBuilder {
    pub fn config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Validates the config and makes sure the vector collection exists with
    /// the embedder's dimensionality.
    pub async fn build(self) -> Result<RetrievalEngine, SetupError> {
        self.config.validate()?;
        let chunker = SemanticChunker::new(&self.config, Arc::clone(&self.detector))?;

        self.index
            .ensure_collection(self.embedder.dimensions())
            .await?;

        info!(
            model = self.embedder.model_name(),
            dimensions = self.embedder.dimensions(),
            threshold = self.config.similarity_threshold,
            "retrieval engine ready"
        );

        let queue = IngestionQueue::new(self.config.max_concurrent_ingestions);
        Ok(RetrievalEngine {
            pipeline: Arc::new(Pipeline {
                config: self.config,
                store: self.store,
                index: self.index,
                embedder: self.embedder,
                extractor: self.extractor,
                detector: self.detector,
                chunker,
            }),
            generator: self.generator,
            queue,
            admission: Mutex::new(()),
        })
    }
}

pub struct RetrievalEngine {
    pipeline: Arc<Pipeline>,
    generator: Arc<dyn AnswerGenerator>,
    queue: IngestionQueue,
    /// Serialises the lookup, insert and submit steps of `ingest`.
    admission: Mutex<()>,
}

impl RetrievalEngine {
    pub fn builder(
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> EngineBuilder {
        EngineBuilder {
            config: RetrievalConfig::default(),
            store,
            index,
            embedder,
            generator,
            extractor: Arc::new(LopdfExtractor),
            detector: Arc::new(WhatlangDetector::default()),
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.pipeline.config
    }

    /// Registers an upload and queues its processing.
    ///
    /// Identical bytes resolve to the document already on record, unless
    /// that document failed or is orphaned: still pending or processing
    /// with no task in this engine, e.g. after an interrupted run. Those
    /// are purged and processed again. The returned document reflects the
    /// state at return time, normally `Pending`.
    pub async fn ingest(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<Document, IngestionError> {
        if bytes.is_empty() {
            return Err(IngestionError::EmptyUpload(filename.to_string()));
        }

        let store = &self.pipeline.store;
        let fingerprint = fingerprint(&bytes);
        let _admission = self.admission.lock().await;

        if let Some(existing) = store.find_by_fingerprint(&fingerprint).await? {
            let orphaned = !existing.status.is_terminal()
                && self.queue.state(&existing.id).await.is_none();

            if existing.status != ProcessingStatus::Failed && !orphaned {
                info!(
                    document_id = %existing.id,
                    %fingerprint,
                    status = %existing.status,
                    "upload matches existing document"
                );
                return Ok(existing);
            }

            warn!(
                document_id = %existing.id,
                %fingerprint,
                status = %existing.status,
                "reprocessing document"
            );
            self.delete_document(&existing.id).await?;
        }

        let document = Document::pending(
            filename,
            fingerprint.clone(),
            self.pipeline.config.default_language.clone(),
        );

        match store.insert(&document).await {
            Ok(()) => {}
            Err(StoreError::DuplicateFingerprint(_)) => {
                // Lost a race against a concurrent upload of the same bytes.
                return store
                    .find_by_fingerprint(&fingerprint)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(fingerprint.to_string()).into());
            }
            Err(error) => return Err(error.into()),
        }

        info!(document_id = %document.id, filename, %fingerprint, "document queued");

        let pipeline = Arc::clone(&self.pipeline);
        let document_id = document.id.clone();
        self.queue
            .submit(&document.id, async move {
                pipeline.run(&document_id, bytes).await
            })
            .await;

        Ok(document)
    }

    /// Matches at or above `threshold`, best first, at most `limit` of them.
    pub async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievedMatch>, RetrievalError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }
        if limit == 0 {
            return Err(RetrievalError::ZeroLimit);
        }

        let pipeline = &self.pipeline;
        let vector = pipeline.embedder.embed(query).await?;
        check_dimensions(&vector, pipeline.embedder.dimensions())?;

        let fetch = limit.saturating_mul(pipeline.config.overfetch_factor);
        let mut hits = pipeline.index.search(&vector, fetch).await?;
        hits.sort_by(|left, right| right.score.total_cmp(&left.score));

        let fetched = hits.len();
        let matches: Vec<RetrievedMatch> = hits
            .into_iter()
            .filter(|hit| hit.score >= threshold)
            .take(limit)
            .map(RetrievedMatch::from)
            .collect();

        debug!(
            fetched,
            kept = matches.len(),
            threshold,
            "similarity search finished"
        );
        Ok(matches)
    }

    /// Asks the generator only when there is something to ground the answer
    /// in.
    pub async fn answer(
        &self,
        query: &str,
        matches: &[RetrievedMatch],
    ) -> Result<GeneratedAnswer, GenerationError> {
        let config = &self.pipeline.config;

        if matches.is_empty() {
            return Ok(GeneratedAnswer {
                content: INSUFFICIENT_INFORMATION.to_string(),
                sources: Vec::new(),
                confidence: config.insufficient_confidence,
                is_complete: true,
            });
        }

        let context = build_context(matches);
        let content = self
            .generator
            .generate(SYSTEM_INSTRUCTIONS, &build_prompt(&context, query))
            .await?;

        Ok(GeneratedAnswer {
            content,
            sources: matches
                .iter()
                .map(|matched| SourceSummary::from_match(matched, config.excerpt_chars))
                .collect(),
            confidence: config.answer_confidence,
            is_complete: true,
        })
    }

    /// `retrieve` with the configured threshold, then `answer`.
    pub async fn query(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<GeneratedAnswer, QueryError> {
        let config = &self.pipeline.config;
        let matches = self
            .retrieve(
                query,
                limit.unwrap_or(config.default_limit),
                config.similarity_threshold,
            )
            .await?;
        Ok(self.answer(query, &matches).await?)
    }

    /// Removes a document from both stores.
    ///
    /// Vectors are deleted by the chunk ids on record, then any vector still
    /// tagged with the document is swept by filter. The report makes drift
    /// between the two stores visible instead of hiding it.
    pub async fn delete_document(
        &self,
        document_id: &str,
    ) -> Result<DeletionReport, DeletionError> {
        let store = &self.pipeline.store;
        let index = &self.pipeline.index;

        let chunk_ids = store.find_chunk_ids_by_document(document_id).await?;
        let chunk_rows_removed = store.delete_chunks_by_document(document_id).await?;
        let document_removed = store.delete_document(document_id).await?;
        let vectors_removed = index.delete_by_ids(&chunk_ids).await?;
        let stray_vectors_removed = index.delete_by_document(document_id).await?;

        self.queue.forget(document_id).await;

        let report = DeletionReport {
            document_id: document_id.to_string(),
            document_removed,
            chunk_ids,
            chunk_rows_removed,
            vectors_removed,
            stray_vectors_removed,
        };

        if report.is_reconciled() {
            info!(
                document_id,
                document_removed,
                vectors_removed,
                "document deleted"
            );
        } else {
            warn!(
                document_id,
                expected = report.chunk_ids.len(),
                chunk_rows_removed,
                vectors_removed,
                stray_vectors_removed,
                "document deletion counts do not reconcile"
            );
        }

        Ok(report)
    }

    pub async fn document(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        self.pipeline.store.get(document_id).await
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        self.pipeline.store.list().await
    }

    pub async fn chunks(&self, document_id: &str) -> Result<Vec<Chunk>, StoreError> {
        self.pipeline.store.chunks_by_document(document_id).await
    }

    pub async fn ingestion_status(&self, document_id: &str) -> Option<TaskState> {
        self.queue.state(document_id).await
    }

    pub async fn wait_for_ingestion(&self, document_id: &str) -> Option<IngestionOutcome> {
        self.queue.wait(document_id).await
    }

    pub async fn wait_for_all(&self) -> Vec<IngestionOutcome> {
        self.queue.wait_all().await
    }
}

/// Numbered context block in ranked order.
pub fn build_context(matches: &[RetrievedMatch]) -> String {
    matches
        .iter()
        .enumerate()
        .map(|(position, matched)| {
            format!(
                "Source {} (Page {}, Similarity: {:.2}):\n{}\n",
                position + 1,
                matched.page_number,
                matched.score,
                matched.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Everything a background ingestion needs, shared with the queued tasks.
struct Pipeline {
    config: RetrievalConfig,
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn TextExtractor>,
    detector: Arc<dyn LanguageDetector>,
    chunker: SemanticChunker,
}

/// What a failed run already wrote and has to take back.
#[derive(Default)]
struct Written {
    vector_ids: Vec<String>,
    chunk_rows: bool,
}

impl Pipeline {
    async fn run(&self, document_id: &str, bytes: Vec<u8>) -> IngestionOutcome {
        let mut written = Written::default();

        match self.process(document_id, bytes, &mut written).await {
            Ok(chunk_count) => {
                info!(document_id, chunk_count, "document ingested");
                IngestionOutcome::completed(document_id, chunk_count)
            }
            Err(failure) => {
                error!(document_id, error = %failure, "document ingestion failed");
                self.compensate(document_id, &written).await;

                if let Err(status_error) = self
                    .store
                    .update_status(document_id, ProcessingStatus::Failed, Some(0))
                    .await
                {
                    error!(document_id, error = %status_error, "could not mark document failed");
                }
                IngestionOutcome::failed(document_id, failure)
            }
        }
    }

    async fn process(
        &self,
        document_id: &str,
        bytes: Vec<u8>,
        written: &mut Written,
    ) -> Result<u64, PipelineError> {
        self.store
            .update_status(document_id, ProcessingStatus::Processing, None)
            .await?;

        let extractor = Arc::clone(&self.extractor);
        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&bytes))
            .await
            .map_err(|error| ExtractionError::Task(error.to_string()))??;

        let content = extracted.joined();
        let sample: String = content.chars().take(LANGUAGE_SAMPLE_CHARS).collect();
        let language =
            detect_or_default(self.detector.as_ref(), &sample, &self.config.default_language);
        self.store
            .record_extraction(document_id, &content, extracted.page_count, &language)
            .await?;
        info!(
            document_id,
            page_count = extracted.page_count,
            %language,
            "text extracted"
        );

        let mut chunks = self.chunker.chunk_document(document_id, &extracted.pages);
        self.embed_chunks(&mut chunks).await?;

        let points = chunks
            .iter()
            .map(IndexPoint::from_chunk)
            .collect::<Result<Vec<_>, _>>()?;
        written.vector_ids = points.iter().map(|point| point.id.clone()).collect();
        self.index.upsert(&points).await?;

        written.chunk_rows = true;
        self.store.insert_chunks(&chunks).await?;

        let chunk_count = chunks.len() as u64;
        self.store
            .update_status(document_id, ProcessingStatus::Completed, Some(chunk_count))
            .await?;
        Ok(chunk_count)
    }

    async fn embed_chunks(&self, chunks: &mut [Chunk]) -> Result<(), EmbeddingError> {
        let dimensions = self.embedder.dimensions();

        for batch in chunks.chunks_mut(self.config.embedding_batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    actual: vectors.len(),
                });
            }

            for (chunk, vector) in batch.iter_mut().zip(vectors) {
                check_dimensions(&vector, dimensions)?;
                chunk.embedding = Some(vector);
            }
            debug!(batch = texts.len(), "chunk batch embedded");
        }
        Ok(())
    }

    async fn compensate(&self, document_id: &str, written: &Written) {
        if !written.vector_ids.is_empty() {
            match self.index.delete_by_ids(&written.vector_ids).await {
                Ok(removed) => debug!(document_id, removed, "rolled back vectors"),
                Err(error) => warn!(document_id, %error, "could not roll back vectors"),
            }
        }

        if written.chunk_rows {
            match self.store.delete_chunks_by_document(document_id).await {
                Ok(removed) => debug!(document_id, removed, "rolled back chunk rows"),
                Err(error) => warn!(document_id, %error, "could not roll back chunk rows"),
            }
        }
    }
}
