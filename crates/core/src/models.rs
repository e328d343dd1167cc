use crate::error::IndexError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SHA-256 of the raw upload bytes, lowercase hex.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ISO 639-1 code such as `en` or `de`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LanguageCode {
    fn default() -> Self {
        Self::new("en")
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub content: String,
    pub page_count: u32,
    pub language: LanguageCode,
    pub fingerprint: Fingerprint,
    pub uploaded_at: DateTime<Utc>,
    pub status: ProcessingStatus,
    pub chunk_count: u64,
}

impl Document {
    /// A freshly uploaded document; content, page count and language are
    /// filled once background extraction succeeds.
    pub fn pending(
        filename: impl Into<String>,
        fingerprint: Fingerprint,
        language: LanguageCode,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            filename: filename.into(),
            content: String::new(),
            page_count: 0,
            language,
            fingerprint,
            uploaded_at: Utc::now(),
            status: ProcessingStatus::Pending,
            chunk_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub page_number: u32,
    pub chunk_index: u64,
    pub language: LanguageCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Payload stored next to every vector. Retrieval rebuilds matches from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointPayload {
    pub text: String,
    pub document_id: String,
    pub page_number: u32,
    pub chunk_index: u64,
    pub language: LanguageCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

impl IndexPoint {
    /// The only way to build a point for an index write.
    pub fn from_chunk(chunk: &Chunk) -> Result<Self, IndexError> {
        let vector = chunk
            .embedding
            .clone()
            .ok_or_else(|| IndexError::MissingEmbedding(chunk.id.clone()))?;

        Ok(Self {
            id: chunk.id.clone(),
            vector,
            payload: PointPayload {
                text: chunk.text.clone(),
                document_id: chunk.document_id.clone(),
                page_number: chunk.page_number,
                chunk_index: chunk.chunk_index,
                language: chunk.language.clone(),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: PointPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedMatch {
    pub chunk_id: String,
    pub text: String,
    pub document_id: String,
    pub page_number: u32,
    pub chunk_index: u64,
    pub score: f32,
    pub language: LanguageCode,
}

impl From<ScoredPoint> for RetrievedMatch {
    fn from(point: ScoredPoint) -> Self {
        Self {
            chunk_id: point.id,
            text: point.payload.text,
            document_id: point.payload.document_id,
            page_number: point.payload.page_number,
            chunk_index: point.payload.chunk_index,
            score: point.score,
            language: point.payload.language,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceSummary {
    pub text: String,
    pub document_id: String,
    pub page_number: u32,
    pub similarity_score: f32,
    pub language: LanguageCode,
}

impl SourceSummary {
    pub fn from_match(matched: &RetrievedMatch, excerpt_chars: usize) -> Self {
        let text = if matched.text.chars().count() > excerpt_chars {
            let excerpt: String = matched.text.chars().take(excerpt_chars).collect();
            format!("{excerpt}...")
        } else {
            matched.text.clone()
        };

        Self {
            text,
            document_id: matched.document_id.clone(),
            page_number: matched.page_number,
            similarity_score: matched.score,
            language: matched.language.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedAnswer {
    pub content: String,
    pub sources: Vec<SourceSummary>,
    pub confidence: f32,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of a conversation. Persisting it is the message store's job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    pub sources: Vec<SourceSummary>,
    pub confidence: f32,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: Vec::new(),
            confidence: 0.0,
        }
    }

    pub fn from_answer(answer: GeneratedAnswer) -> Self {
        Self {
            role: Role::Assistant,
            content: answer.content,
            sources: answer.sources,
            confidence: answer.confidence,
        }
    }
}

/// Outcome of `delete_document`. Counts are reported so drift between the
/// metadata store and the vector index is visible to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub document_id: String,
    pub document_removed: bool,
    pub chunk_ids: Vec<String>,
    pub chunk_rows_removed: usize,
    pub vectors_removed: usize,
    /// Vectors still tagged with the document after the id-based delete.
    pub stray_vectors_removed: usize,
}

impl DeletionReport {
    pub fn is_reconciled(&self) -> bool {
        self.chunk_rows_removed == self.chunk_ids.len()
            && self.vectors_removed == self.chunk_ids.len()
            && self.stray_vectors_removed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk(embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: "chunk-1".to_string(),
            document_id: "doc-1".to_string(),
            text: "Neural networks learn representations from data.".to_string(),
            page_number: 3,
            chunk_index: 7,
            language: LanguageCode::new("en"),
            embedding,
        }
    }

    #[test]
    fn point_requires_embedding() {
        let error = IndexPoint::from_chunk(&sample_chunk(None)).unwrap_err();
        assert!(matches!(error, IndexError::MissingEmbedding(id) if id == "chunk-1"));
    }

    #[test]
    fn point_payload_mirrors_chunk() {
        let point = IndexPoint::from_chunk(&sample_chunk(Some(vec![1.0, 0.0]))).unwrap();
        assert_eq!(point.id, "chunk-1");
        assert_eq!(point.payload.document_id, "doc-1");
        assert_eq!(point.payload.page_number, 3);
        assert_eq!(point.payload.chunk_index, 7);

        let json = serde_json::to_value(&point.payload).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(
            keys,
            vec!["chunk_index", "document_id", "language", "page_number", "text"]
        );
    }

    #[test]
    fn source_excerpt_is_truncated_on_char_boundary() {
        let matched = RetrievedMatch {
            chunk_id: "c".to_string(),
            text: "é".repeat(250),
            document_id: "d".to_string(),
            page_number: 1,
            chunk_index: 0,
            score: 0.9,
            language: LanguageCode::new("fr"),
        };
        let summary = SourceSummary::from_match(&matched, 200);
        assert!(summary.text.ends_with("..."));
        assert_eq!(summary.text.chars().count(), 203);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ProcessingStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        assert!(ProcessingStatus::Failed.is_terminal());
        assert!(!ProcessingStatus::Processing.is_terminal());
    }

    #[test]
    fn chat_turns_carry_question_and_grounded_answer() {
        let question = ChatTurn::user("Was ist maschinelles Lernen?");
        assert_eq!(question.role, Role::User);
        assert!(question.sources.is_empty());
        assert_eq!(question.confidence, 0.0);

        let source = SourceSummary {
            text: "Machine learning is a branch of AI.".to_string(),
            document_id: "doc-1".to_string(),
            page_number: 2,
            similarity_score: 0.82,
            language: LanguageCode::new("en"),
        };
        let reply = ChatTurn::from_answer(GeneratedAnswer {
            content: "Maschinelles Lernen ist ein Teilgebiet der KI.".to_string(),
            sources: vec![source.clone()],
            confidence: 0.82,
            is_complete: true,
        });
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.sources, vec![source]);
        assert_eq!(reply.confidence, 0.82);

        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["role"], "assistant");
    }
}
