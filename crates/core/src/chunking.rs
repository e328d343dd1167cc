use crate::config::RetrievalConfig;
use crate::extractor::PageText;
use crate::language::{detect_or_default, LanguageDetector};
use crate::models::{Chunk, LanguageCode};
use regex::Regex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
}

impl From<&RetrievalConfig> for ChunkingConfig {
    fn from(value: &RetrievalConfig) -> Self {
        Self {
            max_chars: value.max_chunk_chars,
            overlap_chars: value.chunk_overlap_chars,
            min_chars: value.min_chunk_chars,
        }
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits one page into passages on `delimiter`, normalizes each passage,
/// windows oversized ones and drops everything shorter than `min_chars`.
pub fn split_passages(page_text: &str, delimiter: &Regex, config: ChunkingConfig) -> Vec<String> {
    delimiter
        .split(page_text)
        .map(normalize_whitespace)
        .flat_map(|passage| window(passage, config))
        .filter(|passage| passage.chars().count() >= config.min_chars)
        .collect()
}

fn window(passage: String, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = passage.chars().collect();
    if chars.len() <= config.max_chars {
        return vec![passage];
    }

    let step = config.max_chars.saturating_sub(config.overlap_chars).max(1);
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.max_chars).min(chars.len());
        pieces.push(chars[start..end].iter().collect::<String>());
        if end == chars.len() {
            break;
        }
        start = start.saturating_add(step);
    }

    pieces
}

/// Turns a document's page texts into ordered chunks. Ordinals run across
/// the whole document; language is detected per chunk. Embeddings are left
/// empty.
pub struct SemanticChunker {
    config: ChunkingConfig,
    delimiter: Regex,
    detector: Arc<dyn LanguageDetector>,
    default_language: LanguageCode,
}

impl SemanticChunker {
    pub fn new(
        config: &RetrievalConfig,
        detector: Arc<dyn LanguageDetector>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            config: ChunkingConfig::from(config),
            delimiter: Regex::new(config.paragraph_delimiter)?,
            detector,
            default_language: config.default_language.clone(),
        })
    }

    pub fn chunk_document(&self, document_id: &str, pages: &[PageText]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for page in pages {
            for passage in split_passages(&page.text, &self.delimiter, self.config) {
                let language =
                    detect_or_default(self.detector.as_ref(), &passage, &self.default_language);

                chunks.push(Chunk {
                    id: uuid::Uuid::new_v4().to_string(),
                    document_id: document_id.to_string(),
                    text: passage,
                    page_number: page.number,
                    chunk_index: chunks.len() as u64,
                    language,
                    embedding: None,
                });
            }
        }

        tracing::debug!(document_id, chunk_count = chunks.len(), "document chunked");
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectionError;
    use crate::language::LanguageDetector;

    struct ConjunctionDetector;

    impl LanguageDetector for ConjunctionDetector {
        fn detect(&self, text: &str) -> Result<LanguageCode, DetectionError> {
            if text.contains(" und ") {
                Ok(LanguageCode::new("de"))
            } else if text.contains(" and ") {
                Ok(LanguageCode::new("en"))
            } else {
                Err(DetectionError::Ambiguous)
            }
        }
    }

    fn chunker(config: &RetrievalConfig) -> SemanticChunker {
        SemanticChunker::new(config, Arc::new(ConjunctionDetector))
            .expect("default delimiter should compile")
    }

    fn page(number: u32, text: &str) -> PageText {
        PageText {
            number,
            text: text.to_string(),
        }
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof \u{a0}  spacing";
        assert_eq!(normalize_whitespace(input), "A lot of spacing");
    }

    #[test]
    fn ordinals_are_global_and_contiguous() {
        let config = RetrievalConfig::default();
        let pages = vec![
            page(
                1,
                "Machine learning is a field of study that gives computers the ability to learn.\n\n\
                 Neural networks are composed of layers of interconnected artificial neurons.",
            ),
            page(
                2,
                "Training adjusts the weights of the network to minimise the loss on the data set.",
            ),
        ];

        let chunks = chunker(&config).chunk_document("doc-1", &pages);

        assert_eq!(chunks.len(), 3);
        let ordinals: Vec<u64> = chunks.iter().map(|chunk| chunk.chunk_index).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        let page_numbers: Vec<u32> = chunks.iter().map(|chunk| chunk.page_number).collect();
        assert_eq!(page_numbers, vec![1, 1, 2]);
        assert!(chunks.iter().all(|chunk| chunk.embedding.is_none()));
        assert!(chunks.iter().all(|chunk| chunk.document_id == "doc-1"));
    }

    #[test]
    fn short_passages_are_discarded() {
        let config = RetrievalConfig::default();
        let pages = vec![page(
            1,
            "Header\n\n\
             The transformer architecture relies on attention rather than recurrence.\n\n\
             12",
        )];

        let chunks = chunker(&config).chunk_document("doc-1", &pages);

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.starts_with("The transformer"));
    }

    #[test]
    fn page_without_passages_contributes_nothing() {
        let config = RetrievalConfig::default();
        let pages = vec![
            page(1, "tiny\n\nbits"),
            page(2, "A long enough paragraph about gradient descent and how it converges."),
        ];

        let chunks = chunker(&config).chunk_document("doc-1", &pages);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page_number, 2);
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn language_is_detected_per_chunk() {
        let config = RetrievalConfig::default();
        let pages = vec![page(
            1,
            "The model is trained on the data and the results are evaluated with care.\n\n\
             Das Modell wird mit den Daten trainiert und die Ergebnisse sind nicht schlecht.",
        )];

        let chunks = chunker(&config).chunk_document("doc-1", &pages);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].language.as_str(), "en");
        assert_eq!(chunks[1].language.as_str(), "de");
    }

    #[test]
    fn oversized_passages_are_windowed_with_overlap() {
        let config = RetrievalConfig {
            min_chunk_chars: 5,
            max_chunk_chars: 20,
            chunk_overlap_chars: 5,
            ..RetrievalConfig::default()
        };
        let delimiter = Regex::new(config.paragraph_delimiter).unwrap();
        let text = "abcdefghijklmnopqrstuvwxyz0123456789";

        let pieces = split_passages(text, &delimiter, ChunkingConfig::from(&config));

        assert_eq!(
            pieces,
            vec!["abcdefghijklmnopqrst", "pqrstuvwxyz012345678", "456789"]
        );
        assert!(pieces.iter().all(|piece| piece.chars().count() <= 20));
    }
}
