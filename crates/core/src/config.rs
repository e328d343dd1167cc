use crate::error::ConfigError;
use crate::models::LanguageCode;

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Minimum cosine similarity for a match to count as relevant.
    pub similarity_threshold: f32,
    pub default_limit: usize,
    /// The index is asked for `limit * overfetch_factor` candidates before
    /// threshold filtering.
    pub overfetch_factor: usize,
    /// Pattern separating passages inside one page.
    pub paragraph_delimiter: &'static str,
    pub min_chunk_chars: usize,
    pub max_chunk_chars: usize,
    pub chunk_overlap_chars: usize,
    pub embedding_batch_size: usize,
    pub default_language: LanguageCode,
    pub max_concurrent_ingestions: usize,
    pub insufficient_confidence: f32,
    pub answer_confidence: f32,
    pub excerpt_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.3,
            default_limit: 5,
            overfetch_factor: 2,
            paragraph_delimiter: r"\n\s*\n",
            min_chunk_chars: 50,
            max_chunk_chars: 2_000,
            chunk_overlap_chars: 200,
            embedding_batch_size: 32,
            default_language: LanguageCode::new("en"),
            max_concurrent_ingestions: 4,
            insufficient_confidence: 0.1,
            answer_confidence: 0.8,
            excerpt_chars: 200,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::Invalid(format!(
                "similarity_threshold {} is outside [-1, 1]",
                self.similarity_threshold
            )));
        }

        let positive = [
            ("default_limit", self.default_limit),
            ("overfetch_factor", self.overfetch_factor),
            ("max_chunk_chars", self.max_chunk_chars),
            ("embedding_batch_size", self.embedding_batch_size),
            ("max_concurrent_ingestions", self.max_concurrent_ingestions),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }

        if self.chunk_overlap_chars >= self.max_chunk_chars {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap_chars {} must be smaller than max_chunk_chars {}",
                self.chunk_overlap_chars, self.max_chunk_chars
            )));
        }

        if self.min_chunk_chars > self.max_chunk_chars {
            return Err(ConfigError::Invalid(format!(
                "min_chunk_chars {} exceeds max_chunk_chars {}",
                self.min_chunk_chars, self.max_chunk_chars
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::RetrievalConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(RetrievalConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_overlap_larger_than_chunk() {
        let config = RetrievalConfig {
            max_chunk_chars: 100,
            chunk_overlap_chars: 100,
            ..RetrievalConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let config = RetrievalConfig {
            similarity_threshold: 1.5,
            ..RetrievalConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_batch_size() {
        let config = RetrievalConfig {
            embedding_batch_size: 0,
            ..RetrievalConfig::default()
        };
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("embedding_batch_size"));
    }
}
