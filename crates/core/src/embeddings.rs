use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// One instance embeds both document chunks and queries, so both live in
/// the same vector space.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

pub fn check_dimensions(vector: &[f32], expected: usize) -> Result<(), EmbeddingError> {
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

/// Offline embedder hashing character trigrams into buckets. Useful without
/// a model server; it captures surface similarity only and cannot match
/// across languages.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    fn model_name(&self) -> &str {
        "char-trigram-hash"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_sync(text))
    }
}

#[derive(Debug, Clone)]
pub struct HttpEmbedderConfig {
    /// Base URL of an OpenAI-compatible API, e.g. `http://localhost:8080/v1`.
    pub endpoint: String,
    pub model: String,
    pub dimensions: usize,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

/// Calls `POST {endpoint}/embeddings`. Pair it with a multilingual model
/// (e.g. paraphrase-multilingual-mpnet-base-v2, 768 dims) so queries and
/// passages in different languages land near each other.
pub struct HttpEmbedder {
    config: HttpEmbedderConfig,
    client: Client,
}

impl HttpEmbedder {
    pub fn new(config: HttpEmbedderConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/embeddings", self.config.endpoint.trim_end_matches('/'));
        let body = json!({
            "model": self.config.model,
            "input": texts,
        });

        let mut last_error = String::new();
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(500 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&url).json(&body);
            if let Some(api_key) = &self.config.api_key {
                request = request.bearer_auth(api_key);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(error) => {
                    tracing::warn!(attempt, %error, "embedding request failed");
                    last_error = error.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let parsed: Value = response.json().await?;
                return parse_embedding_response(&parsed);
            }

            let details = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || status.is_server_error() {
                tracing::warn!(attempt, %status, "embedding backend busy, retrying");
                last_error = format!("{status}: {details}");
                continue;
            }

            return Err(EmbeddingError::BackendResponse {
                backend: "embeddings".to_string(),
                details: format!("{status}: {details}"),
            });
        }

        Err(EmbeddingError::RetriesExhausted {
            attempts: self.config.max_retries + 1,
            details: last_error,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.request(texts).await?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        for vector in &vectors {
            check_dimensions(vector, self.config.dimensions)?;
        }
        Ok(vectors)
    }
}

/// Multilingual models the local embedder can load, with their vector size.
#[cfg(feature = "local-embeddings-fastembed")]
const LOCAL_MODELS: &[(&str, fastembed::EmbeddingModel, usize)] = &[
    ("multilingual-e5-small", fastembed::EmbeddingModel::MultilingualE5Small, 384),
    ("multilingual-e5-base", fastembed::EmbeddingModel::MultilingualE5Base, 768),
    ("multilingual-e5-large", fastembed::EmbeddingModel::MultilingualE5Large, 1024),
];

#[cfg(feature = "local-embeddings-fastembed")]
pub const DEFAULT_LOCAL_MODEL: &str = "multilingual-e5-base";

/// In-process embedder backed by fastembed's ONNX runtime. The model is
/// downloaded on first use and cached by fastembed; inference runs on the
/// blocking pool.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct FastembedEmbedder {
    model_name: String,
    dimensions: usize,
    model: std::sync::Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl FastembedEmbedder {
    /// Loads `model_name`. Blocks while the model downloads, so call it from
    /// `spawn_blocking` inside a runtime.
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (name, model, dimensions) = LOCAL_MODELS
            .iter()
            .find(|(name, _, _)| *name == model_name)
            .cloned()
            .ok_or_else(|| {
                let supported: Vec<&str> =
                    LOCAL_MODELS.iter().map(|(name, _, _)| *name).collect();
                EmbeddingError::LocalModel(format!(
                    "unknown model {model_name}, supported: {}",
                    supported.join(", ")
                ))
            })?;

        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(model).with_show_download_progress(false),
        )
        .map_err(|error| EmbeddingError::LocalModel(error.to_string()))?;

        Ok(Self {
            model_name: name.to_string(),
            dimensions,
            model: std::sync::Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for FastembedEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = std::sync::Arc::clone(&self.model);
        let inputs = texts.to_vec();
        let vectors = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| EmbeddingError::LocalModel("model lock poisoned".to_string()))?;
            model
                .embed(inputs, None)
                .map_err(|error| EmbeddingError::LocalModel(error.to_string()))
        })
        .await
        .map_err(|error| EmbeddingError::LocalModel(error.to_string()))??;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        for vector in &vectors {
            check_dimensions(vector, self.dimensions)?;
        }
        Ok(vectors)
    }
}

/// Reads `data[].embedding`, ordered by `data[].index` when present.
fn parse_embedding_response(json: &Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| EmbeddingError::BackendResponse {
            backend: "embeddings".to_string(),
            details: "missing data array".to_string(),
        })?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| EmbeddingError::BackendResponse {
                backend: "embeddings".to_string(),
                details: format!("item {position} has no embedding"),
            })?;
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|index| index as usize)
            .unwrap_or(position);
        let vector = embedding
            .iter()
            .map(|value| {
                value.as_f64().map(|component| component as f32).ok_or_else(|| {
                    EmbeddingError::BackendResponse {
                        backend: "embeddings".to_string(),
                        details: format!("item {position} has a non-numeric component {value}"),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}
