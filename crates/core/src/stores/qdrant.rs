use crate::error::IndexError;
use crate::models::{IndexPoint, PointPayload, ScoredPoint};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use url::Url;

const BACKEND: &str = "qdrant";

pub struct QdrantStore {
    base: Url,
    collection: String,
    client: Client,
    vector_size: usize,
    api_key: Option<String>,
}

impl QdrantStore {
    pub fn new(
        endpoint: &str,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Result<Self, IndexError> {
        let mut base = Url::parse(endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base,
            collection: collection.into(),
            client: Client::new(),
            vector_size,
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    fn url(&self, suffix: &str) -> Result<Url, IndexError> {
        let path = if suffix.is_empty() {
            format!("collections/{}", self.collection)
        } else {
            format!("collections/{}/{}", self.collection, suffix)
        };
        Ok(self.base.join(&path)?)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, IndexError> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(IndexError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{status}: {details}"),
            });
        }
        Ok(response.json().await?)
    }

    async fn create_collection(&self, dimension: usize) -> Result<(), IndexError> {
        self.send(self.client.put(self.url("")?).json(&json!({
            "vectors": { "size": dimension, "distance": "Cosine" },
        })))
        .await?;

        // Keyword index so filter deletes on document_id match reliably.
        self.send(self.client.put(self.url("index?wait=true")?).json(&json!({
            "field_name": "document_id",
            "field_schema": "keyword",
        })))
        .await?;

        tracing::info!(collection = %self.collection, dimension, "qdrant collection created");
        Ok(())
    }
}

fn check_dimension(expected: usize, actual: usize) -> Result<(), IndexError> {
    if expected != actual {
        return Err(IndexError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

fn point_to_json(point: &IndexPoint) -> Result<Value, IndexError> {
    Ok(json!({
        "id": point.id,
        "vector": point.vector,
        "payload": serde_json::to_value(&point.payload)?,
    }))
}

fn document_filter(document_id: &str) -> Value {
    json!({
        "must": [
            { "key": "document_id", "match": { "value": document_id } }
        ]
    })
}

fn collection_params(parsed: &Value) -> (Option<usize>, Option<&str>) {
    let size = parsed
        .pointer("/result/config/params/vectors/size")
        .and_then(Value::as_u64)
        .map(|size| size as usize);
    let distance = parsed
        .pointer("/result/config/params/vectors/distance")
        .and_then(Value::as_str);
    (size, distance)
}

fn point_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn parse_scored_points(parsed: &Value) -> Result<Vec<ScoredPoint>, IndexError> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .ok_or_else(|| IndexError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "search response has no result array".to_string(),
        })?;

    hits.iter()
        .map(|hit| -> Result<ScoredPoint, IndexError> {
            let id = hit
                .pointer("/id")
                .and_then(point_id)
                .ok_or_else(|| IndexError::BackendResponse {
                    backend: BACKEND.to_string(),
                    details: "search hit has no id".to_string(),
                })?;
            let score = hit
                .pointer("/score")
                .and_then(Value::as_f64)
                .ok_or_else(|| IndexError::BackendResponse {
                    backend: BACKEND.to_string(),
                    details: format!("search hit {id} has no numeric score"),
                })? as f32;
            let payload: PointPayload =
                serde_json::from_value(hit.pointer("/payload").cloned().unwrap_or(Value::Null))?;
            Ok(ScoredPoint { id, score, payload })
        })
        .collect()
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<(), IndexError> {
        check_dimension(self.vector_size, dimension)?;

        let response = self
            .authorized(self.client.get(self.url("")?))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => self.create_collection(dimension).await,
            status if status.is_success() => {
                let parsed: Value = response.json().await?;
                let (size, distance) = collection_params(&parsed);
                if let Some(size) = size {
                    check_dimension(size, dimension)?;
                }
                if let Some(distance) = distance {
                    if distance != "Cosine" {
                        return Err(IndexError::BackendResponse {
                            backend: BACKEND.to_string(),
                            details: format!(
                                "collection {} uses {distance} distance, expected Cosine",
                                self.collection
                            ),
                        });
                    }
                }
                Ok(())
            }
            status => Err(IndexError::BackendResponse {
                backend: BACKEND.to_string(),
                details: status.to_string(),
            }),
        }
    }

    async fn upsert(&self, points: &[IndexPoint]) -> Result<(), IndexError> {
        if points.is_empty() {
            return Ok(());
        }

        let points = points
            .iter()
            .map(|point| {
                check_dimension(self.vector_size, point.vector.len())?;
                point_to_json(point)
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        self.send(
            self.client
                .put(self.url("points?wait=true")?)
                .json(&json!({ "points": points })),
        )
        .await?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>, IndexError> {
        check_dimension(self.vector_size, vector.len())?;

        let parsed = self
            .send(self.client.post(self.url("points/search")?).json(&json!({
                "vector": vector,
                "limit": limit,
                "with_payload": true,
            })))
            .await?;

        let mut hits = parse_scored_points(&parsed)?;
        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        Ok(hits)
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<usize, IndexError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let existing = self
            .send(self.client.post(self.url("points")?).json(&json!({
                "ids": ids,
                "with_payload": false,
                "with_vector": false,
            })))
            .await?;
        let present = existing
            .pointer("/result")
            .and_then(Value::as_array)
            .map(Vec::len)
            .ok_or_else(|| IndexError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "retrieve response has no result array".to_string(),
            })?;

        self.send(
            self.client
                .post(self.url("points/delete?wait=true")?)
                .json(&json!({ "points": ids })),
        )
        .await?;

        Ok(present)
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize, IndexError> {
        let filter = document_filter(document_id);

        let counted = self
            .send(self.client.post(self.url("points/count")?).json(&json!({
                "filter": filter,
                "exact": true,
            })))
            .await?;
        let matched = counted
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .ok_or_else(|| IndexError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "count response has no result count".to_string(),
            })? as usize;

        self.send(
            self.client
                .post(self.url("points/delete?wait=true")?)
                .json(&json!({ "filter": filter })),
        )
        .await?;

        Ok(matched)
    }
}
