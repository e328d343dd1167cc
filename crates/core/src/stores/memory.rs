//! Brute-force in-process [`VectorIndex`] for tests and single-process use.

use crate::embeddings::cosine_similarity;
use crate::error::IndexError;
use crate::models::{IndexPoint, ScoredPoint};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Collection {
    dimension: Option<usize>,
    points: HashMap<String, IndexPoint>,
}

#[derive(Default)]
pub struct InMemoryVectorIndex {
    collection: RwLock<Collection>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.collection.read().await.points.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.collection.read().await.points.contains_key(id)
    }
}

fn check_vector(dimension: Option<usize>, vector: &[f32]) -> Result<(), IndexError> {
    let expected = dimension
        .ok_or_else(|| IndexError::NotReady("collection has not been created".to_string()))?;
    if vector.len() != expected {
        return Err(IndexError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn ensure_collection(&self, dimension: usize) -> Result<(), IndexError> {
        let mut collection = self.collection.write().await;
        match collection.dimension {
            Some(existing) if existing != dimension => Err(IndexError::DimensionMismatch {
                expected: existing,
                actual: dimension,
            }),
            Some(_) => Ok(()),
            None => {
                collection.dimension = Some(dimension);
                Ok(())
            }
        }
    }

    async fn upsert(&self, points: &[IndexPoint]) -> Result<(), IndexError> {
        let mut collection = self.collection.write().await;
        for point in points {
            check_vector(collection.dimension, &point.vector)?;
        }
        for point in points {
            collection.points.insert(point.id.clone(), point.clone());
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>, IndexError> {
        let collection = self.collection.read().await;
        check_vector(collection.dimension, vector)?;

        let mut scored: Vec<ScoredPoint> = collection
            .points
            .values()
            .map(|point| ScoredPoint {
                id: point.id.clone(),
                score: cosine_similarity(vector, &point.vector),
                payload: point.payload.clone(),
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<usize, IndexError> {
        let mut collection = self.collection.write().await;
        Ok(ids
            .iter()
            .filter(|id| collection.points.remove(id.as_str()).is_some())
            .count())
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize, IndexError> {
        let mut collection = self.collection.write().await;
        let before = collection.points.len();
        collection
            .points
            .retain(|_, point| point.payload.document_id != document_id);
        Ok(before - collection.points.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LanguageCode, PointPayload};

    fn point(id: &str, document_id: &str, vector: Vec<f32>) -> IndexPoint {
        IndexPoint {
            id: id.to_string(),
            vector,
            payload: PointPayload {
                text: format!("text of {id}"),
                document_id: document_id.to_string(),
                page_number: 1,
                chunk_index: 0,
                language: LanguageCode::new("en"),
            },
        }
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent_but_checks_dimension() {
        let index = InMemoryVectorIndex::new();
        index.ensure_collection(2).await.unwrap();
        index.ensure_collection(2).await.unwrap();
        assert!(matches!(
            index.ensure_collection(3).await,
            Err(IndexError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn upsert_before_collection_is_rejected() {
        let index = InMemoryVectorIndex::new();
        let error = index.upsert(&[point("a", "d", vec![1.0, 0.0])]).await.unwrap_err();
        assert!(matches!(error, IndexError::NotReady(_)));
    }

    #[tokio::test]
    async fn search_orders_by_descending_similarity() {
        let index = InMemoryVectorIndex::new();
        index.ensure_collection(2).await.unwrap();
        index
            .upsert(&[
                point("far", "d", vec![0.0, 1.0]),
                point("near", "d", vec![1.0, 0.1]),
                point("mid", "d", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn delete_by_ids_counts_only_present_points() {
        let index = InMemoryVectorIndex::new();
        index.ensure_collection(2).await.unwrap();
        index
            .upsert(&[point("a", "d1", vec![1.0, 0.0]), point("b", "d1", vec![0.0, 1.0])])
            .await
            .unwrap();

        let removed = index
            .delete_by_ids(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn delete_by_document_matches_payload_field() {
        let index = InMemoryVectorIndex::new();
        index.ensure_collection(2).await.unwrap();
        index
            .upsert(&[
                point("a", "d1", vec![1.0, 0.0]),
                point("b", "d2", vec![0.0, 1.0]),
                point("c", "d1", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(index.delete_by_document("d1").await.unwrap(), 2);
        assert!(index.contains("b").await);
    }
}
