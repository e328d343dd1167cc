//! [`DocumentStore`] implementations: a process-local one and a JSON file
//! that survives restarts of the CLI.

use crate::error::StoreError;
use crate::models::{Chunk, Document, Fingerprint, LanguageCode, ProcessingStatus};
use crate::traits::DocumentStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DocumentTable {
    documents: HashMap<String, Document>,
    chunks: HashMap<String, Vec<Chunk>>,
}

impl DocumentTable {
    fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<Document> {
        self.documents
            .values()
            .find(|document| &document.fingerprint == fingerprint)
            .cloned()
    }

    fn insert(&mut self, document: &Document) -> Result<(), StoreError> {
        if self.find_by_fingerprint(&document.fingerprint).is_some() {
            return Err(StoreError::DuplicateFingerprint(
                document.fingerprint.to_string(),
            ));
        }
        self.documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    fn document_mut(&mut self, id: &str) -> Result<&mut Document, StoreError> {
        self.documents
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn update_status(
        &mut self,
        id: &str,
        status: ProcessingStatus,
        chunk_count: Option<u64>,
    ) -> Result<(), StoreError> {
        let document = self.document_mut(id)?;
        document.status = status;
        if let Some(count) = chunk_count {
            document.chunk_count = count;
        }
        Ok(())
    }

    fn record_extraction(
        &mut self,
        id: &str,
        content: &str,
        page_count: u32,
        language: &LanguageCode,
    ) -> Result<(), StoreError> {
        let document = self.document_mut(id)?;
        document.content = content.to_string();
        document.page_count = page_count;
        document.language = language.clone();
        Ok(())
    }

    fn insert_chunks(&mut self, chunks: &[Chunk]) -> Result<(), StoreError> {
        for chunk in chunks {
            if !self.documents.contains_key(&chunk.document_id) {
                return Err(StoreError::NotFound(chunk.document_id.clone()));
            }
        }
        for chunk in chunks {
            let rows = self.chunks.entry(chunk.document_id.clone()).or_default();
            rows.retain(|row| row.id != chunk.id);
            rows.push(chunk.clone());
        }
        Ok(())
    }

    fn chunks_by_document(&self, id: &str) -> Vec<Chunk> {
        let mut rows = self.chunks.get(id).cloned().unwrap_or_default();
        rows.sort_by_key(|chunk| chunk.chunk_index);
        rows
    }

    fn delete_chunks_by_document(&mut self, id: &str) -> usize {
        self.chunks.remove(id).map(|rows| rows.len()).unwrap_or(0)
    }

    fn list(&self) -> Vec<Document> {
        let mut documents: Vec<Document> = self.documents.values().cloned().collect();
        documents.sort_by(|left, right| right.uploaded_at.cmp(&left.uploaded_at));
        documents
    }
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    table: RwLock<DocumentTable>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self.table.read().await.find_by_fingerprint(fingerprint))
    }

    async fn insert(&self, document: &Document) -> Result<(), StoreError> {
        self.table.write().await.insert(document)
    }

    async fn update_status(
        &self,
        id: &str,
        status: ProcessingStatus,
        chunk_count: Option<u64>,
    ) -> Result<(), StoreError> {
        self.table.write().await.update_status(id, status, chunk_count)
    }

    async fn record_extraction(
        &self,
        id: &str,
        content: &str,
        page_count: u32,
        language: &LanguageCode,
    ) -> Result<(), StoreError> {
        self.table
            .write()
            .await
            .record_extraction(id, content, page_count, language)
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), StoreError> {
        self.table.write().await.insert_chunks(chunks)
    }

    async fn find_chunk_ids_by_document(&self, id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .table
            .read()
            .await
            .chunks_by_document(id)
            .into_iter()
            .map(|chunk| chunk.id)
            .collect())
    }

    async fn chunks_by_document(&self, id: &str) -> Result<Vec<Chunk>, StoreError> {
        Ok(self.table.read().await.chunks_by_document(id))
    }

    async fn delete_document(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.table.write().await.documents.remove(id).is_some())
    }

    async fn delete_chunks_by_document(&self, id: &str) -> Result<usize, StoreError> {
        Ok(self.table.write().await.delete_chunks_by_document(id))
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.table.read().await.documents.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Document>, StoreError> {
        Ok(self.table.read().await.list())
    }
}

/// Whole-table JSON snapshot, rewritten after every mutation.
pub struct FileDocumentStore {
    path: PathBuf,
    table: Mutex<DocumentTable>,
}

impl FileDocumentStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let table = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => DocumentTable::default(),
            Err(error) => return Err(error.into()),
        };

        tracing::debug!(path = %path.display(), "document store opened");
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    async fn persist(&self, table: &DocumentTable) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, serde_json::to_vec_pretty(table)?).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }

    async fn mutate<T>(
        &self,
        change: impl FnOnce(&mut DocumentTable) -> Result<T, StoreError> + Send,
    ) -> Result<T, StoreError> {
        let mut table = self.table.lock().await;
        // The change becomes visible only once it is on disk.
        let mut staged = table.clone();
        let outcome = change(&mut staged)?;
        self.persist(&staged).await?;
        *table = staged;
        Ok(outcome)
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self.table.lock().await.find_by_fingerprint(fingerprint))
    }

    async fn insert(&self, document: &Document) -> Result<(), StoreError> {
        self.mutate(|table| table.insert(document)).await
    }

    async fn update_status(
        &self,
        id: &str,
        status: ProcessingStatus,
        chunk_count: Option<u64>,
    ) -> Result<(), StoreError> {
        self.mutate(|table| table.update_status(id, status, chunk_count))
            .await
    }

    async fn record_extraction(
        &self,
        id: &str,
        content: &str,
        page_count: u32,
        language: &LanguageCode,
    ) -> Result<(), StoreError> {
        self.mutate(|table| table.record_extraction(id, content, page_count, language))
            .await
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), StoreError> {
        self.mutate(|table| table.insert_chunks(chunks)).await
    }

    async fn find_chunk_ids_by_document(&self, id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .table
            .lock()
            .await
            .chunks_by_document(id)
            .into_iter()
            .map(|chunk| chunk.id)
            .collect())
    }

    async fn chunks_by_document(&self, id: &str) -> Result<Vec<Chunk>, StoreError> {
        Ok(self.table.lock().await.chunks_by_document(id))
    }

    async fn delete_document(&self, id: &str) -> Result<bool, StoreError> {
        self.mutate(|table| Ok(table.documents.remove(id).is_some()))
            .await
    }

    async fn delete_chunks_by_document(&self, id: &str) -> Result<usize, StoreError> {
        self.mutate(|table| Ok(table.delete_chunks_by_document(id)))
            .await
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.table.lock().await.documents.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Document>, StoreError> {
        Ok(self.table.lock().await.list())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::fingerprint;
    use tempfile::tempdir;

    fn document(name: &str, bytes: &[u8]) -> Document {
        Document::pending(name, fingerprint(bytes), LanguageCode::new("en"))
    }

    fn chunk(document_id: &str, index: u64) -> Chunk {
        Chunk {
            id: format!("{document_id}-{index}"),
            document_id: document_id.to_string(),
            text: format!("passage {index}"),
            page_number: 1,
            chunk_index: index,
            language: LanguageCode::new("en"),
            embedding: None,
        }
    }

    #[tokio::test]
    async fn duplicate_fingerprint_is_rejected() {
        let store = InMemoryDocumentStore::new();
        store.insert(&document("a.pdf", b"same")).await.unwrap();

        let error = store.insert(&document("b.pdf", b"same")).await.unwrap_err();
        assert!(matches!(error, StoreError::DuplicateFingerprint(_)));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn chunks_are_returned_in_ordinal_order() {
        let store = InMemoryDocumentStore::new();
        let doc = document("a.pdf", b"a");
        store.insert(&doc).await.unwrap();
        store
            .insert_chunks(&[chunk(&doc.id, 2), chunk(&doc.id, 0), chunk(&doc.id, 1)])
            .await
            .unwrap();

        let ids = store.find_chunk_ids_by_document(&doc.id).await.unwrap();
        assert_eq!(
            ids,
            vec![format!("{}-0", doc.id), format!("{}-1", doc.id), format!("{}-2", doc.id)]
        );
    }

    #[tokio::test]
    async fn chunks_for_unknown_document_are_rejected() {
        let store = InMemoryDocumentStore::new();
        let error = store.insert_chunks(&[chunk("ghost", 0)]).await.unwrap_err();
        assert!(matches!(error, StoreError::NotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn status_and_extraction_are_recorded() {
        let store = InMemoryDocumentStore::new();
        let doc = document("a.pdf", b"a");
        store.insert(&doc).await.unwrap();

        store
            .record_extraction(&doc.id, "[Page 1]\nhello", 3, &LanguageCode::new("de"))
            .await
            .unwrap();
        store
            .update_status(&doc.id, ProcessingStatus::Completed, Some(4))
            .await
            .unwrap();

        let stored = store.get(&doc.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Completed);
        assert_eq!(stored.chunk_count, 4);
        assert_eq!(stored.page_count, 3);
        assert_eq!(stored.language.as_str(), "de");
    }

    #[tokio::test]
    async fn deletes_report_counts() {
        let store = InMemoryDocumentStore::new();
        let doc = document("a.pdf", b"a");
        store.insert(&doc).await.unwrap();
        store
            .insert_chunks(&[chunk(&doc.id, 0), chunk(&doc.id, 1)])
            .await
            .unwrap();

        assert_eq!(store.delete_chunks_by_document(&doc.id).await.unwrap(), 2);
        assert!(store.delete_document(&doc.id).await.unwrap());
        assert!(!store.delete_document(&doc.id).await.unwrap());
        assert_eq!(store.delete_chunks_by_document(&doc.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("state").join("documents.json");
        let doc = document("a.pdf", b"persisted");

        {
            let store = FileDocumentStore::open(&path).await?;
            store.insert(&doc).await?;
            store.insert_chunks(&[chunk(&doc.id, 0)]).await?;
            store
                .update_status(&doc.id, ProcessingStatus::Completed, Some(1))
                .await?;
        }

        let reopened = FileDocumentStore::open(&path).await?;
        let found = reopened
            .find_by_fingerprint(&fingerprint(b"persisted"))
            .await?
            .expect("document should be persisted");
        assert_eq!(found.id, doc.id);
        assert_eq!(found.status, ProcessingStatus::Completed);
        assert_eq!(reopened.find_chunk_ids_by_document(&doc.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_leaves_no_record_behind() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let state = dir.path().join("state");
        let store = FileDocumentStore::open(state.join("documents.json")).await?;

        // A file where the parent directory should be makes every write fail.
        std::fs::write(&state, b"not a directory")?;

        let doc = document("a.pdf", b"unwritable");
        assert!(matches!(store.insert(&doc).await, Err(StoreError::Io(_))));
        assert!(store.find_by_fingerprint(&doc.fingerprint).await?.is_none());
        assert!(store.get(&doc.id).await?.is_none());

        std::fs::remove_file(&state)?;
        store.insert(&doc).await?;
        assert!(store.find_by_fingerprint(&doc.fingerprint).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn listing_is_newest_first() {
        let store = InMemoryDocumentStore::new();
        let mut older = document("old.pdf", b"old");
        older.uploaded_at = older.uploaded_at - chrono::Duration::minutes(5);
        let newer = document("new.pdf", b"new");
        store.insert(&older).await.unwrap();
        store.insert(&newer).await.unwrap();

        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|document| document.filename)
            .collect();
        assert_eq!(names, vec!["new.pdf", "old.pdf"]);
    }
}
