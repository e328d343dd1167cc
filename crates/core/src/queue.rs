//! Background ingestion tasks with observable state.
//!
//! Every uploaded document gets one task. A semaphore bounds how many run
//! at once; the rest wait in `Queued`. Callers never block on a task unless
//! they ask to via [`IngestionQueue::wait`].

use crate::models::ProcessingStatus;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionOutcome {
    pub document_id: String,
    pub status: ProcessingStatus,
    pub chunk_count: u64,
    pub error: Option<String>,
}

impl IngestionOutcome {
    pub fn completed(document_id: &str, chunk_count: u64) -> Self {
        Self {
            document_id: document_id.to_string(),
            status: ProcessingStatus::Completed,
            chunk_count,
            error: None,
        }
    }

    pub fn failed(document_id: &str, error: impl ToString) -> Self {
        Self {
            document_id: document_id.to_string(),
            status: ProcessingStatus::Failed,
            chunk_count: 0,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Queued,
    Running,
    Finished(IngestionOutcome),
}

type States = Arc<Mutex<HashMap<String, TaskState>>>;
type Handles = Arc<Mutex<HashMap<String, JoinHandle<()>>>>;

pub struct IngestionQueue {
    permits: Arc<Semaphore>,
    states: States,
    /// Handles of tasks that have not finished yet. A task removes its own
    /// entry once its outcome is recorded.
    handles: Handles,
}

impl IngestionQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            states: Arc::new(Mutex::new(HashMap::new())),
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedules `work` for `document_id` and returns immediately.
    pub async fn submit<F>(&self, document_id: &str, work: F)
    where
        F: Future<Output = IngestionOutcome> + Send + 'static,
    {
        let id = document_id.to_string();
        self.states.lock().await.insert(id.clone(), TaskState::Queued);

        let permits = Arc::clone(&self.permits);
        let states = Arc::clone(&self.states);
        let task_handles = Arc::clone(&self.handles);
        let task_id = id.clone();

        // Held across spawn so the task cannot remove its entry before it exists.
        let mut handles = self.handles.lock().await;
        let handle = tokio::spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => {
                    states.lock().await.insert(task_id.clone(), TaskState::Running);
                    work.await
                }
                Err(error) => IngestionOutcome::failed(&task_id, error),
            };
            states
                .lock()
                .await
                .insert(task_id.clone(), TaskState::Finished(outcome));
            task_handles.lock().await.remove(&task_id);
        });
        handles.insert(id, handle);
    }

    pub async fn state(&self, document_id: &str) -> Option<TaskState> {
        self.states.lock().await.get(document_id).cloned()
    }

    /// Waits for the task of `document_id`. `None` if nothing was submitted.
    pub async fn wait(&self, document_id: &str) -> Option<IngestionOutcome> {
        let handle = self.handles.lock().await.remove(document_id);
        if let Some(handle) = handle {
            self.join(document_id, handle).await;
        }

        match self.states.lock().await.get(document_id) {
            Some(TaskState::Finished(outcome)) => Some(outcome.clone()),
            _ => None,
        }
    }

    /// Waits for every unfinished task, then returns the outcome of every
    /// finished task whose state has not been forgotten.
    pub async fn wait_all(&self) -> Vec<IngestionOutcome> {
        let handles: Vec<(String, JoinHandle<()>)> =
            self.handles.lock().await.drain().collect();
        for (document_id, handle) in handles {
            self.join(&document_id, handle).await;
        }

        let states = self.states.lock().await;
        let mut outcomes: Vec<IngestionOutcome> = states
            .values()
            .filter_map(|state| match state {
                TaskState::Finished(outcome) => Some(outcome.clone()),
                _ => None,
            })
            .collect();
        outcomes.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        outcomes
    }

    /// Number of tasks whose handle is still held.
    pub async fn pending_tasks(&self) -> usize {
        self.handles.lock().await.len()
    }

    /// Drops the recorded state of a finished task.
    pub async fn forget(&self, document_id: &str) {
        let mut states = self.states.lock().await;
        if matches!(states.get(document_id), Some(TaskState::Finished(_))) {
            states.remove(document_id);
        }
    }

    async fn join(&self, document_id: &str, handle: JoinHandle<()>) {
        if let Err(error) = handle.await {
            tracing::error!(document_id, %error, "ingestion task aborted");
            self.states.lock().await.insert(
                document_id.to_string(),
                TaskState::Finished(IngestionOutcome::failed(document_id, error)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn submitted_work_reports_its_outcome() {
        let queue = IngestionQueue::new(2);
        queue
            .submit("doc-1", async { IngestionOutcome::completed("doc-1", 3) })
            .await;

        let outcome = queue.wait("doc-1").await.expect("task should finish");
        assert_eq!(outcome.status, ProcessingStatus::Completed);
        assert_eq!(outcome.chunk_count, 3);
        assert_eq!(
            queue.state("doc-1").await,
            Some(TaskState::Finished(outcome))
        );
    }

    #[tokio::test]
    async fn unknown_document_has_no_state() {
        let queue = IngestionQueue::new(1);
        assert_eq!(queue.state("missing").await, None);
        assert_eq!(queue.wait("missing").await, None);
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_permits() {
        let queue = IngestionQueue::new(1);
        let (release, gate) = oneshot::channel::<()>();

        queue
            .submit("first", async move {
                let _ = gate.await;
                IngestionOutcome::completed("first", 1)
            })
            .await;
        queue
            .submit("second", async { IngestionOutcome::completed("second", 1) })
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.state("first").await, Some(TaskState::Running));
        assert_eq!(queue.state("second").await, Some(TaskState::Queued));

        release.send(()).expect("first task should be waiting");
        let outcomes = queue.wait_all().await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|outcome| outcome.status == ProcessingStatus::Completed));
    }

    #[tokio::test]
    async fn panicking_work_is_recorded_as_failed() {
        fn explode() -> IngestionOutcome {
            panic!("boom")
        }

        let queue = IngestionQueue::new(1);
        queue.submit("doc-1", async { explode() }).await;

        let outcome = queue.wait("doc-1").await.expect("state should be recorded");
        assert_eq!(outcome.status, ProcessingStatus::Failed);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn finished_tasks_release_their_handles() {
        let queue = IngestionQueue::new(2);
        for id in ["doc-1", "doc-2", "doc-3"] {
            queue
                .submit(id, async move { IngestionOutcome::completed(id, 1) })
                .await;
        }

        let mut attempts = 0;
        while queue.pending_tasks().await > 0 {
            attempts += 1;
            assert!(attempts < 100, "handles were never released");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let outcomes = queue.wait_all().await;
        let ids: Vec<&str> = outcomes.iter().map(|o| o.document_id.as_str()).collect();
        assert_eq!(ids, vec!["doc-1", "doc-2", "doc-3"]);
        assert_eq!(queue.wait("doc-2").await.map(|o| o.chunk_count), Some(1));
    }

    #[tokio::test]
    async fn forget_only_drops_finished_tasks() {
        let queue = IngestionQueue::new(1);
        queue
            .submit("doc-1", async { IngestionOutcome::failed("doc-1", "bad pdf") })
            .await;
        queue.wait("doc-1").await;

        queue.forget("doc-1").await;
        assert_eq!(queue.state("doc-1").await, None);
    }
}
