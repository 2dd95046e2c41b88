//! Abstraction over the durable background-execution engine (e.g. Hangfire-style job queue)
//! that actually dispatches download/upload work and retries it on failure.
//!
//! The job pipeline only needs three operations from whatever durable queue backs it:
//! enqueue, delete, and describe. Anything satisfying this trait is a valid collaborator; the
//! health monitor is the only consumer that needs `describe`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::JobResult;

/// State of a background-execution engine record, as reported by `describe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    /// Waiting to be picked up by a worker.
    Enqueued,
    /// Scheduled for a future time (e.g. a retry backoff).
    Scheduled,
    /// Currently being executed by a worker.
    Processing,
    /// Finished without error.
    Succeeded,
    /// Finished with an error and no retries remain.
    Failed,
    /// The record no longer exists in the engine (expired, manually removed).
    Deleted,
}

/// A background-execution record's state plus its transition history, oldest first.
#[derive(Debug, Clone)]
pub struct ExecutionDescription {
    /// Current state.
    pub state: ExecutionState,
    /// State transitions observed so far, oldest first.
    pub history: Vec<ExecutionState>,
}

/// Durable background-execution engine collaborator.
///
/// The job pipeline dispatches download/upload work through this trait rather than invoking
/// workers directly, so the health monitor can consult engine-reported state without coupling to
/// a specific queue implementation.
#[async_trait]
pub trait BackgroundExecutionEngine: Send + Sync {
    /// Enqueue `target` (an opaque job descriptor, e.g. "download:42") with `args` and return an
    /// opaque handle that can later be passed to `delete`/`describe`.
    async fn enqueue(&self, target: &str, args: &str) -> JobResult<String>;

    /// Remove a background-execution record, e.g. after a compensating failure.
    async fn delete(&self, handle: &str) -> JobResult<()>;

    /// Retrieve the current state and history for a handle. Returns `None` if the handle is
    /// unknown to the engine (equivalent to `ExecutionState::Deleted` for recovery purposes).
    async fn describe(&self, handle: &str) -> JobResult<Option<ExecutionDescription>>;
}

/// In-memory fake used by tests that need a `BackgroundExecutionEngine` collaborator without a
/// real durable queue.
#[derive(Default)]
pub struct InMemoryBackgroundEngine {
    records: Mutex<HashMap<String, ExecutionDescription>>,
    next_handle: Mutex<u64>,
}

impl InMemoryBackgroundEngine {
    /// Construct an empty fake engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a handle's state, bypassing `enqueue`, for test setup.
    pub fn set_state(&self, handle: &str, state: ExecutionState) {
        let mut records = self.records.lock().unwrap_or_else(|poison| poison.into_inner());
        let entry = records.entry(handle.to_string()).or_insert_with(|| ExecutionDescription {
            state,
            history: Vec::new(),
        });
        entry.history.push(entry.state);
        entry.state = state;
    }
}

#[async_trait]
impl BackgroundExecutionEngine for InMemoryBackgroundEngine {
    async fn enqueue(&self, target: &str, _args: &str) -> JobResult<String> {
        let mut next = self.next_handle.lock().unwrap_or_else(|poison| poison.into_inner());
        *next += 1;
        let handle = format!("{target}-{next}");
        drop(next);
        let mut records = self.records.lock().unwrap_or_else(|poison| poison.into_inner());
        records.insert(
            handle.clone(),
            ExecutionDescription {
                state: ExecutionState::Enqueued,
                history: Vec::new(),
            },
        );
        Ok(handle)
    }

    async fn delete(&self, handle: &str) -> JobResult<()> {
        let mut records = self.records.lock().unwrap_or_else(|poison| poison.into_inner());
        records.remove(handle);
        Ok(())
    }

    async fn describe(&self, handle: &str) -> JobResult<Option<ExecutionDescription>> {
        let records = self.records.lock().unwrap_or_else(|poison| poison.into_inner());
        Ok(records.get(handle).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_then_describe_reports_enqueued() {
        let engine = InMemoryBackgroundEngine::new();
        let handle = engine.enqueue("download:1", "{}").await.unwrap();
        let description = engine.describe(&handle).await.unwrap().unwrap();
        assert_eq!(description.state, ExecutionState::Enqueued);
    }

    #[tokio::test]
    async fn delete_makes_handle_unknown() {
        let engine = InMemoryBackgroundEngine::new();
        let handle = engine.enqueue("upload:1", "{}").await.unwrap();
        engine.delete(&handle).await.unwrap();
        assert!(engine.describe(&handle).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_state_tracks_history() {
        let engine = InMemoryBackgroundEngine::new();
        let handle = engine.enqueue("download:2", "{}").await.unwrap();
        engine.set_state(&handle, ExecutionState::Processing);
        engine.set_state(&handle, ExecutionState::Succeeded);
        let description = engine.describe(&handle).await.unwrap().unwrap();
        assert_eq!(description.state, ExecutionState::Succeeded);
        assert_eq!(
            description.history,
            vec![ExecutionState::Enqueued, ExecutionState::Processing]
        );
    }
}
