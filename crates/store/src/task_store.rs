use std::future::Future;

use uuid::Uuid;

use cq_domain::error::{Error, Result};
use cq_domain::task::{TaskRecord, TaskStatus};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable map of task records.
///
/// Every mutation is independently atomic; there is no multi-row
/// transaction. The engine owning a task is its only writer, so writers
/// need no cross-process coordination beyond that ownership.
#[async_trait::async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new pending task. Returns its ID.
    async fn create(
        &self,
        session_id: Uuid,
        assigned_by: Option<String>,
        assigned_to: Option<String>,
        description: String,
    ) -> Result<Uuid>;

    async fn get(&self, id: Uuid) -> Result<Option<TaskRecord>>;

    /// Pending tasks for a session, in creation order.
    async fn pending_for_session(&self, session_id: Uuid) -> Result<Vec<TaskRecord>>;

    /// Transition a task's status. Completion stamps `completed_at`.
    /// Illegal transitions are refused with [`Error::Storage`].
    async fn set_status(&self, id: Uuid, status: TaskStatus) -> Result<()>;

    /// Atomically replace the task's `result` document.
    async fn set_result(&self, id: Uuid, result: &str) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retry helper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run a store operation, retrying once on a storage error.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Err(Error::Storage(msg)) => {
            tracing::warn!(error = %msg, "storage error, retrying once");
            op().await
        }
        other => other,
    }
}
