//! Snapshot republication.
//!
//! Live observers read the task's `result` field, so every contribution,
//! phase transition, summary update and search lifecycle event republishes
//! a whole snapshot. A publish failure is logged and swallowed; only the
//! terminal write may fail a run.

use std::sync::Arc;

use uuid::Uuid;

use cq_store::{with_retry, TaskStore};

use crate::state::SharedState;

#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn TaskStore>,
    task_id: Uuid,
    task: String,
    state: SharedState,
    /// Serializes snapshot-and-write pairs across workers so the stored
    /// document never regresses to an older snapshot.
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl Publisher {
    pub fn new(store: Arc<dyn TaskStore>, task_id: Uuid, task: String, state: SharedState) -> Self {
        Self {
            store,
            task_id,
            task,
            state,
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Snapshot under the state guard, then write. Concurrent publishers
    /// queue on the gate; each takes a fresh snapshot when its turn comes.
    pub async fn publish(&self) {
        let _turn = self.gate.lock().await;
        let json = self.state.snapshot(&self.task).to_json();
        if let Err(e) = with_retry(|| self.store.set_result(self.task_id, &json)).await {
            tracing::warn!(task_id = %self.task_id, error = %e, "snapshot publish failed");
        }
    }
}
