//! In-memory backends, used by tests and single-process runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use cq_domain::error::{Error, Result};
use cq_domain::task::{TaskRecord, TaskStatus};
use cq_providers::limiter::{PersistedLimit, RateLimitStore};

use crate::task_store::TaskStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lock-protected task map with an insertion counter so
/// `pending_for_session` stays in creation order even under same-instant
/// inserts.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<Uuid, (u64, TaskRecord)>>,
    seq: AtomicU64,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(
        &self,
        session_id: Uuid,
        assigned_by: Option<String>,
        assigned_to: Option<String>,
        description: String,
    ) -> Result<Uuid> {
        let record = TaskRecord::new(session_id, assigned_by, assigned_to, description);
        let id = record.id;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.tasks.write().insert(id, (seq, record));
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<TaskRecord>> {
        Ok(self.tasks.read().get(&id).map(|(_, r)| r.clone()))
    }

    async fn pending_for_session(&self, session_id: Uuid) -> Result<Vec<TaskRecord>> {
        let tasks = self.tasks.read();
        let mut pending: Vec<(u64, TaskRecord)> = tasks
            .values()
            .filter(|(_, r)| r.session_id == session_id && r.status == TaskStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|(seq, _)| *seq);
        Ok(pending.into_iter().map(|(_, r)| r).collect())
    }

    async fn set_status(&self, id: Uuid, status: TaskStatus) -> Result<()> {
        let mut tasks = self.tasks.write();
        let (_, record) = tasks
            .get_mut(&id)
            .ok_or_else(|| Error::Storage(format!("no such task: {id}")))?;
        if record.status == status {
            return Ok(());
        }
        if !record.status.can_transition_to(status) {
            return Err(Error::Storage(format!(
                "illegal transition {:?} -> {:?} for task {id}",
                record.status, status
            )));
        }
        record.status = status;
        if status == TaskStatus::Completed {
            record.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn set_result(&self, id: Uuid, result: &str) -> Result<()> {
        let mut tasks = self.tasks.write();
        let (_, record) = tasks
            .get_mut(&id)
            .ok_or_else(|| Error::Storage(format!("no such task: {id}")))?;
        record.result = Some(result.to_string());
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rate-limit store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct MemoryRateLimitStore {
    rows: RwLock<HashMap<(String, String), PersistedLimit>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    fn load(&self, provider: &str, model: &str) -> Result<Option<PersistedLimit>> {
        Ok(self
            .rows
            .read()
            .get(&(provider.to_string(), model.to_string()))
            .cloned())
    }

    fn save(&self, provider: &str, model: &str, row: &PersistedLimit) -> Result<()> {
        self.rows
            .write()
            .insert((provider.to_string(), model.to_string()), row.clone());
        Ok(())
    }
}
