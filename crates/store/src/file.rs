//! JSON-file backends.
//!
//! Persist task records in `tasks.json` and rate-limit rows in
//! `rate_limits.json` under the configured state path. Every mutation
//! rewrites the file under the same write lock that guards the in-memory
//! map, so in-process readers always observe a consistent document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

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

/// File-backed task store. Records are kept in creation order.
pub struct FileTaskStore {
    path: PathBuf,
    tasks: RwLock<Vec<TaskRecord>>,
}

impl FileTaskStore {
    /// Load or create `tasks.json` under the state path.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path)?;
        let path = state_path.join("tasks.json");

        let tasks: Vec<TaskRecord> = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            Vec::new()
        };

        tracing::info!(tasks = tasks.len(), path = %path.display(), "task store loaded");

        Ok(Self {
            path,
            tasks: RwLock::new(tasks),
        })
    }

    /// Serialize under the held write lock.
    fn flush(&self, tasks: &[TaskRecord]) -> Result<()> {
        let json = serde_json::to_string_pretty(tasks)
            .map_err(|e| Error::Storage(format!("serializing tasks: {e}")))?;
        std::fs::write(&self.path, json).map_err(|e| Error::Storage(format!("writing tasks: {e}")))
    }
}

#[async_trait::async_trait]
impl TaskStore for FileTaskStore {
    async fn create(
        &self,
        session_id: Uuid,
        assigned_by: Option<String>,
        assigned_to: Option<String>,
        description: String,
    ) -> Result<Uuid> {
        let record = TaskRecord::new(session_id, assigned_by, assigned_to, description);
        let id = record.id;
        let mut tasks = self.tasks.write();
        tasks.push(record);
        self.flush(&tasks)?;
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<TaskRecord>> {
        Ok(self.tasks.read().iter().find(|t| t.id == id).cloned())
    }

    async fn pending_for_session(&self, session_id: Uuid) -> Result<Vec<TaskRecord>> {
        Ok(self
            .tasks
            .read()
            .iter()
            .filter(|t| t.session_id == session_id && t.status == TaskStatus::Pending)
            .cloned()
            .collect())
    }

    async fn set_status(&self, id: Uuid, status: TaskStatus) -> Result<()> {
        let mut tasks = self.tasks.write();
        let record = tasks
            .iter_mut()
            .find(|t| t.id == id)
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
        self.flush(&tasks)
    }

    async fn set_result(&self, id: Uuid, result: &str) -> Result<()> {
        let mut tasks = self.tasks.write();
        let record = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::Storage(format!("no such task: {id}")))?;
        record.result = Some(result.to_string());
        self.flush(&tasks)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rate-limit store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// File-backed rate-limit rows keyed `provider/model`.
pub struct FileRateLimitStore {
    path: PathBuf,
    rows: RwLock<HashMap<String, PersistedLimit>>,
}

impl FileRateLimitStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path)?;
        let path = state_path.join("rate_limits.json");

        let rows: HashMap<String, PersistedLimit> = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            rows: RwLock::new(rows),
        })
    }

    fn flush(&self, rows: &HashMap<String, PersistedLimit>) -> Result<()> {
        let json = serde_json::to_string_pretty(rows)
            .map_err(|e| Error::Storage(format!("serializing rate limits: {e}")))?;
        std::fs::write(&self.path, json)
            .map_err(|e| Error::Storage(format!("writing rate limits: {e}")))
    }
}

impl RateLimitStore for FileRateLimitStore {
    fn load(&self, provider: &str, model: &str) -> Result<Option<PersistedLimit>> {
        Ok(self.rows.read().get(&format!("{provider}/{model}")).cloned())
    }

    fn save(&self, provider: &str, model: &str, row: &PersistedLimit) -> Result<()> {
        let mut rows = self.rows.write();
        rows.insert(format!("{provider}/{model}"), row.clone());
        self.flush(&rows)
    }
}
