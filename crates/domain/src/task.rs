use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lifecycle of a deliberation task.
///
/// Legal transitions: `Pending → InProgress → {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A row in the task store.
///
/// `assigned_by` / `assigned_to` are opaque to the engine; they identify
/// the requesting orchestrator and the worker pool for external bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    /// JSON payload, see [`TaskBrief`].
    pub description: String,
    pub status: TaskStatus,
    /// Live snapshot during the run; final document after termination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(
        session_id: Uuid,
        assigned_by: Option<String>,
        assigned_to: Option<String>,
        description: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            description,
            status: TaskStatus::Pending,
            result: None,
            assigned_by,
            assigned_to,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task brief
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The decoded `description` payload of a deliberation task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBrief {
    /// The user question driving the discussion.
    pub input: String,
    /// Optional prior-conversation snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Termination budget in rounds (one round ≈ 10 seconds of wall clock).
    #[serde(default = "d_max_rounds")]
    pub max_rounds: u32,
}

fn d_max_rounds() -> u32 {
    3
}

impl TaskBrief {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            context: None,
            max_rounds: d_max_rounds(),
        }
    }

    /// Decode a task description.
    ///
    /// A description that is not valid JSON is treated as the bare user
    /// question, so plain-text tasks queued by hand still run.
    pub fn parse(description: &str) -> Self {
        match serde_json::from_str::<TaskBrief>(description) {
            Ok(brief) => brief.clamped(),
            Err(_) => TaskBrief::new(description),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("task brief serializes")
    }

    fn clamped(mut self) -> Self {
        self.max_rounds = self.max_rounds.max(1);
        self
    }
}
