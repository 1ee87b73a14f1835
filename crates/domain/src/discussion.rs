use chrono::Utc;
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Contribution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One message appended to the shared discussion.
///
/// `hidden = true` marks search results and waiting notices: visible to
/// agents as context, suppressed from user-facing transcripts, and excluded
/// from `total_contributions` and per-agent statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    pub agent: String,
    pub content: String,
    /// Unix timestamp, seconds.
    pub ts: f64,
    /// 1-based position in the discussion at append time.
    pub contribution_num: u32,
    #[serde(default)]
    pub hidden: bool,
}

impl Contribution {
    pub fn new(agent: impl Into<String>, content: impl Into<String>, num: u32, hidden: bool) -> Self {
        Self {
            agent: agent.into(),
            content: content.into(),
            ts: now_ts(),
            contribution_num: num,
            hidden,
        }
    }
}

/// Current wall clock as fractional unix seconds.
pub fn now_ts() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent phase
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where an agent currently is in its tick loop, published for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentPhase {
    #[default]
    Idle,
    Thinking,
    Contributing,
    Waiting,
    Searching,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Web search
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A pending request on the arbiter's FIFO queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub requester: String,
    pub query: String,
}

/// Observability record of a search lifecycle start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEvent {
    pub agent: String,
    pub query: String,
    pub ts: f64,
}
