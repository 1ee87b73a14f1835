use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::discussion::{AgentPhase, Contribution, SearchEvent};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    Failed,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The JSON document republished into the task `result` field.
///
/// This is the public surface for live viewers: every in-progress write
/// carries the first six fields; the terminal write adds `summary`,
/// `total_contributions` and `statistics`. Maps are `BTreeMap` so a parsed
/// snapshot re-serializes byte-for-byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub status: RunStatus,
    /// The user question.
    pub task: String,
    pub contributions: Vec<Contribution>,
    pub rolling_summary: String,
    pub agent_status: BTreeMap<String, AgentPhase>,
    pub web_search_events: Vec<SearchEvent>,
    /// Prior-conversation context, echoed on the terminal snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_contributions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<RunStatistics>,
}

impl Snapshot {
    /// An empty in-progress snapshot with every listed agent idle.
    pub fn initial(task: impl Into<String>, agents: impl IntoIterator<Item = String>) -> Self {
        Self {
            status: RunStatus::InProgress,
            task: task.into(),
            contributions: Vec::new(),
            rolling_summary: String::new(),
            agent_status: agents.into_iter().map(|a| (a, AgentPhase::Idle)).collect(),
            web_search_events: Vec::new(),
            context: None,
            summary: None,
            total_contributions: None,
            statistics: None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("snapshot serializes")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Final statistics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Aggregate measurements attached to the terminal snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStatistics {
    pub duration_seconds: f64,
    /// Non-hidden contributions per deliberator.
    pub contributions_per_agent: BTreeMap<String, u32>,
    pub passes_per_agent: BTreeMap<String, u32>,
    /// Mean model round-trip per deliberator, seconds.
    pub mean_response_seconds: BTreeMap<String, f64>,
    pub peak_concurrent_thinking: u32,
    pub web_searches: u32,
}
