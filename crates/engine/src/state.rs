//! Shared per-run discussion state.
//!
//! One [`DiscussionState`] exists per run, behind a single mutex in
//! [`SharedState`]. Workers take the guard for short sections only (never
//! across an await) and copy out whatever they need; no reference to the
//! internal collections escapes the guard.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use cq_domain::discussion::{now_ts, AgentPhase, Contribution, SearchEvent, SearchRequest};
use cq_domain::role::{Role, DELIBERATORS};
use cq_domain::snapshot::{RunStatistics, Snapshot};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Discussion state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct RollingSummary {
    pub text: String,
    /// Visible contribution count the text was generated from.
    pub last_update_count: usize,
}

pub struct DiscussionState {
    contributions: Vec<Contribution>,
    rolling_summary: RollingSummary,
    agent_status: BTreeMap<String, AgentPhase>,
    search_queue: VecDeque<SearchRequest>,
    search_events: Vec<SearchEvent>,
    pass_counters: BTreeMap<String, u32>,
    stats: StatsRecorder,
}

impl DiscussionState {
    fn new() -> Self {
        let mut agent_status: BTreeMap<String, AgentPhase> = DELIBERATORS
            .iter()
            .map(|r| (r.name().to_string(), AgentPhase::Idle))
            .collect();
        agent_status.insert(Role::WebSearcher.name().to_string(), AgentPhase::Idle);

        let pass_counters = DELIBERATORS
            .iter()
            .map(|r| (r.name().to_string(), 0))
            .collect();

        Self {
            contributions: Vec::new(),
            rolling_summary: RollingSummary {
                text: String::new(),
                last_update_count: 0,
            },
            agent_status,
            search_queue: VecDeque::new(),
            search_events: Vec::new(),
            pass_counters,
            stats: StatsRecorder::default(),
        }
    }

    // ── Contributions ───────────────────────────────────────────────

    pub fn contributions(&self) -> &[Contribution] {
        &self.contributions
    }

    pub fn visible(&self) -> Vec<Contribution> {
        self.contributions.iter().filter(|c| !c.hidden).cloned().collect()
    }

    pub fn visible_count(&self) -> u32 {
        self.contributions.iter().filter(|c| !c.hidden).count() as u32
    }

    pub fn visible_count_by(&self, agent: &str) -> u32 {
        self.contributions
            .iter()
            .filter(|c| !c.hidden && c.agent == agent)
            .count() as u32
    }

    /// Append a visible contribution; resets the author's pass counter.
    pub fn append_visible(&mut self, agent: &str, content: String) {
        let num = self.contributions.len() as u32 + 1;
        self.contributions.push(Contribution::new(agent, content, num, false));
        self.pass_counters.insert(agent.to_string(), 0);
        self.stats.note_contribution(agent);
    }

    /// Append a hidden entry (search result or waiting notice).
    pub fn append_hidden(&mut self, agent: &str, content: String) {
        let num = self.contributions.len() as u32 + 1;
        self.contributions.push(Contribution::new(agent, content, num, true));
    }

    // ── Phases ──────────────────────────────────────────────────────

    pub fn phase(&self, agent: &str) -> AgentPhase {
        self.agent_status.get(agent).copied().unwrap_or_default()
    }

    pub fn set_phase(&mut self, agent: &str, phase: AgentPhase) {
        self.agent_status.insert(agent.to_string(), phase);
        if phase == AgentPhase::Thinking {
            let thinking = self
                .agent_status
                .values()
                .filter(|p| **p == AgentPhase::Thinking)
                .count() as u32;
            self.stats.note_thinking_level(thinking);
        }
    }

    pub fn deliberators_all_idle(&self) -> bool {
        DELIBERATORS
            .iter()
            .all(|r| self.phase(r.name()) == AgentPhase::Idle)
    }

    // ── Passes and termination ──────────────────────────────────────

    pub fn record_pass(&mut self, agent: &str) -> u32 {
        let counter = self.pass_counters.entry(agent.to_string()).or_insert(0);
        *counter += 1;
        self.stats.note_pass(agent);
        *counter
    }

    pub fn pass_count(&self, agent: &str) -> u32 {
        self.pass_counters.get(agent).copied().unwrap_or(0)
    }

    /// The all-passed termination condition: every deliberator has passed
    /// since its last contribution, with at least two visible turns on the
    /// table; a discussion with nothing on the table terminates once every
    /// deliberator has declined twice.
    pub fn all_passed(&self) -> bool {
        let floor = DELIBERATORS
            .iter()
            .map(|r| self.pass_count(r.name()))
            .min()
            .unwrap_or(0);
        (floor >= 1 && self.visible_count() >= 2) || floor >= 2
    }

    // ── Rolling summary ─────────────────────────────────────────────

    pub fn rolling_text(&self) -> String {
        self.rolling_summary.text.clone()
    }

    /// When the visible count moved since the last summary, return the
    /// material to summarize.
    pub fn summary_work(&self) -> Option<(Vec<Contribution>, usize)> {
        let visible = self.visible();
        let count = visible.len();
        if count > 0 && count != self.rolling_summary.last_update_count {
            Some((visible, count))
        } else {
            None
        }
    }

    pub fn set_rolling_summary(&mut self, text: String, count: usize) {
        self.rolling_summary = RollingSummary {
            text,
            last_update_count: count,
        };
    }

    // ── Web search ──────────────────────────────────────────────────

    pub fn enqueue_search(&mut self, requester: &str, query: &str) {
        self.search_queue.push_back(SearchRequest {
            requester: requester.to_string(),
            query: query.to_string(),
        });
    }

    pub fn dequeue_search(&mut self) -> Option<SearchRequest> {
        self.search_queue.pop_front()
    }

    pub fn clear_search_queue(&mut self) -> usize {
        let dropped = self.search_queue.len();
        self.search_queue.clear();
        dropped
    }

    pub fn search_queue_len(&self) -> usize {
        self.search_queue.len()
    }

    pub fn push_search_event(&mut self, agent: &str, query: &str) {
        self.search_events.push(SearchEvent {
            agent: agent.to_string(),
            query: query.to_string(),
            ts: now_ts(),
        });
        self.stats.note_search();
    }

    // ── Statistics ──────────────────────────────────────────────────

    pub fn note_sample(&mut self, agent: &str, seconds: f64) {
        self.stats.note_sample(agent, seconds);
    }

    pub fn finalize_stats(&self, duration_seconds: f64) -> RunStatistics {
        self.stats.finalize(duration_seconds)
    }

    fn build_snapshot(&self, task: &str) -> Snapshot {
        let mut snapshot = Snapshot::initial(task, std::iter::empty());
        snapshot.contributions = self.contributions.clone();
        snapshot.rolling_summary = self.rolling_summary.text.clone();
        snapshot.agent_status = self.agent_status.clone();
        snapshot.web_search_events = self.search_events.clone();
        snapshot
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The single mutual-exclusion guard around one run's state.
#[derive(Clone)]
pub struct SharedState {
    inner: Arc<Mutex<DiscussionState>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(DiscussionState::new())),
        }
    }

    /// Run a short section under the guard. Callers must not await inside.
    pub fn with<R>(&self, f: impl FnOnce(&mut DiscussionState) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn snapshot(&self, task: &str) -> Snapshot {
        self.inner.lock().build_snapshot(task)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Statistics accumulator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct StatsRecorder {
    contributions: BTreeMap<String, u32>,
    passes: BTreeMap<String, u32>,
    samples: BTreeMap<String, Vec<f64>>,
    peak_thinking: u32,
    searches: u32,
}

impl StatsRecorder {
    fn note_contribution(&mut self, agent: &str) {
        *self.contributions.entry(agent.to_string()).or_insert(0) += 1;
    }

    fn note_pass(&mut self, agent: &str) {
        *self.passes.entry(agent.to_string()).or_insert(0) += 1;
    }

    fn note_sample(&mut self, agent: &str, seconds: f64) {
        self.samples.entry(agent.to_string()).or_default().push(seconds);
    }

    fn note_thinking_level(&mut self, level: u32) {
        self.peak_thinking = self.peak_thinking.max(level);
    }

    fn note_search(&mut self) {
        self.searches += 1;
    }

    fn finalize(&self, duration_seconds: f64) -> RunStatistics {
        let mean_response_seconds = self
            .samples
            .iter()
            .map(|(agent, samples)| {
                let mean = samples.iter().sum::<f64>() / samples.len() as f64;
                (agent.clone(), mean)
            })
            .collect();

        RunStatistics {
            duration_seconds,
            contributions_per_agent: self.contributions.clone(),
            passes_per_agent: self.passes.clone(),
            mean_response_seconds,
            peak_concurrent_thinking: self.peak_thinking,
            web_searches: self.searches,
        }
    }
}
