//! The discussion engine.
//!
//! One `run` claims a task, spawns a worker per deliberator plus the
//! summary loop, detects termination, and writes the terminal document.
//! Termination conditions are independent and the first to fire wins:
//! idle-dwell, all-deliberators-passed, and the wall-clock hard cap of
//! `max_rounds × 10` seconds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::Instrument;

use cq_domain::config::Config;
use cq_domain::discussion::AgentPhase;
use cq_domain::error::{Error, Result};
use cq_domain::role::{Role, DELIBERATORS};
use cq_domain::snapshot::RunStatus;
use cq_domain::task::{TaskBrief, TaskRecord, TaskStatus};
use cq_providers::ModelRegistry;
use cq_store::{with_retry, TaskStore};

use crate::admission::should_contribute;
use crate::agents::{Deliberator, Reply, SearchAgent, Summarizer};
use crate::arbiter::WebSearchArbiter;
use crate::publish::Publisher;
use crate::state::SharedState;
use crate::stop::StopSignal;
use crate::summary;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tuning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Timing knobs for one run. Defaults are the production values; tests
/// shrink them to run in milliseconds.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Sleep between agent loop iterations.
    pub tick: Duration,
    /// Sampling period of the termination detector.
    pub detector_period: Duration,
    /// Consecutive all-idle samples (with content) before stopping.
    pub idle_dwell_samples: u32,
    /// Per-worker join budget after the stop signal.
    pub join_timeout: Duration,
    /// Wall-clock budget per discussion round; the hard cap is
    /// `max_rounds × seconds_per_round`.
    pub seconds_per_round: f64,
    /// Rolling-summary cadence.
    pub summary_interval: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(2),
            detector_period: Duration::from_secs(1),
            idle_dwell_samples: 15,
            join_timeout: Duration::from_secs(5),
            seconds_per_round: 10.0,
            summary_interval: Duration::from_secs(10),
        }
    }
}

impl Tuning {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick: Duration::from_secs(config.consensus.tick_interval_seconds),
            summary_interval: Duration::from_secs(config.consensus.summary_interval_seconds),
            ..Self::default()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct DiscussionEngine {
    store: Arc<dyn TaskStore>,
    deliberators: Vec<Arc<Deliberator>>,
    summarizer: Arc<Summarizer>,
    searcher: SearchAgent,
    /// Advisory per-role turn caps from configuration; the admission
    /// policy's hard cap of three still binds.
    advisory_caps: HashMap<&'static str, u32>,
    tuning: Tuning,
}

impl DiscussionEngine {
    /// Build the engine's agents. Fails fast on fatal configuration
    /// problems (missing prompt files) rather than deliberating without
    /// a working model.
    pub fn new(
        registry: &ModelRegistry,
        config: &Config,
        store: Arc<dyn TaskStore>,
    ) -> Result<Self> {
        let deliberators = DELIBERATORS
            .iter()
            .map(|role| {
                Deliberator::new(*role, registry.for_role(*role), &config.agents).map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;

        let summarizer = Arc::new(Summarizer::new(
            registry.for_role(Role::Summarizer),
            &config.agents,
        )?);
        let searcher = SearchAgent::new(registry.for_role(Role::WebSearcher), &config.agents)?;

        let advisory_caps = DELIBERATORS
            .iter()
            .map(|role| (role.name(), config.agents.for_role(*role).max_iterations))
            .collect();

        Ok(Self {
            store,
            deliberators,
            summarizer,
            searcher,
            advisory_caps,
            tuning: Tuning::from_config(config),
        })
    }

    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Run one task to a terminal status.
    pub async fn run(&self, task: &TaskRecord) -> Result<()> {
        self.run_with_stop(task, StopSignal::new()).await
    }

    /// Run one task; `stop` may additionally be fired by an external
    /// caller to end the discussion early (still a COMPLETED outcome).
    pub async fn run_with_stop(&self, task: &TaskRecord, stop: StopSignal) -> Result<()> {
        let span = tracing::info_span!(
            "discussion",
            task_id = %task.id,
            session_id = %task.session_id,
        );

        async {
            let brief = TaskBrief::parse(&task.description);
            match self.deliberate(task, &brief, stop).await {
                Ok(final_json) => {
                    with_retry(|| self.store.set_result(task.id, &final_json)).await?;
                    with_retry(|| self.store.set_status(task.id, TaskStatus::Completed)).await?;
                    tracing::info!("task completed");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(error = %e, "discussion failed");
                    let error_json =
                        serde_json::json!({ "error": e.to_string() }).to_string();
                    // Best effort: storage may be the thing that failed.
                    let _ = with_retry(|| self.store.set_result(task.id, &error_json)).await;
                    let _ =
                        with_retry(|| self.store.set_status(task.id, TaskStatus::Failed)).await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    // ── The run itself ──────────────────────────────────────────────

    async fn deliberate(
        &self,
        task: &TaskRecord,
        brief: &TaskBrief,
        stop: StopSignal,
    ) -> Result<String> {
        let state = SharedState::new();
        let publisher = Publisher::new(
            self.store.clone(),
            task.id,
            brief.input.clone(),
            state.clone(),
        );

        // Claim the task and publish the empty snapshot. These writes must
        // land; later snapshot publishes are best-effort.
        with_retry(|| self.store.set_status(task.id, TaskStatus::InProgress)).await?;
        let initial = state.snapshot(&brief.input).to_json();
        with_retry(|| self.store.set_result(task.id, &initial)).await?;

        let started = Instant::now();
        let arbiter = Arc::new(WebSearchArbiter::new(state.clone(), self.searcher.clone()));

        let mut handles = Vec::new();
        for agent in &self.deliberators {
            let worker = DeliberatorWorker {
                agent: agent.clone(),
                state: state.clone(),
                stop: stop.clone(),
                publisher: publisher.clone(),
                arbiter: arbiter.clone(),
                user_input: brief.input.clone(),
                context: brief.context.clone(),
                advisory_cap: self.advisory_caps.get(agent.name()).copied().unwrap_or(3),
                tick: self.tuning.tick,
            };
            let span = tracing::info_span!("deliberator", role = %agent.name());
            handles.push(tokio::spawn(worker.run().instrument(span)));
        }

        handles.push(tokio::spawn(
            summary::run(
                state.clone(),
                self.summarizer.clone(),
                brief.input.clone(),
                publisher.clone(),
                stop.clone(),
                self.tuning.summary_interval,
            )
            .instrument(tracing::info_span!("summary_loop")),
        ));

        self.detect_termination(&state, &stop, started, brief.max_rounds).await;

        // Join with a bounded budget; late workers are abandoned.
        for mut handle in handles {
            if tokio::time::timeout(self.tuning.join_timeout, &mut handle)
                .await
                .is_err()
            {
                tracing::warn!("worker exceeded join timeout, aborting");
                handle.abort();
            }
        }

        // Final synthesis over the visible discussion.
        let (visible, rolling) = state.with(|s| (s.visible(), s.rolling_text()));
        let synthesis = match self
            .summarizer
            .synthesis(&brief.input, &visible, &rolling)
            .await
        {
            Ok(text) => text,
            Err(e) if !rolling.is_empty() => {
                tracing::warn!(error = %e, "final synthesis failed, using rolling summary");
                rolling.clone()
            }
            Err(e) => return Err(e),
        };

        let duration = started.elapsed().as_secs_f64();
        let mut snapshot = state.snapshot(&brief.input);
        snapshot.status = RunStatus::Completed;
        snapshot.context = brief.context.clone();
        snapshot.summary = Some(synthesis);
        snapshot.total_contributions = Some(state.with(|s| s.visible_count()));
        snapshot.statistics = Some(state.with(|s| s.finalize_stats(duration)));
        Ok(snapshot.to_json())
    }

    /// Sample the discussion once per detector period until a termination
    /// condition fires or an external caller sets the stop signal.
    async fn detect_termination(
        &self,
        state: &SharedState,
        stop: &StopSignal,
        started: Instant,
        max_rounds: u32,
    ) {
        let hard_cap =
            Duration::from_secs_f64(f64::from(max_rounds) * self.tuning.seconds_per_round);
        let mut idle_dwell: u32 = 0;

        while !stop.is_set() {
            if started.elapsed() >= hard_cap {
                tracing::info!(?hard_cap, "hard cap reached");
                stop.set();
                break;
            }

            let (all_idle, has_content, all_passed) = state.with(|s| {
                (
                    s.deliberators_all_idle(),
                    !s.contributions().is_empty(),
                    s.all_passed(),
                )
            });

            if all_passed {
                tracing::info!("every deliberator passed");
                stop.set();
                break;
            }

            idle_dwell = if all_idle && has_content { idle_dwell + 1 } else { 0 };
            if idle_dwell >= self.tuning.idle_dwell_samples {
                tracing::info!(samples = idle_dwell, "idle dwell reached");
                stop.set();
                break;
            }

            stop.sleep(self.tuning.detector_period).await;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deliberator worker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct DeliberatorWorker {
    agent: Arc<Deliberator>,
    state: SharedState,
    stop: StopSignal,
    publisher: Publisher,
    arbiter: Arc<WebSearchArbiter>,
    user_input: String,
    context: Option<String>,
    advisory_cap: u32,
    tick: Duration,
}

impl DeliberatorWorker {
    async fn run(self) {
        loop {
            if self.stop.is_set() {
                break;
            }

            // Admission and the thinking transition happen under one guard
            // so they are mutually exclusive with appends and publishes.
            let admitted = self.state.with(|s| {
                let own = s.visible_count_by(self.agent.name());
                if own >= self.advisory_cap {
                    return None;
                }
                if !should_contribute(
                    self.agent.role(),
                    s.contributions(),
                    &self.user_input,
                    own,
                ) {
                    return None;
                }
                s.set_phase(self.agent.name(), AgentPhase::Thinking);
                Some(s.contributions().to_vec())
            });

            let Some(discussion) = admitted else {
                if self.stop.sleep(self.tick).await {
                    break;
                }
                continue;
            };
            self.publisher.publish().await;

            let turn_started = Instant::now();
            let mut reply = self
                .agent
                .take_turn(&self.user_input, &discussion, self.context.as_deref())
                .await;

            // A rate limit never fails the run: honor the advertised reset,
            // then take the turn again.
            if let Err(Error::RateLimited { reset_at }) = &reply {
                let reset_at = *reset_at;
                tracing::warn!(role = %self.agent.name(), %reset_at, "rate limited, waiting");
                if let Ok(wait) = (reset_at - Utc::now()).to_std() {
                    tokio::time::sleep(wait).await;
                }
                if !self.stop.is_set() {
                    reply = self
                        .agent
                        .take_turn(&self.user_input, &discussion, self.context.as_deref())
                        .await;
                }
            }
            let elapsed = turn_started.elapsed().as_secs_f64();

            match reply {
                Ok(Reply::Search(query)) => {
                    // Neither a contribution nor a pass.
                    self.state.with(|s| s.note_sample(self.agent.name(), elapsed));
                    self.arbiter
                        .request(self.agent.name(), query, &self.stop, &self.publisher)
                        .await;
                    self.state
                        .with(|s| s.set_phase(self.agent.name(), AgentPhase::Idle));
                    self.publisher.publish().await;
                }
                Ok(Reply::Contribution(content)) => {
                    self.state.with(|s| {
                        s.append_visible(self.agent.name(), content);
                        s.note_sample(self.agent.name(), elapsed);
                        s.set_phase(self.agent.name(), AgentPhase::Contributing);
                    });
                    self.publisher.publish().await;
                    self.state
                        .with(|s| s.set_phase(self.agent.name(), AgentPhase::Idle));
                    self.publisher.publish().await;
                }
                outcome => {
                    if let Err(e) = &outcome {
                        tracing::warn!(
                            role = %self.agent.name(),
                            error = %e,
                            "turn failed, counted as pass"
                        );
                    }
                    let all_passed = self.state.with(|s| {
                        s.record_pass(self.agent.name());
                        s.note_sample(self.agent.name(), elapsed);
                        s.set_phase(self.agent.name(), AgentPhase::Idle);
                        s.all_passed()
                    });
                    if all_passed {
                        self.stop.set();
                    }
                    self.publisher.publish().await;
                }
            }

            if self.stop.sleep(self.tick).await {
                break;
            }
        }

        self.state
            .with(|s| s.set_phase(self.agent.name(), AgentPhase::Idle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use uuid::Uuid;

    use cq_providers::limiter::{RateLimitCoordinator, RateLimitStore};
    use cq_providers::stub::{Script, ScriptedModel};
    use cq_store::{MemoryRateLimitStore, MemoryTaskStore};

    // ── Recording store: asserts the snapshot contract on every write ──

    struct RecordingStore {
        inner: MemoryTaskStore,
        results: Mutex<Vec<String>>,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                inner: MemoryTaskStore::new(),
                results: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl TaskStore for RecordingStore {
        async fn create(
            &self,
            session_id: Uuid,
            assigned_by: Option<String>,
            assigned_to: Option<String>,
            description: String,
        ) -> Result<Uuid> {
            self.inner
                .create(session_id, assigned_by, assigned_to, description)
                .await
        }

        async fn get(&self, id: Uuid) -> Result<Option<cq_domain::task::TaskRecord>> {
            self.inner.get(id).await
        }

        async fn pending_for_session(
            &self,
            session_id: Uuid,
        ) -> Result<Vec<cq_domain::task::TaskRecord>> {
            self.inner.pending_for_session(session_id).await
        }

        async fn set_status(&self, id: Uuid, status: TaskStatus) -> Result<()> {
            self.inner.set_status(id, status).await
        }

        async fn set_result(&self, id: Uuid, result: &str) -> Result<()> {
            self.results.lock().push(result.to_string());
            self.inner.set_result(id, result).await
        }
    }

    // ── Fixture ─────────────────────────────────────────────────────

    fn test_tuning() -> Tuning {
        Tuning {
            tick: Duration::from_millis(10),
            detector_period: Duration::from_millis(5),
            idle_dwell_samples: 15,
            join_timeout: Duration::from_millis(500),
            seconds_per_round: 10.0,
            summary_interval: Duration::from_millis(25),
        }
    }

    fn contribution_text(role: Role) -> String {
        format!(
            "{} perspective: a substantive point that moves the question forward.",
            role.name()
        )
    }

    /// Registry with an isolated scripted model per role.
    fn registry_with(
        mut scripts: HashMap<Role, ScriptedModel>,
    ) -> (ModelRegistry, HashMap<Role, Arc<ScriptedModel>>) {
        let mut registry =
            ModelRegistry::single(Arc::new(ScriptedModel::always("unused default")));
        let mut models = HashMap::new();
        let all = [
            Role::Divergent,
            Role::Convergent,
            Role::Critical,
            Role::Pragmatist,
            Role::UserProxy,
            Role::Quantifier,
            Role::Summarizer,
            Role::WebSearcher,
        ];
        for role in all {
            let model = Arc::new(
                scripts
                    .remove(&role)
                    .unwrap_or_else(|| ScriptedModel::always("PASS")),
            );
            models.insert(role, model.clone());
            registry = registry.with_override(role, model);
        }
        (registry, models)
    }

    fn default_scripts() -> HashMap<Role, ScriptedModel> {
        let mut scripts = HashMap::new();
        for role in DELIBERATORS {
            scripts.insert(
                role,
                ScriptedModel::new([Script::Reply(contribution_text(role))]),
            );
        }
        scripts.insert(
            Role::Summarizer,
            ScriptedModel::always("A synthesis of everything discussed, in full sentences."),
        );
        scripts
    }

    async fn run_engine(
        scripts: HashMap<Role, ScriptedModel>,
        description: &str,
    ) -> (Arc<RecordingStore>, Uuid, Result<()>) {
        let (registry, _models) = registry_with(scripts);
        let store = Arc::new(RecordingStore::new());
        let config = Config::default();
        let engine = DiscussionEngine::new(&registry, &config, store.clone())
            .unwrap()
            .with_tuning(test_tuning());

        let task_id = store
            .create(Uuid::new_v4(), None, None, description.into())
            .await
            .unwrap();
        let task = store.get(task_id).await.unwrap().unwrap();
        let outcome = engine.run(&task).await;
        (store, task_id, outcome)
    }

    async fn final_value(store: &RecordingStore, task_id: Uuid) -> serde_json::Value {
        let record = store.get(task_id).await.unwrap().unwrap();
        serde_json::from_str(record.result.as_deref().unwrap()).unwrap()
    }

    // ── Healthy discussion (scenario: compare microservices) ────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn healthy_run_completes_with_bounded_contributions() {
        let (store, task_id, outcome) = run_engine(
            default_scripts(),
            r#"{"input": "Compare microservices vs monolith for a 5-person team.", "max_rounds": 3}"#,
        )
        .await;
        outcome.unwrap();

        let record = store.get(task_id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert!(record.completed_at.is_some());

        let value = final_value(&store, task_id).await;
        let total = value["total_contributions"].as_u64().unwrap();
        assert!((3..=18).contains(&total), "total was {total}");
        assert!(value["contributions"]
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c["agent"] == "Critical" && c["hidden"] == false));
        assert!(!value["summary"].as_str().unwrap().is_empty());
        assert!(value["statistics"]["duration_seconds"].as_f64().unwrap() < 30.0);

        // Per-agent statistics sum to the visible total.
        let per_agent: u64 = value["statistics"]["contributions_per_agent"]
            .as_object()
            .unwrap()
            .values()
            .map(|v| v.as_u64().unwrap())
            .sum();
        assert_eq!(per_agent, total);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_intermediate_snapshot_is_valid_json() {
        let (store, _task_id, outcome) = run_engine(
            default_scripts(),
            r#"{"input": "Compare microservices vs monolith for a 5-person team."}"#,
        )
        .await;
        outcome.unwrap();

        let results = store.results.lock();
        assert!(results.len() >= 3, "expected repeated snapshot publishes");

        let mut last_len = 0usize;
        for raw in results.iter() {
            let value: serde_json::Value = serde_json::from_str(raw).expect("well-formed JSON");
            if let Some(contributions) = value["contributions"].as_array() {
                // Contributions are append-only across observed snapshots.
                assert!(contributions.len() >= last_len);
                last_len = contributions.len();
                for (i, c) in contributions.iter().enumerate() {
                    assert_eq!(c["contribution_num"].as_u64().unwrap() as usize, i + 1);
                }
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn discussion_invariants_hold_under_eager_agents() {
        // Agents that never pass: every turn produces fresh content. The
        // admission policy alone must bound the discussion.
        let mut scripts = HashMap::new();
        for role in DELIBERATORS {
            scripts.insert(
                role,
                ScriptedModel::always(format!(
                    "{} adds yet another angle on the design question at hand.",
                    role.name()
                )),
            );
        }
        scripts.insert(Role::Summarizer, ScriptedModel::always("Full synthesis text."));

        let (store, task_id, outcome) =
            run_engine(scripts, r#"{"input": "Design a scalable system", "max_rounds": 3}"#).await;
        outcome.unwrap();

        let value = final_value(&store, task_id).await;
        let contributions: Vec<(String, bool)> = value["contributions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| {
                (
                    c["agent"].as_str().unwrap().to_string(),
                    c["hidden"].as_bool().unwrap(),
                )
            })
            .collect();
        let visible: Vec<&str> = contributions
            .iter()
            .filter(|(_, hidden)| !hidden)
            .map(|(agent, _)| agent.as_str())
            .collect();

        // No deliberator over the hard cap of three.
        for role in DELIBERATORS {
            let count = visible.iter().filter(|a| **a == role.name()).count();
            assert!(count <= 3, "{} contributed {count} times", role.name());
        }
        // No back-to-back authors.
        for pair in visible.windows(2) {
            assert_ne!(pair[0], pair[1], "back-to-back author {}", pair[0]);
        }
        // At most twice per sliding window of three.
        for window in visible.windows(3) {
            for role in DELIBERATORS {
                let count = window.iter().filter(|a| **a == role.name()).count();
                assert!(count <= 2);
            }
        }
        // Nothing visible from the WebSearcher.
        assert!(visible.iter().all(|a| *a != "WebSearcher"));
    }

    // ── Search flow (scenario: plan a release) ──────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn search_request_produces_hidden_result_and_event() {
        let mut scripts = default_scripts();
        scripts.insert(
            Role::Quantifier,
            ScriptedModel::new([
                Script::Reply(
                    "@WebSearcher! search for \"release train best practices\"".into(),
                ),
                Script::Reply(
                    "Quantifier: release train best practices suggest a two-week cadence."
                        .into(),
                ),
            ]),
        );
        // The search outlives the other agents' opening turns, so its
        // result lands at the tail of the discussion.
        scripts.insert(
            Role::WebSearcher,
            ScriptedModel::always("Industry benchmark data favors fixed release trains.")
                .with_delay(Duration::from_millis(30)),
        );

        let (store, task_id, outcome) =
            run_engine(scripts, r#"{"input": "Plan a release"}"#).await;
        outcome.unwrap();

        let value = final_value(&store, task_id).await;
        let events = value["web_search_events"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["agent"], "Quantifier");
        assert_eq!(events[0]["query"], "release train best practices");

        let contributions = value["contributions"].as_array().unwrap();
        let hidden: Vec<_> = contributions
            .iter()
            .filter(|c| c["hidden"] == true)
            .collect();
        assert_eq!(hidden.len(), 1);
        assert_eq!(hidden[0]["agent"], "WebSearcher");
        assert!(hidden[0]["content"]
            .as_str()
            .unwrap()
            .starts_with("Search results for 'release train best practices':"));

        // The searcher's answer fed a later visible Quantifier turn.
        assert!(contributions.iter().any(|c| {
            c["agent"] == "Quantifier"
                && c["hidden"] == false
                && c["content"]
                    .as_str()
                    .unwrap()
                    .contains("release train best practices")
        }));

        // Hidden entries do not count toward the total.
        let visible = contributions.iter().filter(|c| c["hidden"] == false).count();
        assert_eq!(value["total_contributions"].as_u64().unwrap() as usize, visible);
        assert_eq!(value["statistics"]["web_searches"], 1);
    }

    // ── Degenerate all-pass run ─────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn all_pass_run_terminates_quickly_with_fixed_summary() {
        let mut scripts = HashMap::new();
        for role in DELIBERATORS {
            scripts.insert(role, ScriptedModel::always("PASS"));
        }
        scripts.insert(
            Role::Summarizer,
            ScriptedModel::always("should never be called"),
        );

        let started = std::time::Instant::now();
        let (store, task_id, outcome) = run_engine(scripts, r#"{"input": "x"}"#).await;
        outcome.unwrap();
        assert!(started.elapsed() < Duration::from_secs(15));

        let record = store.get(task_id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Completed);

        let value = final_value(&store, task_id).await;
        assert_eq!(value["total_contributions"], 0);
        assert_eq!(value["summary"], "No discussion occurred.");
    }

    // ── Rate limit honored mid-run ──────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn rate_limited_turn_waits_and_still_completes() {
        let limit_store = Arc::new(MemoryRateLimitStore::new());
        let limiter = Arc::new(RateLimitCoordinator::new(600, Some(limit_store.clone())));

        let mut scripts = default_scripts();
        scripts.insert(
            Role::Divergent,
            ScriptedModel::new([
                Script::RateLimited {
                    reset_at: Utc::now() + chrono::Duration::milliseconds(200),
                },
                Script::Reply(contribution_text(Role::Divergent)),
            ])
            .with_limiter(limiter.clone()),
        );

        let (store, task_id, outcome) =
            run_engine(scripts, r#"{"input": "Compare two designs for throughput"}"#).await;
        outcome.unwrap();

        let record = store.get(task_id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Completed);

        // The delayed turn still landed.
        let value = final_value(&store, task_id).await;
        assert!(value["contributions"]
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c["agent"] == "Divergent" && c["hidden"] == false));

        // The coordinator persisted the advertised reset instant.
        assert!(limit_store.load("stub", "scripted").unwrap().is_some());
    }

    // ── External stop ───────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn external_stop_completes_with_accrued_contributions() {
        let mut scripts = HashMap::new();
        for role in DELIBERATORS {
            scripts.insert(role, ScriptedModel::always(contribution_text(role)));
        }
        scripts.insert(
            Role::Summarizer,
            ScriptedModel::always("Synthesis of what accrued before the stop."),
        );
        let (registry, _models) = registry_with(scripts);

        let store = Arc::new(RecordingStore::new());
        let config = Config::default();
        // No internal condition can fire: huge dwell, huge cap.
        let tuning = Tuning {
            idle_dwell_samples: 1_000_000,
            seconds_per_round: 1_000.0,
            ..test_tuning()
        };
        let engine = DiscussionEngine::new(&registry, &config, store.clone())
            .unwrap()
            .with_tuning(tuning);

        let task_id = store
            .create(Uuid::new_v4(), None, None, r#"{"input": "keep going"}"#.into())
            .await
            .unwrap();
        let task = store.get(task_id).await.unwrap().unwrap();

        let stop = StopSignal::new();
        let external = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            external.set();
        });

        let started = std::time::Instant::now();
        engine.run_with_stop(&task, stop).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(6));

        let record = store.get(task_id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        let value = final_value(&store, task_id).await;
        assert_eq!(value["summary"], "Synthesis of what accrued before the stop.");
        assert!(value["statistics"].is_object());
    }

    // ── Hard cap ────────────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn hard_cap_bounds_the_run() {
        let mut scripts = HashMap::new();
        for role in DELIBERATORS {
            scripts.insert(role, ScriptedModel::always(contribution_text(role)));
        }
        scripts.insert(Role::Summarizer, ScriptedModel::always("Capped synthesis."));
        let (registry, _models) = registry_with(scripts);

        let store = Arc::new(RecordingStore::new());
        let tuning = Tuning {
            idle_dwell_samples: 1_000_000,
            seconds_per_round: 0.15,
            ..test_tuning()
        };
        let engine = DiscussionEngine::new(&registry, &Config::default(), store.clone())
            .unwrap()
            .with_tuning(tuning);

        let task_id = store
            .create(
                Uuid::new_v4(),
                None,
                None,
                r#"{"input": "never-ending debate", "max_rounds": 2}"#.into(),
            )
            .await
            .unwrap();
        let task = store.get(task_id).await.unwrap().unwrap();

        let started = std::time::Instant::now();
        engine.run(&task).await.unwrap();
        // 2 rounds × 0.15 s plus one tick of slack and the join budget.
        assert!(started.elapsed() < Duration::from_secs(5));

        let record = store.get(task_id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
    }

    // ── Failure path ────────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn synthesis_failure_without_fallback_marks_failed() {
        let mut scripts = HashMap::new();
        // One quick contribution, then passes.
        scripts.insert(
            Role::Divergent,
            ScriptedModel::new([Script::Reply(contribution_text(Role::Divergent))]),
        );
        for role in DELIBERATORS.iter().skip(1) {
            scripts.insert(*role, ScriptedModel::always("PASS"));
        }
        // Summarizer fails every call, so there is no rolling summary to
        // fall back on. The summary loop is effectively disabled so it
        // cannot consume the failure scripts first.
        scripts.insert(
            Role::Summarizer,
            ScriptedModel::new(vec![Script::Transient("down".into()); 8]),
        );
        let (registry, _models) = registry_with(scripts);

        let store = Arc::new(RecordingStore::new());
        let tuning = Tuning {
            summary_interval: Duration::from_secs(600),
            ..test_tuning()
        };
        let engine = DiscussionEngine::new(&registry, &Config::default(), store.clone())
            .unwrap()
            .with_tuning(tuning);

        let task_id = store
            .create(Uuid::new_v4(), None, None, r#"{"input": "q"}"#.into())
            .await
            .unwrap();
        let task = store.get(task_id).await.unwrap().unwrap();

        assert!(engine.run(&task).await.is_err());

        let record = store.get(task_id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        let value: serde_json::Value =
            serde_json::from_str(record.result.as_deref().unwrap()).unwrap();
        assert!(value["error"].as_str().unwrap().contains("down"));
    }

    // ── Context echo ────────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn terminal_snapshot_echoes_context() {
        let (store, task_id, outcome) = run_engine(
            default_scripts(),
            r#"{"input": "follow-up question", "context": "we settled on Rust earlier"}"#,
        )
        .await;
        outcome.unwrap();

        let value = final_value(&store, task_id).await;
        assert_eq!(value["context"], "we settled on Rust earlier");
        assert_eq!(value["task"], "follow-up question");
    }
}
