//! Web-search arbitration.
//!
//! The WebSearcher agent has a single consumer: at most one search runs at
//! a time. A request arriving while a search is in flight is queued FIFO
//! and acknowledged with a hidden waiting notice; each completed search
//! drains one queued request before the searcher returns to idle, so no
//! request starves in a terminating discussion. A stop signal discards the
//! queue.

use cq_domain::discussion::{AgentPhase, SearchRequest};
use cq_domain::role::Role;

use crate::agents::SearchAgent;
use crate::publish::Publisher;
use crate::state::SharedState;
use crate::stop::StopSignal;

pub struct WebSearchArbiter {
    state: SharedState,
    searcher: SearchAgent,
}

impl WebSearchArbiter {
    pub fn new(state: SharedState, searcher: SearchAgent) -> Self {
        Self { state, searcher }
    }

    /// Submit a search on behalf of `requester`.
    ///
    /// Runs the search in the calling worker's task when the searcher is
    /// idle; otherwise enqueues and returns so the requester resumes its
    /// loop.
    pub async fn request(
        &self,
        requester: &str,
        query: String,
        stop: &StopSignal,
        publisher: &Publisher,
    ) {
        let searcher_name = Role::WebSearcher.name();

        let claimed = self.state.with(|s| {
            if s.phase(searcher_name) == AgentPhase::Searching {
                s.enqueue_search(requester, &query);
                s.set_phase(requester, AgentPhase::Waiting);
                s.append_hidden(
                    searcher_name,
                    format!(
                        "Search queued for {requester}: '{query}' (another search is in progress)"
                    ),
                );
                false
            } else {
                s.set_phase(searcher_name, AgentPhase::Searching);
                s.push_search_event(requester, &query);
                true
            }
        });
        publisher.publish().await;

        if !claimed {
            return;
        }

        let mut current = SearchRequest {
            requester: requester.to_string(),
            query,
        };

        loop {
            let result = self.searcher.search(&current.query, &current.requester).await;

            let next = self.state.with(|s| {
                s.append_hidden(searcher_name, result);
                if stop.is_set() {
                    let dropped = s.clear_search_queue();
                    if dropped > 0 {
                        tracing::debug!(dropped, "discarded queued searches on stop");
                    }
                    s.set_phase(searcher_name, AgentPhase::Idle);
                    None
                } else if let Some(request) = s.dequeue_search() {
                    // Stay in the searching phase and process the oldest
                    // queued request.
                    s.push_search_event(&request.requester, &request.query);
                    Some(request)
                } else {
                    s.set_phase(searcher_name, AgentPhase::Idle);
                    None
                }
            });
            publisher.publish().await;

            match next {
                Some(request) => current = request,
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use cq_domain::config::AgentsConfig;
    use cq_providers::stub::ScriptedModel;
    use cq_store::{MemoryTaskStore, TaskStore};
    use uuid::Uuid;

    async fn fixture(model: ScriptedModel) -> (Arc<WebSearchArbiter>, SharedState, Publisher) {
        let state = SharedState::new();
        let store = Arc::new(MemoryTaskStore::new());
        let task_id = store
            .create(Uuid::new_v4(), None, None, "{}".into())
            .await
            .unwrap();
        let publisher = Publisher::new(store, task_id, "q".into(), state.clone());
        let searcher = SearchAgent::new(Arc::new(model), &AgentsConfig::default()).unwrap();
        (
            Arc::new(WebSearchArbiter::new(state.clone(), searcher)),
            state,
            publisher,
        )
    }

    #[tokio::test]
    async fn idle_searcher_runs_immediately() {
        let (arbiter, state, publisher) = fixture(ScriptedModel::always("cadence data")).await;
        let stop = StopSignal::new();

        arbiter
            .request("Quantifier", "release cadence".into(), &stop, &publisher)
            .await;

        state.with(|s| {
            assert_eq!(s.phase("WebSearcher"), AgentPhase::Idle);
            let hidden: Vec<_> = s.contributions().iter().filter(|c| c.hidden).collect();
            assert_eq!(hidden.len(), 1);
            assert_eq!(hidden[0].agent, "WebSearcher");
            assert!(hidden[0]
                .content
                .starts_with("Search results for 'release cadence':"));
            assert_eq!(s.search_queue_len(), 0);
        });

        let snapshot = state.snapshot("q");
        assert_eq!(snapshot.web_search_events.len(), 1);
        assert_eq!(snapshot.web_search_events[0].agent, "Quantifier");
    }

    #[tokio::test]
    async fn concurrent_requests_are_serialized_fifo() {
        let model = ScriptedModel::new([
            cq_providers::stub::Script::Reply("first result".into()),
            cq_providers::stub::Script::Reply("second result".into()),
        ])
        .with_delay(Duration::from_millis(40));
        let (arbiter, state, publisher) = fixture(model).await;
        let stop = StopSignal::new();

        let first = {
            let (arbiter, publisher, stop) = (arbiter.clone(), publisher.clone(), stop.clone());
            tokio::spawn(async move {
                arbiter
                    .request("Quantifier", "alpha".into(), &stop, &publisher)
                    .await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Second request lands while the first search is in flight.
        arbiter
            .request("Critical", "beta".into(), &stop, &publisher)
            .await;

        // The enqueue path returned immediately with an acknowledgement.
        state.with(|s| {
            assert_eq!(s.phase("Critical"), AgentPhase::Waiting);
            assert!(s
                .contributions()
                .iter()
                .any(|c| c.hidden && c.content.contains("Search queued for Critical")));
        });

        first.await.unwrap();

        state.with(|s| {
            assert_eq!(s.phase("WebSearcher"), AgentPhase::Idle);
            assert_eq!(s.search_queue_len(), 0);
            let results: Vec<_> = s
                .contributions()
                .iter()
                .filter(|c| c.hidden && c.content.starts_with("Search results"))
                .cloned()
                .collect();
            assert_eq!(results.len(), 2);
            assert!(results[0].content.starts_with("Search results for 'alpha':"));
            assert!(results[1].content.starts_with("Search results for 'beta':"));
        });

        let events = state.snapshot("q").web_search_events;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].query, "alpha");
        assert_eq!(events[1].query, "beta");
    }

    #[tokio::test]
    async fn stop_discards_queued_requests() {
        let model = ScriptedModel::always("slow result").with_delay(Duration::from_millis(40));
        let (arbiter, state, publisher) = fixture(model).await;
        let stop = StopSignal::new();

        let first = {
            let (arbiter, publisher, stop) = (arbiter.clone(), publisher.clone(), stop.clone());
            tokio::spawn(async move {
                arbiter
                    .request("Quantifier", "alpha".into(), &stop, &publisher)
                    .await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        arbiter
            .request("Critical", "beta".into(), &stop, &publisher)
            .await;

        stop.set();
        first.await.unwrap();

        state.with(|s| {
            assert_eq!(s.search_queue_len(), 0);
            assert_eq!(s.phase("WebSearcher"), AgentPhase::Idle);
            // Only the in-flight search produced a result.
            let results = s
                .contributions()
                .iter()
                .filter(|c| c.hidden && c.content.starts_with("Search results"))
                .count();
            assert_eq!(results, 1);
        });
    }
}
