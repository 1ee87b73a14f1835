//! Per-session task worker.
//!
//! Polls the store for pending tasks in its session and runs each through
//! the discussion engine. Engine failures are logged and followed by a
//! back-off; cancellation is cooperative and takes effect between tasks.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use cq_engine::{DiscussionEngine, StopSignal};
use cq_store::{with_retry, TaskStore};

pub struct SessionWorker {
    session_id: Uuid,
    store: Arc<dyn TaskStore>,
    engine: Arc<DiscussionEngine>,
    stop: StopSignal,
    poll_interval: Duration,
    error_backoff: Duration,
}

impl SessionWorker {
    pub fn new(
        session_id: Uuid,
        store: Arc<dyn TaskStore>,
        engine: Arc<DiscussionEngine>,
        stop: StopSignal,
    ) -> Self {
        Self {
            session_id,
            store,
            engine,
            stop,
            poll_interval: Duration::from_secs(2),
            error_backoff: Duration::from_secs(5),
        }
    }

    pub fn with_intervals(mut self, poll: Duration, backoff: Duration) -> Self {
        self.poll_interval = poll;
        self.error_backoff = backoff;
        self
    }

    pub async fn run(self) {
        tracing::info!(session_id = %self.session_id, "session worker started");

        loop {
            if self.stop.is_set() {
                break;
            }

            let pending = match with_retry(|| self.store.pending_for_session(self.session_id)).await
            {
                Ok(pending) => pending,
                Err(e) => {
                    tracing::error!(error = %e, "pending-task poll failed");
                    if self.stop.sleep(self.error_backoff).await {
                        break;
                    }
                    continue;
                }
            };

            if pending.is_empty() {
                if self.stop.sleep(self.poll_interval).await {
                    break;
                }
                continue;
            }

            for task in pending {
                // Shutdown takes effect between tasks, never mid-run.
                if self.stop.is_set() {
                    break;
                }
                if let Err(e) = self.engine.run(&task).await {
                    tracing::error!(task_id = %task.id, error = %e, "engine run failed");
                    if self.stop.sleep(self.error_backoff).await {
                        break;
                    }
                }
            }
        }

        tracing::info!(session_id = %self.session_id, "session worker stopped");
    }
}
