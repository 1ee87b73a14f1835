//! Worker supervision.
//!
//! Tracks one [`SessionWorker`] per session. `stop` signals the worker and
//! waits out a bounded join window; a worker that does not exit in time is
//! forcefully aborted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use cq_engine::{DiscussionEngine, StopSignal};
use cq_store::TaskStore;

use crate::worker::SessionWorker;

struct WorkerHandle {
    stop: StopSignal,
    join: JoinHandle<()>,
}

pub struct WorkerSupervisor {
    store: Arc<dyn TaskStore>,
    engine: Arc<DiscussionEngine>,
    workers: Mutex<HashMap<Uuid, WorkerHandle>>,
    join_window: Duration,
    poll_interval: Duration,
    error_backoff: Duration,
}

impl WorkerSupervisor {
    pub fn new(store: Arc<dyn TaskStore>, engine: Arc<DiscussionEngine>) -> Self {
        Self {
            store,
            engine,
            workers: Mutex::new(HashMap::new()),
            join_window: Duration::from_secs(5),
            poll_interval: Duration::from_secs(2),
            error_backoff: Duration::from_secs(5),
        }
    }

    pub fn with_timing(mut self, join_window: Duration, poll: Duration, backoff: Duration) -> Self {
        self.join_window = join_window;
        self.poll_interval = poll;
        self.error_backoff = backoff;
        self
    }

    /// Start a worker for a session. Returns false when one already runs.
    pub fn start(&self, session_id: Uuid) -> bool {
        let mut workers = self.workers.lock();
        if workers.contains_key(&session_id) {
            tracing::warn!(%session_id, "worker already exists");
            return false;
        }

        let stop = StopSignal::new();
        let worker = SessionWorker::new(
            session_id,
            self.store.clone(),
            self.engine.clone(),
            stop.clone(),
        )
        .with_intervals(self.poll_interval, self.error_backoff);

        let span = tracing::info_span!("session_worker", %session_id);
        let join = tokio::spawn(tracing::Instrument::instrument(worker.run(), span));

        workers.insert(session_id, WorkerHandle { stop, join });
        tracing::info!(%session_id, "worker started");
        true
    }

    /// Stop a session's worker: signal, wait out the join window, abort if
    /// still alive. Returns false when no worker exists.
    pub async fn stop(&self, session_id: Uuid) -> bool {
        let handle = self.workers.lock().remove(&session_id);
        let Some(mut handle) = handle else {
            tracing::warn!(%session_id, "no worker to stop");
            return false;
        };

        handle.stop.set();
        if tokio::time::timeout(self.join_window, &mut handle.join)
            .await
            .is_err()
        {
            tracing::warn!(%session_id, "worker did not exit in join window, aborting");
            handle.join.abort();
        }
        tracing::info!(%session_id, "worker stopped");
        true
    }

    pub async fn stop_all(&self) {
        let session_ids: Vec<Uuid> = self.workers.lock().keys().copied().collect();
        tracing::info!(count = session_ids.len(), "stopping all workers");
        for session_id in session_ids {
            self.stop(session_id).await;
        }
    }

    pub fn is_running(&self, session_id: Uuid) -> bool {
        self.workers.lock().contains_key(&session_id)
    }

    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.lock().is_empty()
    }
}
