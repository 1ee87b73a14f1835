//! Cooperative stop signal shared by every worker of a run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A stop flag polled by workers at each tick and before each model call.
///
/// Workers that have already dispatched a model call finish that call and
/// exit at their next check.
#[derive(Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Sleep for `duration`, returning early when the signal fires.
    /// Returns whether the signal is set.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let step = (duration / 10)
            .max(Duration::from_millis(5))
            .min(duration.max(Duration::from_millis(1)));
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            if self.is_set() {
                return true;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return self.is_set();
            }
            tokio::time::sleep(step.min(deadline - now)).await;
        }
    }
}
