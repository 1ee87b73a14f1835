//! Rolling-summary side loop.
//!
//! Wakes on a fixed cadence, re-summarizes when the visible contribution
//! count moved, and republishes. Summarizer failures are logged and
//! swallowed; the discussion is never gated on summarization.

use std::sync::Arc;
use std::time::Duration;

use crate::agents::Summarizer;
use crate::publish::Publisher;
use crate::state::SharedState;
use crate::stop::StopSignal;

pub async fn run(
    state: SharedState,
    summarizer: Arc<Summarizer>,
    user_input: String,
    publisher: Publisher,
    stop: StopSignal,
    interval: Duration,
) {
    loop {
        if stop.sleep(interval).await {
            break;
        }

        let work = state.with(|s| s.summary_work());
        let Some((material, count)) = work else {
            continue;
        };

        match summarizer.rolling(&user_input, &material).await {
            Ok(text) => {
                state.with(|s| s.set_rolling_summary(text, count));
                publisher.publish().await;
                tracing::debug!(contributions = count, "rolling summary updated");
            }
            Err(e) => {
                tracing::warn!(error = %e, "rolling summary failed");
            }
        }
    }
}
