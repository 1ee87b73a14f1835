//! Scripted stub model for tests.
//!
//! Each `generate` call pops the next [`Script`] item; an exhausted script
//! falls back to a fixed reply. No network access anywhere.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use cq_domain::error::{Error, Result};
use cq_domain::stream::BoxStream;

use crate::limiter::RateLimitCoordinator;
use crate::traits::{GenerateRequest, LanguageModel};

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum Script {
    Reply(String),
    RateLimited { reset_at: DateTime<Utc> },
    Transient(String),
    Auth(String),
}

/// A pre-scripted [`LanguageModel`].
pub struct ScriptedModel {
    model: String,
    scripts: Mutex<VecDeque<Script>>,
    fallback: String,
    /// Every request seen, for assertions on prompt construction.
    pub requests: Mutex<Vec<GenerateRequest>>,
    /// When set, rate-limited script items register their cooldown with the
    /// coordinator the way the real adapter does.
    limiter: Option<Arc<RateLimitCoordinator>>,
    /// Artificial round-trip latency.
    delay: std::time::Duration,
}

impl ScriptedModel {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            model: "scripted".into(),
            scripts: Mutex::new(scripts.into_iter().collect()),
            fallback: "PASS".into(),
            requests: Mutex::new(Vec::new()),
            limiter: None,
            delay: std::time::Duration::ZERO,
        }
    }

    /// A model that answers every call with the same text.
    pub fn always(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        let mut stub = Self::new([]);
        stub.fallback = reply;
        stub
    }

    /// Reply used once the script runs dry (defaults to `PASS`).
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = reply.into();
        self
    }

    pub fn with_limiter(mut self, limiter: Arc<RateLimitCoordinator>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Sleep this long before answering, to model network latency.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_outcome(&self) -> Script {
        self.scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| Script::Reply(self.fallback.clone()))
    }
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, req: GenerateRequest) -> Result<String> {
        self.requests.lock().push(req);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.next_outcome() {
            Script::Reply(text) => Ok(text),
            Script::RateLimited { reset_at } => {
                if let Some(limiter) = &self.limiter {
                    limiter.note_rate_limited(self.provider_id(), &self.model, reset_at);
                }
                Err(Error::RateLimited { reset_at })
            }
            Script::Transient(msg) => Err(Error::Transient(msg)),
            Script::Auth(msg) => Err(Error::Auth(msg)),
        }
    }

    async fn generate_stream(
        &self,
        req: GenerateRequest,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let text = self.generate(req).await?;
        Ok(Box::pin(futures_util::stream::iter([Ok(text)])))
    }

    fn provider_id(&self) -> &str {
        "stub"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
