//! OpenRouter adapter.
//!
//! Speaks the OpenAI-compatible chat-completions contract at
//! `{base_url}/chat/completions`. All requests pass through the shared
//! [`RateLimitCoordinator`]; 429 responses feed the coordinator's cooldown
//! and are waited out rather than failing the caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use cq_domain::config::OpenRouterConfig;
use cq_domain::error::{Error, Result};
use cq_domain::stream::BoxStream;

use crate::limiter::RateLimitCoordinator;
use crate::sse::text_chunk_stream;
use crate::traits::{GenerateRequest, LanguageModel};

const PROVIDER_ID: &str = "openrouter";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A language model served through OpenRouter.
pub struct OpenRouterModel {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    limiter: Arc<RateLimitCoordinator>,
    max_retries: u32,
    retry_delay: Duration,
}

impl std::fmt::Debug for OpenRouterModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterModel")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

impl OpenRouterModel {
    /// Build an adapter for `model` (defaults to the configured model).
    pub fn from_config(
        cfg: &OpenRouterConfig,
        model: Option<&str>,
        limiter: Arc<RateLimitCoordinator>,
    ) -> Result<Self> {
        if cfg.api_key.trim().is_empty() {
            return Err(Error::Auth(
                "OpenRouter API key is required; set OPENROUTER_API_KEY".into(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: model.unwrap_or(&cfg.model).to_string(),
            client,
            limiter,
            max_retries: cfg.max_retries,
            retry_delay: Duration::from_secs(cfg.retry_delay_seconds),
        })
    }

    // ── Internal: request plumbing ─────────────────────────────────

    fn build_body(&self, req: &GenerateRequest, stream: bool) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": req.prompt}));

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": req.temperature,
            "stream": stream,
        });
        if let Some(max) = req.max_tokens.filter(|m| *m > 0) {
            body["max_tokens"] = serde_json::json!(max);
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", "https://github.com/colloquy/colloquy")
            .header("X-Title", "Colloquy")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    Error::Transient(format!("openrouter: {e}"))
                } else {
                    Error::ProviderUnavailable(format!("openrouter: {e}"))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(response.headers());
        let detail = response.text().await.unwrap_or_default();
        Err(classify_status(
            status.as_u16(),
            retry_after,
            self.retry_delay,
            &detail,
        ))
    }

    /// One full request with retry policy: rate limits are waited out via
    /// the coordinator without consuming attempts; transient failures back
    /// off `retry_delay × attempt` up to `max_retries`.
    async fn request_with_retry(&self, body: &Value) -> Result<reqwest::Response> {
        let mut attempt: u32 = 0;
        loop {
            self.limiter.acquire(PROVIDER_ID, &self.model).await;

            match self.post(body).await {
                Ok(response) => return Ok(response),
                Err(Error::RateLimited { reset_at }) => {
                    self.limiter.note_rate_limited(PROVIDER_ID, &self.model, reset_at);
                    // acquire() on the next iteration sleeps until reset.
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let wait = self.retry_delay * attempt;
                    tracing::warn!(
                        model = %self.model,
                        attempt,
                        wait_seconds = wait.as_secs(),
                        error = %e,
                        "transient provider error, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_content(value: &Value) -> Result<String> {
    value["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::Transient("response missing message content".into()))
}

fn parse_delta(data: &str) -> Option<String> {
    let value: Value = serde_json::from_str(data).ok()?;
    value["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Map an HTTP status to the error taxonomy.
fn classify_status(
    status: u16,
    retry_after: Option<f64>,
    retry_delay: Duration,
    detail: &str,
) -> Error {
    match status {
        401 | 403 => Error::Auth(format!("openrouter rejected credentials ({status})")),
        429 => {
            let seconds = retry_after.unwrap_or(retry_delay.as_secs_f64());
            let reset_at = Utc::now() + chrono::Duration::milliseconds((seconds * 1000.0) as i64);
            Error::RateLimited { reset_at }
        }
        500..=599 => Error::ProviderUnavailable(format!("openrouter {status}: {detail}")),
        _ => Error::Transient(format!("openrouter {status}: {detail}")),
    }
}

/// Seconds until reset from `Retry-After` (delta seconds) or
/// `X-RateLimit-Reset` (unix milliseconds).
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<f64> {
    if let Some(value) = headers.get("retry-after") {
        if let Ok(seconds) = value.to_str().unwrap_or("").parse::<f64>() {
            return Some(seconds.max(0.0));
        }
    }
    if let Some(value) = headers.get("x-ratelimit-reset") {
        if let Ok(reset_ms) = value.to_str().unwrap_or("").parse::<i64>() {
            let now_ms = Utc::now().timestamp_millis();
            return Some(((reset_ms - now_ms) as f64 / 1000.0).max(0.0));
        }
    }
    None
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LanguageModel impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LanguageModel for OpenRouterModel {
    async fn generate(&self, req: GenerateRequest) -> Result<String> {
        let body = self.build_body(&req, false);
        let response = self.request_with_retry(&body).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| Error::Transient(format!("decode response: {e}")))?;
        parse_content(&value)
    }

    async fn generate_stream(
        &self,
        req: GenerateRequest,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let body = self.build_body(&req, true);
        let response = self.request_with_retry(&body).await?;
        Ok(text_chunk_stream(response, parse_delta))
    }

    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
