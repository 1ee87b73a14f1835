//! Shared rate-limit coordinator.
//!
//! One process-scoped [`RateLimitCoordinator`] is passed by `Arc` into every
//! adapter. Per `(provider, model)` it keeps a token bucket (capacity =
//! requests per minute, continuous refill) plus a cooldown deadline set when
//! a provider answers 429. Cooldown deadlines are persisted through a
//! [`RateLimitStore`] so a restarted worker keeps honoring them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use cq_domain::error::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persistence contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A persisted rate-limit row for one `(provider, model)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedLimit {
    pub reset_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    pub updated_at: DateTime<Utc>,
}

/// Backend that survives process restarts. Implemented by the store crate.
pub trait RateLimitStore: Send + Sync {
    fn load(&self, provider: &str, model: &str) -> Result<Option<PersistedLimit>>;
    fn save(&self, provider: &str, model: &str, row: &PersistedLimit) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Coordinator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    cooldown_until: Option<DateTime<Utc>>,
}

/// Process-global request pacing for external model calls.
pub struct RateLimitCoordinator {
    capacity: f64,
    refill_per_second: f64,
    buckets: Mutex<HashMap<(String, String), Bucket>>,
    store: Option<Arc<dyn RateLimitStore>>,
}

impl RateLimitCoordinator {
    pub fn new(requests_per_minute: u32, store: Option<Arc<dyn RateLimitStore>>) -> Self {
        let capacity = f64::from(requests_per_minute.max(1));
        Self {
            capacity,
            refill_per_second: capacity / 60.0,
            buckets: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Block until a request slot is available: bucket ≥ 1 token AND the
    /// current time is past any cooldown deadline.
    pub async fn acquire(&self, provider: &str, model: &str) {
        loop {
            let wait = self.try_take(provider, model);
            match wait {
                None => return,
                Some(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Record a provider-advertised cooldown and persist it.
    pub fn note_rate_limited(&self, provider: &str, model: &str, reset_at: DateTime<Utc>) {
        {
            let mut buckets = self.buckets.lock();
            let bucket = self.bucket_entry(&mut buckets, provider, model);
            // Keep the later deadline if two calls race.
            if bucket.cooldown_until.map_or(true, |cur| reset_at > cur) {
                bucket.cooldown_until = Some(reset_at);
            }
        }

        tracing::warn!(provider, model, %reset_at, "rate limited, cooling down");

        if let Some(store) = &self.store {
            let row = PersistedLimit {
                reset_at,
                remaining: Some(0),
                limit: Some(self.capacity as u32),
                updated_at: Utc::now(),
            };
            if let Err(e) = store.save(provider, model, &row) {
                tracing::warn!(provider, model, error = %e, "failed to persist rate limit");
            }
        }
    }

    /// The active cooldown deadline, if any.
    pub fn cooldown_until(&self, provider: &str, model: &str) -> Option<DateTime<Utc>> {
        let mut buckets = self.buckets.lock();
        let bucket = self.bucket_entry(&mut buckets, provider, model);
        bucket.cooldown_until.filter(|t| *t > Utc::now())
    }

    // ── Private ──────────────────────────────────────────────────────

    /// Take one token if possible, otherwise return how long to wait.
    fn try_take(&self, provider: &str, model: &str) -> Option<Duration> {
        let now = Utc::now();
        let mut buckets = self.buckets.lock();
        let bucket = self.bucket_entry(&mut buckets, provider, model);

        if let Some(until) = bucket.cooldown_until {
            if until > now {
                let wait = (until - now).to_std().unwrap_or(Duration::from_millis(50));
                return Some(wait);
            }
            bucket.cooldown_until = None;
        }

        // Continuous refill since the last observation.
        let elapsed = bucket.last_refill.elapsed().as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_second).min(self.capacity);
        bucket.last_refill = Instant::now();

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - bucket.tokens;
            Some(Duration::from_secs_f64(deficit / self.refill_per_second))
        }
    }

    /// Look up a bucket, loading any persisted cooldown on first touch.
    fn bucket_entry<'a>(
        &self,
        buckets: &'a mut HashMap<(String, String), Bucket>,
        provider: &str,
        model: &str,
    ) -> &'a mut Bucket {
        let key = (provider.to_string(), model.to_string());
        if !buckets.contains_key(&key) {
            let persisted = self
                .store
                .as_ref()
                .and_then(|s| s.load(provider, model).ok().flatten())
                .map(|row| row.reset_at)
                .filter(|reset| *reset > Utc::now());
            buckets.insert(
                key.clone(),
                Bucket {
                    tokens: self.capacity,
                    last_refill: Instant::now(),
                    cooldown_until: persisted,
                },
            );
        }
        buckets.get_mut(&key).expect("bucket just inserted")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;

    #[derive(Default)]
    struct FakeStore {
        rows: RwLock<HashMap<String, PersistedLimit>>,
    }

    impl RateLimitStore for FakeStore {
        fn load(&self, provider: &str, model: &str) -> Result<Option<PersistedLimit>> {
            Ok(self.rows.read().get(&format!("{provider}/{model}")).cloned())
        }

        fn save(&self, provider: &str, model: &str, row: &PersistedLimit) -> Result<()> {
            self.rows
                .write()
                .insert(format!("{provider}/{model}"), row.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn acquire_is_immediate_with_full_bucket() {
        let limiter = RateLimitCoordinator::new(60, None);
        let start = std::time::Instant::now();
        limiter.acquire("openrouter", "m").await;
        limiter.acquire("openrouter", "m").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn acquire_waits_for_refill_when_exhausted() {
        // 60 rpm = 1 token/second; capacity 60 but drain it first.
        let limiter = RateLimitCoordinator::new(60, None);
        {
            let mut buckets = limiter.buckets.lock();
            let bucket = limiter.bucket_entry(&mut buckets, "p", "m");
            bucket.tokens = 0.0;
        }
        let start = std::time::Instant::now();
        limiter.acquire("p", "m").await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(800), "waited {waited:?}");
    }

    #[tokio::test]
    async fn cooldown_blocks_until_reset() {
        let limiter = RateLimitCoordinator::new(600, None);
        let reset = Utc::now() + chrono::Duration::milliseconds(300);
        limiter.note_rate_limited("p", "m", reset);

        let start = std::time::Instant::now();
        limiter.acquire("p", "m").await;
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn cooldown_persisted_and_reloaded() {
        let store = Arc::new(FakeStore::default());
        let reset = Utc::now() + chrono::Duration::seconds(120);

        let limiter = RateLimitCoordinator::new(60, Some(store.clone()));
        limiter.note_rate_limited("openrouter", "m", reset);
        assert!(store.rows.read().contains_key("openrouter/m"));

        // A fresh coordinator (restarted worker) picks the deadline back up.
        let restarted = RateLimitCoordinator::new(60, Some(store));
        let cooldown = restarted.cooldown_until("openrouter", "m");
        assert_eq!(cooldown.map(|t| t.timestamp()), Some(reset.timestamp()));
    }

    #[tokio::test]
    async fn expired_persisted_cooldown_is_ignored() {
        let store = Arc::new(FakeStore::default());
        store
            .save(
                "p",
                "m",
                &PersistedLimit {
                    reset_at: Utc::now() - chrono::Duration::seconds(5),
                    remaining: None,
                    limit: None,
                    updated_at: Utc::now(),
                },
            )
            .unwrap();

        let limiter = RateLimitCoordinator::new(60, Some(store));
        assert!(limiter.cooldown_until("p", "m").is_none());
    }

    #[tokio::test]
    async fn later_deadline_wins() {
        let limiter = RateLimitCoordinator::new(60, None);
        let near = Utc::now() + chrono::Duration::seconds(10);
        let far = Utc::now() + chrono::Duration::seconds(60);
        limiter.note_rate_limited("p", "m", far);
        limiter.note_rate_limited("p", "m", near);
        let cooldown = limiter.cooldown_until("p", "m").unwrap();
        assert_eq!(cooldown.timestamp(), far.timestamp());
    }

    #[tokio::test]
    async fn buckets_are_independent_per_model() {
        let limiter = RateLimitCoordinator::new(60, None);
        limiter.note_rate_limited("p", "a", Utc::now() + chrono::Duration::seconds(60));
        assert!(limiter.cooldown_until("p", "a").is_some());
        assert!(limiter.cooldown_until("p", "b").is_none());
    }
}
