use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The outcome of a rate-limit check.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests left in the current window (0 when rejected).
    pub remaining: u32,
    /// When the current window resets; a backoff hint for rejected clients.
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Seconds until the window resets, clamped to >= 0.
    pub fn retry_after_secs(&self) -> i64 {
        (self.reset_at - Utc::now()).num_seconds().max(0)
    }
}

/// Backing store for fixed-window counters.
///
/// The in-memory store is correct for a single process only; a shared store
/// (Redis) is required before running more than one instance.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Records a hit against `key` and decides whether it is allowed.
    async fn hit(&self, key: &str, window: Duration, max: u32) -> Result<RateLimitDecision>;

    /// Removes windows whose reset time has passed.
    async fn sweep(&self);
}

struct WindowEntry {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Process-local fixed-window store.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    windows: Mutex<HashMap<String, WindowEntry>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn hit_at(
        &self,
        key: &str,
        window: Duration,
        max: u32,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let mut windows = self.windows.lock().expect("rate limit lock poisoned");

        match windows.get_mut(key) {
            Some(entry) if now < entry.reset_at => {
                entry.count += 1;
                RateLimitDecision {
                    allowed: entry.count <= max,
                    remaining: max.saturating_sub(entry.count),
                    reset_at: entry.reset_at,
                }
            }
            // No window yet, or the previous one lapsed: restart at 1.
            _ => {
                let reset_at = now + window;
                windows.insert(
                    key.to_string(),
                    WindowEntry {
                        count: 1,
                        reset_at,
                    },
                );
                RateLimitDecision {
                    allowed: max >= 1,
                    remaining: max.saturating_sub(1),
                    reset_at,
                }
            }
        }
    }

    fn sweep_at(&self, now: DateTime<Utc>) {
        let mut windows = self.windows.lock().expect("rate limit lock poisoned");
        windows.retain(|_, entry| entry.reset_at > now);
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(&self, key: &str, window: Duration, max: u32) -> Result<RateLimitDecision> {
        Ok(self.hit_at(key, window, max, Utc::now()))
    }

    async fn sweep(&self) {
        self.sweep_at(Utc::now());
    }
}

/// Redis-backed fixed-window store for multi-instance deployments.
pub struct RedisRateLimitStore {
    conn: ConnectionManager,
}

impl RedisRateLimitStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(&self, key: &str, window: Duration, max: u32) -> Result<RateLimitDecision> {
        let mut conn = self.conn.clone();
        let key = format!("rate_limit:{}", key);

        let count: i64 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(AppError::Redis)?;

        if count == 1 {
            let _: () = redis::cmd("EXPIRE")
                .arg(&key)
                .arg(window.num_seconds())
                .query_async(&mut conn)
                .await
                .map_err(AppError::Redis)?;
        }

        let ttl: i64 = redis::cmd("TTL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(AppError::Redis)?;

        let reset_at = Utc::now() + Duration::seconds(ttl.max(0));
        let count = u32::try_from(count).unwrap_or(u32::MAX);

        Ok(RateLimitDecision {
            allowed: count <= max,
            remaining: max.saturating_sub(count),
            reset_at,
        })
    }

    async fn sweep(&self) {
        // Redis expires windows server-side.
    }
}

/// Fixed-window request throttling per identifier.
///
/// Advisory, best-effort defense: it protects capacity and slows abuse but
/// is not a correctness mechanism for any voting invariant.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    /// A limiter over the process-local store.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryRateLimitStore::new()),
        }
    }

    /// A limiter over an injected store.
    pub fn with_store(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Records a hit and returns the decision.
    pub async fn check(
        &self,
        identifier: &str,
        window: Duration,
        max: u32,
    ) -> Result<RateLimitDecision> {
        self.store.hit(identifier, window, max).await
    }

    /// Records a hit and rejects with the retry hint when over the limit.
    pub async fn enforce(&self, identifier: &str, window: Duration, max: u32) -> Result<()> {
        let decision = self.check(identifier, window, max).await?;
        if !decision.allowed {
            return Err(AppError::RateLimited {
                retry_after_secs: decision.retry_after_secs(),
            });
        }
        Ok(())
    }

    /// Drops lapsed windows.
    pub async fn sweep(&self) {
        self.store.sweep().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eleventh_request_in_window_is_rejected() {
        let store = MemoryRateLimitStore::new();
        let now = Utc::now();
        let window = Duration::seconds(60);

        for i in 1..=10 {
            let decision = store.hit_at("voter-1", window, 10, now);
            assert!(decision.allowed, "request {} should pass", i);
        }

        let decision = store.hit_at("voter-1", window, 10, now);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_at, now + window);
    }

    #[test]
    fn counter_restarts_after_the_window_lapses() {
        let store = MemoryRateLimitStore::new();
        let now = Utc::now();
        let window = Duration::seconds(60);

        for _ in 0..11 {
            store.hit_at("voter-1", window, 10, now);
        }

        let later = now + Duration::seconds(61);
        let decision = store.hit_at("voter-1", window, 10, later);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 9);
        assert_eq!(decision.reset_at, later + window);
    }

    #[test]
    fn identifiers_are_independent() {
        let store = MemoryRateLimitStore::new();
        let now = Utc::now();
        let window = Duration::seconds(60);

        for _ in 0..3 {
            store.hit_at("voter-1", window, 2, now);
        }
        let decision = store.hit_at("voter-2", window, 2, now);
        assert!(decision.allowed);
    }

    #[test]
    fn sweep_drops_only_lapsed_windows() {
        let store = MemoryRateLimitStore::new();
        let now = Utc::now();

        store.hit_at("old", Duration::seconds(10), 5, now);
        store.hit_at("fresh", Duration::seconds(120), 5, now);

        store.sweep_at(now + Duration::seconds(30));

        let windows = store.windows.lock().unwrap();
        assert!(!windows.contains_key("old"));
        assert!(windows.contains_key("fresh"));
    }
}
