//! Fixed-window counter engine (C2).
//!
//! Semantics are deliberately fixed-window, not sliding (spec section 4.2).
//! Admission rule resolves the open question flagged in spec section 9: the
//! source mixed `>` and `>=` when comparing count to limit; this crate
//! always admits iff the post-increment count is `<= limit`.

use crate::errors::KvError;
use crate::kv_store::KvStore;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterResult {
    pub count: i64,
    pub allowed: bool,
    pub reset_at: i64,
}

pub struct CounterEngine {
    store: Arc<dyn KvStore>,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl CounterEngine {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn bucket(window_seconds: u64) -> i64 {
        now_unix() / window_seconds.max(1) as i64
    }

    fn key(domain: &str, subject: &str, window_name: &str, bucket: i64) -> String {
        format!("{domain}:{subject}:{window_name}:{bucket}")
    }

    /// Increments the counter for `(domain, subject, window_name)` and
    /// returns whether the post-increment count is within `limit`.
    ///
    /// `limit == -1` means unbounded and short-circuits without a store
    /// round-trip (spec section 4.2).
    pub async fn check(
        &self,
        domain: &str,
        subject: &str,
        window_name: &str,
        window_seconds: u64,
        limit: i64,
    ) -> Result<CounterResult, KvError> {
        let bucket = Self::bucket(window_seconds);
        let reset_at = (bucket + 1) * window_seconds as i64;

        if limit == -1 {
            return Ok(CounterResult {
                count: 0,
                allowed: true,
                reset_at,
            });
        }

        let key = Self::key(domain, subject, window_name, bucket);
        // Bucket TTL >= 2x window guarantees the key outlives the window it
        // was created in even under clock skew between caller and store
        // (spec section 4.2, glossary "Bucket TTL").
        let ttl = Duration::from_secs(window_seconds * 2);
        let count = self.store.incr_and_expire(&key, ttl).await?;

        Ok(CounterResult {
            count,
            allowed: count <= limit,
            reset_at,
        })
    }

    /// Increments the counter for `(domain, subject, window_name)` without
    /// any admission check, for observability-only counters that never gate
    /// a request (spec section 4.4: user/endpoint minute/hour/day tallies
    /// incremented after the chain admits a request).
    pub async fn record(
        &self,
        domain: &str,
        subject: &str,
        window_name: &str,
        window_seconds: u64,
    ) -> Result<i64, KvError> {
        let bucket = Self::bucket(window_seconds);
        let key = Self::key(domain, subject, window_name, bucket);
        let ttl = Duration::from_secs(window_seconds * 2);
        self.store.incr_and_expire(&key, ttl).await
    }

    /// Reads the current count for `(domain, subject, window_name)` without
    /// incrementing. For stats/testing only — the hot path never reads
    /// without incrementing (spec section 4.2).
    pub async fn peek(
        &self,
        domain: &str,
        subject: &str,
        window_name: &str,
        window_seconds: u64,
    ) -> Result<i64, KvError> {
        let bucket = Self::bucket(window_seconds);
        let key = Self::key(domain, subject, window_name, bucket);
        Ok(self.store.get(&key).await?.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::memory::InMemoryKvStore;

    fn engine() -> CounterEngine {
        CounterEngine::new(Arc::new(InMemoryKvStore::new()))
    }

    #[tokio::test]
    async fn admits_exactly_at_limit() {
        let engine = engine();
        for i in 1..=5 {
            let r = engine.check("tier", "u1", "minute", 60, 5).await.unwrap();
            assert_eq!(r.count, i);
            assert!(r.allowed, "request {i} should be admitted at limit 5");
        }
        let sixth = engine.check("tier", "u1", "minute", 60, 5).await.unwrap();
        assert!(!sixth.allowed);
        assert_eq!(sixth.count, 6);
    }

    #[tokio::test]
    async fn unbounded_limit_always_allows() {
        let engine = engine();
        for _ in 0..1000 {
            let r = engine.check("tier", "u1", "day", 86400, -1).await.unwrap();
            assert!(r.allowed);
        }
    }

    #[tokio::test]
    async fn distinct_subjects_do_not_share_counters() {
        let engine = engine();
        let a = engine.check("ip", "1.1.1.1", "minute", 60, 1).await.unwrap();
        let b = engine.check("ip", "2.2.2.2", "minute", 60, 1).await.unwrap();
        assert!(a.allowed);
        assert!(b.allowed);
    }

    #[tokio::test]
    async fn peek_does_not_increment() {
        let engine = engine();
        engine.check("tier", "u1", "minute", 60, 10).await.unwrap();
        let peeked_a = engine.peek("tier", "u1", "minute", 60).await.unwrap();
        let peeked_b = engine.peek("tier", "u1", "minute", 60).await.unwrap();
        assert_eq!(peeked_a, 1);
        assert_eq!(peeked_b, 1);
    }

    #[tokio::test]
    async fn record_increments_without_gating() {
        let engine = engine();
        for i in 1..=200 {
            let count = engine.record("observability_user", "u1", "minute", 60).await.unwrap();
            assert_eq!(count, i);
        }
    }

    #[tokio::test]
    async fn reset_at_is_end_of_current_bucket() {
        let engine = engine();
        let r = engine.check("tier", "u1", "minute", 60, 10).await.unwrap();
        let now = now_unix();
        assert!(r.reset_at > now);
        assert!(r.reset_at <= now + 60);
    }
}
