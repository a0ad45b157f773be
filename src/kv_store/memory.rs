//! `DashMap`-backed in-memory `KvStore`.
//!
//! Grounded on the teacher's `CacheManager` (`src/cache.rs`): lock-free
//! concurrent maps via `dashmap`, with a background sweep standing in for
//! the teacher's `maybe_evict_pool_state` manual eviction. Used for tests
//! and for single-process deployments that don't need a shared Redis.

use crate::errors::KvError;
use crate::kv_store::KvStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(t) if t <= now)
    }
}

/// In-memory store. Sweeping is lazy (checked on access) plus an optional
/// background task (`spawn_sweeper`) for keys nobody reads again.
pub struct InMemoryKvStore {
    data: Arc<DashMap<String, Entry>>,
    sets: Arc<DashMap<String, DashMap<String, ()>>>,
    hashes: Arc<DashMap<String, DashMap<String, String>>>,
    set_expiry: Arc<DashMap<String, Instant>>,
    hash_expiry: Arc<DashMap<String, Instant>>,
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            sets: Arc::new(DashMap::new()),
            hashes: Arc::new(DashMap::new()),
            set_expiry: Arc::new(DashMap::new()),
            hash_expiry: Arc::new(DashMap::new()),
        }
    }

    /// Spawns a periodic background sweep that evicts expired keys so an
    /// idle store doesn't grow unbounded between accesses.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) {
        let data = self.data.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let before = data.len();
                data.retain(|_, entry| !entry.is_expired(now));
                let removed = before - data.len();
                if removed > 0 {
                    debug!(removed, "swept expired in-memory KV entries");
                }
            }
        });
    }

    fn read_int(&self, key: &str) -> Option<i64> {
        let now = Instant::now();
        let entry = self.data.get(key)?;
        if entry.is_expired(now) {
            return None;
        }
        std::str::from_utf8(&entry.value).ok()?.parse::<i64>().ok()
    }

    fn set_is_expired(&self, key: &str) -> bool {
        matches!(self.set_expiry.get(key), Some(at) if *at <= Instant::now())
    }

    fn hash_is_expired(&self, key: &str) -> bool {
        matches!(self.hash_expiry.get(key), Some(at) if *at <= Instant::now())
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        let now = Instant::now();
        let mut next = 1_i64;
        self.data
            .entry(key.to_string())
            .and_modify(|entry| {
                if entry.is_expired(now) {
                    entry.value = b"1".to_vec();
                    entry.expires_at = None;
                } else {
                    let current: i64 = std::str::from_utf8(&entry.value)
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0);
                    next = current + 1;
                    entry.value = next.to_string().into_bytes();
                }
            })
            .or_insert_with(|| Entry {
                value: b"1".to_vec(),
                expires_at: None,
            });
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), KvError> {
        let at = Instant::now() + ttl;
        if let Some(mut entry) = self.data.get_mut(key) {
            entry.expires_at = Some(at);
        }
        // Sets and hashes don't carry per-entry expiry like `data` does, so
        // TTL is tracked alongside them and checked lazily on read (same
        // style as `is_expired` above).
        if self.sets.contains_key(key) {
            self.set_expiry.insert(key.to_string(), at);
        }
        if self.hashes.contains_key(key) {
            self.hash_expiry.insert(key.to_string(), at);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, KvError> {
        Ok(self.read_int(key))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), KvError> {
        self.data.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_str(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        self.set(key, value.as_bytes(), ttl).await
    }

    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let now = Instant::now();
        Ok(self.data.get(key).and_then(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.value.clone())
            }
        }))
    }

    async fn del(&self, keys: &[String]) -> Result<(), KvError> {
        for key in keys {
            self.data.remove(key);
            self.sets.remove(key);
            self.hashes.remove(key);
            self.set_expiry.remove(key);
            self.hash_expiry.remove(key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let now = Instant::now();
        Ok(self
            .data
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError> {
        self.hashes
            .entry(key.to_string())
            .or_insert_with(DashMap::new)
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, KvError> {
        if self.hash_is_expired(key) {
            self.hashes.remove(key);
            self.hash_expiry.remove(key);
            return Ok(HashMap::new());
        }
        Ok(self
            .hashes
            .get(key)
            .map(|m| m.iter().map(|e| (e.key().clone(), e.value().clone())).collect())
            .unwrap_or_default())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), KvError> {
        if self.set_is_expired(key) {
            self.sets.remove(key);
            self.set_expiry.remove(key);
        }
        self.sets
            .entry(key.to_string())
            .or_insert_with(DashMap::new)
            .insert(member.to_string(), ());
        Ok(())
    }

    async fn scard(&self, key: &str) -> Result<i64, KvError> {
        if self.set_is_expired(key) {
            self.sets.remove(key);
            self.set_expiry.remove(key);
            return Ok(0);
        }
        Ok(self.sets.get(key).map(|s| s.len() as i64).unwrap_or(0))
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        // Only the trailing-`*` prefix form used throughout this crate
        // (`block:ip:*`, `pool:state:*`-style patterns) is supported.
        let prefix = pattern.trim_end_matches('*');
        let mut keys: Vec<String> = self
            .data
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect();
        keys.extend(
            self.sets
                .iter()
                .map(|e| e.key().clone())
                .filter(|k| k.starts_with(prefix)),
        );
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_and_expire_returns_post_increment_count() {
        let store = InMemoryKvStore::new();
        let a = store.incr_and_expire("k", Duration::from_secs(60)).await.unwrap();
        let b = store.incr_and_expire("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[tokio::test]
    async fn absence_is_distinguished_from_zero() {
        let store = InMemoryKvStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);
        store.set_str("present", "0", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("present").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn expired_key_reads_as_absent() {
        let store = InMemoryKvStore::new();
        store.set_str("k", "1", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_prefix_matches() {
        let store = InMemoryKvStore::new();
        store.set_str("block:ip:1.2.3.4", "x", Duration::from_secs(60)).await.unwrap();
        store.set_str("block:ip:5.6.7.8", "x", Duration::from_secs(60)).await.unwrap();
        store.set_str("other:key", "x", Duration::from_secs(60)).await.unwrap();
        let mut found = store.scan("block:ip:*").await.unwrap();
        found.sort();
        assert_eq!(found, vec!["block:ip:1.2.3.4", "block:ip:5.6.7.8"]);
    }

    #[tokio::test]
    async fn set_expiry_clears_membership() {
        let store = InMemoryKvStore::new();
        store.sadd("scan:1.2.3.4:endpoints", "/a").await.unwrap();
        store.expire("scan:1.2.3.4:endpoints", Duration::from_millis(10)).await.unwrap();
        assert_eq!(store.scard("scan:1.2.3.4:endpoints").await.unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.scard("scan:1.2.3.4:endpoints").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn hash_expiry_clears_fields() {
        let store = InMemoryKvStore::new();
        store.hset("activity:1.2.3.4:9", "first_seen", "100").await.unwrap();
        store.expire("activity:1.2.3.4:9", Duration::from_millis(10)).await.unwrap();
        assert!(!store.hgetall("activity:1.2.3.4:9").await.unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.hgetall("activity:1.2.3.4:9").await.unwrap().is_empty());
    }
}
