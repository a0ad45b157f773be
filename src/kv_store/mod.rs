//! Thin abstraction over a shared key-value store (C1).
//!
//! Everything above this module — counters, IP reputation, threat scoring —
//! is storage-agnostic: it only knows the `KvStore` trait. Two
//! implementations are provided: [`memory::InMemoryKvStore`] (a `DashMap`
//! backed store used in tests and single-process deployments, grounded on
//! the teacher's `CacheManager` in `cache.rs`) and, behind the `redis`
//! feature, [`redis_store::RedisKvStore`] (a thin wrapper over
//! `redis::aio::ConnectionManager`, grounded directly on the teacher's
//! `redis_manager.rs`).

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;

use crate::errors::KvError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// A single operation inside a `pipeline()` call. The store guarantees
/// pipelined ops execute atomically with respect to each other's ordering on
/// a single key (spec section 4.1): an `Incr` immediately followed by an
/// `Expire` on the same key is observed in that order.
#[derive(Debug, Clone)]
pub enum KvOp {
    Incr(String),
    Expire(String, Duration),
    Get(String),
    Set(String, Vec<u8>, Duration),
    Sadd(String, String),
}

/// Result slot for a single `KvOp`, returned in the same order as submitted.
#[derive(Debug, Clone)]
pub enum KvResult {
    Int(i64),
    Bytes(Option<Vec<u8>>),
    Ok,
}

/// Operations required of any backing store (spec section 4.1).
///
/// `get` distinguishes absence (`None`) from a stored zero. `scan` may
/// return spurious duplicates and must never block other operations.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn incr(&self, key: &str) -> Result<i64, KvError>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), KvError>;
    async fn get(&self, key: &str) -> Result<Option<i64>, KvError>;
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), KvError>;
    async fn set_str(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;
    async fn del(&self, keys: &[String]) -> Result<(), KvError>;
    async fn exists(&self, key: &str) -> Result<bool, KvError>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, KvError>;
    async fn sadd(&self, key: &str, member: &str) -> Result<(), KvError>;
    async fn scard(&self, key: &str) -> Result<i64, KvError>;
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError>;

    /// Executes `incr` immediately followed by `expire` and returns the
    /// post-increment count — the hot path for the counter engine.
    async fn incr_and_expire(&self, key: &str, ttl: Duration) -> Result<i64, KvError> {
        let count = self.incr(key).await?;
        self.expire(key, ttl).await?;
        Ok(count)
    }

    async fn pipeline(&self, ops: Vec<KvOp>) -> Result<Vec<KvResult>, KvError> {
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            let result = match op {
                KvOp::Incr(key) => KvResult::Int(self.incr(&key).await?),
                KvOp::Expire(key, ttl) => {
                    self.expire(&key, ttl).await?;
                    KvResult::Ok
                }
                KvOp::Get(key) => KvResult::Bytes(
                    self.get(&key)
                        .await?
                        .map(|v| v.to_string().into_bytes()),
                ),
                KvOp::Set(key, value, ttl) => {
                    self.set(&key, &value, ttl).await?;
                    KvResult::Ok
                }
                KvOp::Sadd(key, member) => {
                    self.sadd(&key, &member).await?;
                    KvResult::Ok
                }
            };
            results.push(result);
        }
        Ok(results)
    }
}
