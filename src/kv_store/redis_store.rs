//! Redis-backed `KvStore`, grounded directly on the teacher's
//! `src/redis_manager.rs`: a `redis::aio::ConnectionManager` wrapped behind
//! the crate's storage trait instead of a bespoke struct per cache kind.

use crate::errors::KvError;
use crate::kv_store::KvStore;
use anyhow::Context as _;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

pub struct RedisKvStore {
    conn: ConnectionManager,
}

impl RedisKvStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = Client::open(url).context("failed to build redis client")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("failed to connect to redis")?;
        info!(url, "connected to redis KV store");
        Ok(Self { conn })
    }

    fn map_err<E: std::fmt::Display>(e: E) -> KvError {
        // redis::RedisError doesn't cleanly distinguish transient vs
        // permanent by variant alone; connection/timeout-shaped messages are
        // treated as transient, everything else as permanent.
        let msg = e.to_string();
        let lowered = msg.to_ascii_lowercase();
        if lowered.contains("timeout") || lowered.contains("connection") || lowered.contains("io error") {
            KvError::Transient(msg)
        } else {
            KvError::Permanent(msg)
        }
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1).await.map_err(Self::map_err)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .expire(key, ttl.as_secs() as i64)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, KvError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(Self::map_err)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl.as_secs())
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn set_str(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        self.set(key, value.as_bytes(), ttl).await
    }

    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(Self::map_err)
    }

    async fn del(&self, keys: &[String]) -> Result<(), KvError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn.del(keys).await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(Self::map_err)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(key, field, value).await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, KvError> {
        let mut conn = self.conn.clone();
        conn.hgetall(key).await.map_err(Self::map_err)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(key, member).await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn scard(&self, key: &str) -> Result<i64, KvError> {
        let mut conn = self.conn.clone();
        conn.scard(key).await.map_err(Self::map_err)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn.clone();
        conn.keys(pattern).await.map_err(Self::map_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // requires a running redis instance
    async fn connects_and_round_trips() {
        let store = RedisKvStore::connect("redis://localhost:6379").await.unwrap();
        store.set_str("governor:test:key", "1", Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.get("governor:test:key").await.unwrap(), Some(1));
    }
}
