//! Connection registry (C7): admission and lifecycle tracking for streaming
//! clients.
//!
//! Grounded on the teacher's `rpc_pool.rs` connection bookkeeping (a
//! `DashMap` of live handles plus per-key counts used for admission
//! decisions), generalized from RPC endpoints to websocket sessions.

use crate::errors::CapacityError;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Connection {
    pub session_id: Uuid,
    pub user_id: Option<String>,
    pub connected_at: Instant,
    pub last_ping: Arc<AtomicI64>,
}

impl Connection {
    /// Records "now" as milliseconds elapsed since `connected_at`, the only
    /// timeline a bare atomic can cheaply express for a monotonic `Instant`.
    fn touch(&self) {
        self.last_ping
            .store(self.connected_at.elapsed().as_millis() as i64, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last_ms = self.last_ping.load(Ordering::Relaxed);
        let elapsed_ms = self.connected_at.elapsed().as_millis() as i64;
        Duration::from_millis((elapsed_ms - last_ms).max(0) as u64)
    }
}

/// Tracks every live session. `last_ping` is stored as milliseconds since
/// `connected_at` rather than an `Instant` directly so it can live behind a
/// plain atomic (spec section 4.7).
///
/// Channel membership (`channels: set<channel>` in the spec's session data
/// model, section 3) is owned here rather than by the channel registry: "on
/// destruction all channel memberships are removed" is a property of the
/// session's lifecycle, not the channel's.
pub struct ConnectionRegistry {
    sessions: Arc<DashMap<Uuid, Connection>>,
    by_user: Arc<DashMap<String, Vec<Uuid>>>,
    channels: Arc<DashMap<Uuid, DashSet<String>>>,
    max_connections: usize,
    max_connections_per_user: usize,
    max_channels_per_client: usize,
}

impl ConnectionRegistry {
    pub fn new(
        max_connections: usize,
        max_connections_per_user: usize,
        max_channels_per_client: usize,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            by_user: Arc::new(DashMap::new()),
            channels: Arc::new(DashMap::new()),
            max_connections,
            max_connections_per_user,
            max_channels_per_client,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Admits a new session, refusing if the server or the user is already
    /// at capacity (spec section 4.7).
    pub fn register(&self, user_id: Option<String>) -> Result<Uuid, CapacityError> {
        if self.sessions.len() >= self.max_connections {
            return Err(CapacityError::ServerFull {
                current: self.sessions.len(),
                max: self.max_connections,
            });
        }
        if let Some(uid) = &user_id {
            let current = self.by_user.get(uid).map(|v| v.len()).unwrap_or(0);
            if current >= self.max_connections_per_user {
                return Err(CapacityError::UserFull {
                    user_id: uid.clone(),
                    current,
                    max: self.max_connections_per_user,
                });
            }
        }

        let session_id = Uuid::new_v4();
        let connection = Connection {
            session_id,
            user_id: user_id.clone(),
            connected_at: Instant::now(),
            last_ping: Arc::new(AtomicI64::new(0)),
        };
        self.sessions.insert(session_id, connection);
        self.channels.insert(session_id, DashSet::new());
        if let Some(uid) = user_id {
            self.by_user.entry(uid).or_default().push(session_id);
        }
        Ok(session_id)
    }

    /// Returns the channels a session was subscribed to at destruction time
    /// so the caller can unwind them from the channel registry (spec section
    /// 3: "on destruction all channel memberships are removed").
    pub fn unregister(&self, session_id: Uuid) -> Vec<String> {
        if let Some((_, conn)) = self.sessions.remove(&session_id) {
            if let Some(uid) = conn.user_id {
                if let Some(mut list) = self.by_user.get_mut(&uid) {
                    list.retain(|id| *id != session_id);
                }
            }
        }
        self.channels
            .remove(&session_id)
            .map(|(_, set)| set.into_iter().collect())
            .unwrap_or_default()
    }

    /// Records that `session_id` joined `channel`, refusing past
    /// `max_channels_per_client` (spec section 5, memory bounds). The actual
    /// channel-registry subscription is a separate call the caller makes
    /// once this succeeds.
    pub fn add_channel(&self, session_id: Uuid, channel: &str) -> Result<(), CapacityError> {
        let Some(set) = self.channels.get(&session_id) else {
            return Ok(());
        };
        if set.contains(channel) {
            return Ok(());
        }
        if set.len() >= self.max_channels_per_client {
            return Err(CapacityError::ChannelLimitReached {
                current: set.len(),
                max: self.max_channels_per_client,
            });
        }
        set.insert(channel.to_string());
        Ok(())
    }

    pub fn remove_channel(&self, session_id: Uuid, channel: &str) {
        if let Some(set) = self.channels.get(&session_id) {
            set.remove(channel);
        }
    }

    pub fn channels_for(&self, session_id: Uuid) -> Vec<String> {
        self.channels
            .get(&session_id)
            .map(|set| set.iter().map(|e| e.clone()).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, session_id: Uuid) -> Option<Connection> {
        self.sessions.get(&session_id).map(|e| e.clone())
    }

    pub fn iter_by_user(&self, user_id: &str) -> Vec<Connection> {
        self.by_user
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.sessions.get(id).map(|e| e.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> Vec<Connection> {
        self.sessions.iter().map(|e| e.clone()).collect()
    }

    pub fn heartbeat(&self, session_id: Uuid) {
        if let Some(conn) = self.sessions.get(&session_id) {
            conn.touch();
        }
    }

    /// Sessions whose last ping predates `timeout` relative to now. The
    /// caller disconnects them; this registry only tracks liveness, it
    /// never closes sockets itself.
    pub fn stale_sessions(&self, timeout: Duration) -> Vec<Uuid> {
        self.sessions
            .iter()
            .filter(|e| e.idle_for() > timeout)
            .map(|e| *e.key())
            .collect()
    }
}
