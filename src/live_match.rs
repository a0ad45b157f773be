//! Live-match tracker (C10): one cooperative timer per actively-watched
//! match, self-destructing once nobody is subscribed.
//!
//! Grounded on the teacher's `block_stream.rs` per-subscription polling
//! loop (a `tokio::time::interval` tied to a cancellation flag), swapped
//! from chain block polling to upstream match-state polling.

use crate::channel_registry::ChannelRegistry;
use crate::collaborators::GamingApiClient;
use crate::event_bus::{EventBusHandle, StreamEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Initializing,
    InProgress,
    Paused,
    Finished,
    Destroyed,
}

struct Inner {
    phase: std::sync::Mutex<MatchPhase>,
    game_time_seconds: AtomicU64,
}

/// Handle to a running tracker. Dropping every clone does not stop the
/// background task — call `stop` (or let the tick loop notice zero
/// subscribers) to tear it down.
#[derive(Clone)]
pub struct LiveMatchHandle {
    match_id: Arc<str>,
    inner: Arc<Inner>,
    stop_tx: watch::Sender<bool>,
}

impl LiveMatchHandle {
    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn phase(&self) -> MatchPhase {
        *self.inner.phase.lock().expect("live match phase lock poisoned")
    }

    pub fn game_time_seconds(&self) -> u64 {
        self.inner.game_time_seconds.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

/// Spawns the per-match polling task. The task self-destructs the first
/// time it observes zero channel subscribers at a tick (spec section
/// 4.10); callers don't need to track match lifetimes themselves beyond
/// calling `spawn` once per match and holding onto channels/event bus.
pub fn spawn(
    match_id: String,
    api: Arc<dyn GamingApiClient>,
    channels: Arc<ChannelRegistry>,
    events: EventBusHandle,
    update_interval: Duration,
) -> LiveMatchHandle {
    let inner = Arc::new(Inner {
        phase: std::sync::Mutex::new(MatchPhase::Initializing),
        game_time_seconds: AtomicU64::new(0),
    });
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let channel_name: Arc<str> = Arc::from(format!("live_match:{match_id}"));

    let handle = LiveMatchHandle {
        match_id: Arc::from(match_id.as_str()),
        inner: inner.clone(),
        stop_tx,
    };

    tokio::spawn({
        let match_id = match_id.clone();
        let channel_name = channel_name.clone();
        async move {
            let mut ticker = tokio::time::interval(update_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                if channels.subscriber_count(&channel_name).await == 0 {
                    debug!(%match_id, "no subscribers remain, destroying live match tracker");
                    *inner.phase.lock().expect("live match phase lock poisoned") = MatchPhase::Destroyed;
                    break;
                }

                match api.get_live_match_state(&match_id).await {
                    Ok(state) => {
                        let phase = classify_status(&state.status);
                        *inner.phase.lock().expect("live match phase lock poisoned") = phase;
                        inner
                            .game_time_seconds
                            .store(state.game_time_seconds, Ordering::Relaxed);

                        let payload = serde_json::to_string(&state).unwrap_or_else(|_| "{}".to_string());
                        channels.broadcast(&channel_name, Arc::from(payload.as_str())).await;
                        events.publish(StreamEvent {
                            event_type: "live_match_update".to_string(),
                            channel: channel_name.to_string(),
                            payload: Arc::from(payload.as_str()),
                        });

                        if phase == MatchPhase::Finished {
                            // Keep the last snapshot broadcastable for a
                            // while, but stop polling the upstream API.
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(match_id, error = %e, "failed to fetch live match state");
                    }
                }
            }
        }
    });

    handle
}

fn classify_status(status: &str) -> MatchPhase {
    match status.to_ascii_lowercase().as_str() {
        "paused" => MatchPhase::Paused,
        "finished" | "completed" | "ended" => MatchPhase::Finished,
        _ => MatchPhase::InProgress,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError {
    pub current: usize,
    pub max: usize,
}

/// Bounds the number of concurrently-tracked matches at `max_live_matches`
/// (spec section 5, memory bounds) and reaps handles once their tracker
/// task has self-destructed. One entry per `match_id`; `get_or_spawn` is
/// the only way to create a tracker, so the bound is enforced at the single
/// choke point rather than scattered across call sites.
pub struct LiveMatchRegistry {
    handles: dashmap::DashMap<String, LiveMatchHandle>,
    max_live_matches: usize,
    api: Arc<dyn GamingApiClient>,
    channels: Arc<ChannelRegistry>,
    events: EventBusHandle,
    update_interval: Duration,
}

impl LiveMatchRegistry {
    pub fn new(
        max_live_matches: usize,
        api: Arc<dyn GamingApiClient>,
        channels: Arc<ChannelRegistry>,
        events: EventBusHandle,
        update_interval: Duration,
    ) -> Self {
        Self {
            handles: dashmap::DashMap::new(),
            max_live_matches,
            api,
            channels,
            events,
            update_interval,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Returns the existing tracker for `match_id`, or spawns one, refusing
    /// if the registry is already at `max_live_matches` (spec section 5).
    pub fn get_or_spawn(&self, match_id: &str) -> Result<LiveMatchHandle, CapacityError> {
        if let Some(existing) = self.handles.get(match_id) {
            return Ok(existing.clone());
        }
        if self.handles.len() >= self.max_live_matches {
            return Err(CapacityError {
                current: self.handles.len(),
                max: self.max_live_matches,
            });
        }
        let handle = spawn(
            match_id.to_string(),
            self.api.clone(),
            self.channels.clone(),
            self.events.clone(),
            self.update_interval,
        );
        self.handles.insert(match_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Drops handles whose tracker task has reached `Destroyed`, called by
    /// the lifecycle manager's periodic scan (spec section 4.11).
    pub fn reap_destroyed(&self) -> usize {
        let before = self.handles.len();
        self.handles.retain(|_, h| h.phase() != MatchPhase::Destroyed);
        before - self.handles.len()
    }

    pub fn stop_all(&self) {
        for entry in self.handles.iter() {
            entry.value().stop();
        }
    }
}
