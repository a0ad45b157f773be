//! Lifecycle manager (C11): startup, periodic cleanup, and idempotent
//! shutdown for the streaming fabric.
//!
//! Grounded on the teacher's `orchestrator.rs` top-level start/stop shape
//! (spawn a fixed set of background tasks, signal them off a shared
//! shutdown channel, join with a grace period) generalized from pool
//! discovery orchestration to the governor + streaming hub's own workers.

use crate::channel_registry::ChannelRegistry;
use crate::connection_registry::ConnectionRegistry;
use crate::event_bus::EventBusHandle;
use crate::live_match::LiveMatchRegistry;
use crate::stats::Stats;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Cadence knobs for the background sweeps this manager owns. Distinct
/// from `live_match_update_interval` (that belongs to each tracker).
#[derive(Debug, Clone, Copy)]
pub struct LifecycleIntervals {
    pub cleanup_sweep: Duration,
    pub metrics_sample: Duration,
    pub live_match_scan: Duration,
    pub shutdown_grace: Duration,
}

/// Owns the shared shutdown signal and the handles needed to tear
/// everything down in one call. Does not own the event bus's worker
/// spawn (that happens in `EventBus::spawn`); it only holds the producer
/// handle so it can request a drain.
pub struct LifecycleManager {
    connections: Arc<ConnectionRegistry>,
    channels: Arc<ChannelRegistry>,
    live_matches: Arc<LiveMatchRegistry>,
    stats: Arc<Stats>,
    events: EventBusHandle,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    intervals: LifecycleIntervals,
    client_timeout: Duration,
    shut_down: AtomicBool,
}

impl LifecycleManager {
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        channels: Arc<ChannelRegistry>,
        live_matches: Arc<LiveMatchRegistry>,
        stats: Arc<Stats>,
        events: EventBusHandle,
        intervals: LifecycleIntervals,
        client_timeout: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            connections,
            channels,
            live_matches,
            stats,
            events,
            shutdown_tx,
            shutdown_rx,
            intervals,
            client_timeout,
            shut_down: AtomicBool::new(false),
        }
    }

    /// A clone of the shutdown receiver, handed to every other task this
    /// crate spawns (event bus workers, live-match trackers, per-session
    /// loops) so they all observe the same shutdown signal (spec section 5).
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Spawns the cleanup sweep, live-match registry scan, and metrics
    /// sampler. Event bus workers are spawned separately via
    /// `EventBus::spawn` (it owns the queue), using the same
    /// `shutdown_signal()`.
    pub fn start(self: &Arc<Self>) {
        info!("lifecycle manager starting background workers");
        crate::metrics::describe_metrics();
        self.spawn_cleanup_sweep();
        self.spawn_live_match_scan();
        self.spawn_metrics_sampler();
    }

    fn spawn_cleanup_sweep(self: &Arc<Self>) {
        let this = self.clone();
        let mut shutdown = this.shutdown_rx.clone();
        let interval = this.intervals.cleanup_sweep;
        let client_timeout = this.client_timeout;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }
                let removed_channels = this.channels.gc().await;
                let stale = this.connections.stale_sessions(client_timeout);
                for session_id in &stale {
                    for channel in this.connections.unregister(*session_id) {
                        this.channels.unsubscribe(&channel).await;
                    }
                }
                if removed_channels > 0 || !stale.is_empty() {
                    debug!(
                        removed_channels,
                        stale_sessions = stale.len(),
                        "cleanup sweep reaped idle state"
                    );
                }
            }
        });
    }

    fn spawn_live_match_scan(self: &Arc<Self>) {
        let this = self.clone();
        let mut shutdown = this.shutdown_rx.clone();
        let interval = this.intervals.live_match_scan;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }
                let reaped = this.live_matches.reap_destroyed();
                if reaped > 0 {
                    debug!(reaped, "live match scan reaped destroyed trackers");
                }
            }
        });
    }

    fn spawn_metrics_sampler(self: &Arc<Self>) {
        let this = self.clone();
        let mut shutdown = this.shutdown_rx.clone();
        let interval = this.intervals.metrics_sample;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }
                this.sample_once().await;
            }
        });
    }

    async fn sample_once(&self) {
        self.stats.set_connected_clients(self.connections.len());
        self.stats.set_active_channels(self.channels.channel_count().await);
        self.stats.set_live_matches(self.live_matches.len());
        let snap = self.stats.snapshot();
        crate::metrics::set_connected_clients(snap.connected_clients as f64);
        crate::metrics::set_active_channels(snap.active_channels as f64);
        crate::metrics::set_live_matches(snap.live_matches as f64);
    }

    /// Idempotent shutdown: closes the shutdown signal (every spawned task
    /// observes it via `select!`), drains the event bus up to the grace
    /// period, stops live-match trackers, and flushes a final metrics
    /// snapshot. A second call is a no-op (spec section 4.11, testable
    /// property 7: "Shutdown is idempotent").
    pub async fn shutdown(&self) -> crate::stats::MetricsSnapshot {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            debug!("shutdown called again, already shut down");
            return self.stats.snapshot();
        }

        info!("lifecycle manager shutting down");
        let _ = self.shutdown_tx.send(true);
        self.live_matches.stop_all();

        tokio::time::sleep(self.intervals.shutdown_grace).await;

        for conn in self.connections.snapshot() {
            for channel in self.connections.unregister(conn.session_id) {
                self.channels.unsubscribe(&channel).await;
            }
        }

        self.sample_once().await;
        self.stats.snapshot()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn events(&self) -> &EventBusHandle {
        &self.events
    }
}
