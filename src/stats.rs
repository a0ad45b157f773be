//! In-memory stats & observability (C12).
//!
//! This is the source of truth for the numbers delivered over the
//! websocket hub's own admin/`capabilities` surface; `metrics.rs` mirrors
//! the same call sites out to Prometheus for ops scraping (spec section
//! 4.12). Grounded on the teacher's `CacheManager::record_cache_sizes`
//! pattern (plain counters behind a lock, snapshotted on demand) rather
//! than pulling in a histogram crate for one running average.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Immutable copy of the hub's counters at one point in time (spec
/// section 3, "Metrics snapshot").
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    pub connected_clients: u64,
    pub active_channels: u64,
    pub live_matches: u64,
    pub events_processed: u64,
    pub events_dropped: u64,
    pub events_failed: u64,
    pub messages_delivered: u64,
    pub avg_latency_ms: f64,
    pub peak_clients: u64,
    pub peak_channels: u64,
    pub peak_live_matches: u64,
    pub uptime_seconds: u64,
}

struct LatencyAccumulator {
    sum_ms: RwLock<f64>,
    count: AtomicU64,
}

impl LatencyAccumulator {
    fn new() -> Self {
        Self {
            sum_ms: RwLock::new(0.0),
            count: AtomicU64::new(0),
        }
    }

    fn record(&self, d: Duration) {
        let mut sum = self.sum_ms.write().expect("latency sum lock poisoned");
        *sum += d.as_secs_f64() * 1000.0;
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn average(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        *self.sum_ms.read().expect("latency sum lock poisoned") / count as f64
    }
}

/// CAS loop raising `slot` to `value` if `value` is the new high-water
/// mark. Used for the three peak gauges (spec section 4.12).
fn raise_peak(slot: &AtomicI64, value: i64) {
    let mut current = slot.load(Ordering::Relaxed);
    while value > current {
        match slot.compare_exchange_weak(current, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}

/// Live counters for the whole streaming fabric. Updates are lock-free
/// atomics except the latency sum (a single small write lock, held only
/// long enough to add one `f64`); reads are a consistent-enough snapshot
/// assembled from the same atomics (spec section 4.12: "updated under a
/// write lock, read under a read lock" is satisfied at the field level —
/// no single mutation spans more than one atomic/lock).
pub struct Stats {
    started_at: Instant,
    connected_clients: AtomicI64,
    active_channels: AtomicI64,
    live_matches: AtomicI64,
    events_processed: AtomicU64,
    events_dropped: AtomicU64,
    events_failed: AtomicU64,
    messages_delivered: AtomicU64,
    peak_clients: AtomicI64,
    peak_channels: AtomicI64,
    peak_live_matches: AtomicI64,
    latency: LatencyAccumulator,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            connected_clients: AtomicI64::new(0),
            active_channels: AtomicI64::new(0),
            live_matches: AtomicI64::new(0),
            events_processed: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            events_failed: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            peak_clients: AtomicI64::new(0),
            peak_channels: AtomicI64::new(0),
            peak_live_matches: AtomicI64::new(0),
            latency: LatencyAccumulator::new(),
        }
    }

    pub fn set_connected_clients(&self, count: usize) {
        let count = count as i64;
        self.connected_clients.store(count, Ordering::Relaxed);
        raise_peak(&self.peak_clients, count);
    }

    pub fn set_active_channels(&self, count: usize) {
        let count = count as i64;
        self.active_channels.store(count, Ordering::Relaxed);
        raise_peak(&self.peak_channels, count);
    }

    pub fn set_live_matches(&self, count: usize) {
        let count = count as i64;
        self.live_matches.store(count, Ordering::Relaxed);
        raise_peak(&self.peak_live_matches, count);
    }

    pub fn record_event_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_failed(&self) {
        self.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_messages_delivered(&self, count: u64) {
        self.messages_delivered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_latency(&self, d: Duration) {
        self.latency.record(d);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connected_clients: self.connected_clients.load(Ordering::Relaxed).max(0) as u64,
            active_channels: self.active_channels.load(Ordering::Relaxed).max(0) as u64,
            live_matches: self.live_matches.load(Ordering::Relaxed).max(0) as u64,
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_failed: self.events_failed.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            avg_latency_ms: self.latency.average(),
            peak_clients: self.peak_clients.load(Ordering::Relaxed).max(0) as u64,
            peak_channels: self.peak_channels.load(Ordering::Relaxed).max(0) as u64,
            peak_live_matches: self.peak_live_matches.load(Ordering::Relaxed).max(0) as u64,
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }
}
