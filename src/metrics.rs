// src/metrics.rs
//
// Prometheus-facing metrics facade. When the `observability` feature is off,
// the `counter!`/`gauge!`/`histogram!` macros below expand to nothing, so the
// call sites throughout the governor and streaming hub never need their own
// `#[cfg(feature = "observability")]` guards.

#[cfg(feature = "observability")]
pub use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

#[cfg(not(feature = "observability"))]
pub enum Unit {
    Count,
    Seconds,
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Registers descriptions for every metric this crate emits. Call once at
/// startup (see `lifecycle::LifecycleManager::start`).
pub fn describe_metrics() {
    describe_counter!(
        "governor_requests_total",
        Unit::Count,
        "Total requests evaluated by the governor, labeled by verdict (allow, challenge, block)."
    );
    describe_counter!(
        "governor_limit_hits_total",
        Unit::Count,
        "Total denials, labeled by limit_kind."
    );
    describe_histogram!(
        "governor_decision_latency_ms",
        Unit::Seconds,
        "Latency of a full governor chain evaluation in milliseconds."
    );
    describe_counter!(
        "ddos_score_total",
        Unit::Count,
        "Count of requests scored by the threat scorer, labeled by action (allow, challenge, block)."
    );
    describe_gauge!(
        "ddos_blocked_ips",
        "Current number of temporarily blocked IPs."
    );
    describe_counter!(
        "kv_operations_total",
        Unit::Count,
        "Total KV store operations, labeled by op."
    );
    describe_counter!(
        "kv_errors_total",
        Unit::Count,
        "Total KV store errors, labeled by op and kind (transient, permanent)."
    );
    describe_gauge!(
        "connected_clients",
        "Number of live websocket sessions in the connection registry."
    );
    describe_gauge!("active_channels", "Number of non-empty pub/sub channels.");
    describe_gauge!("live_matches", "Number of active live-match trackers.");
    describe_counter!(
        "events_processed_total",
        Unit::Count,
        "Total stream events successfully processed, labeled by event_type."
    );
    describe_counter!(
        "events_dropped_total",
        Unit::Count,
        "Total stream events dropped because the bounded queue was full."
    );
    describe_counter!(
        "events_failed_total",
        Unit::Count,
        "Total stream events whose processor returned an error, labeled by event_type."
    );
    describe_counter!(
        "messages_delivered_total",
        Unit::Count,
        "Total websocket messages delivered to subscribers."
    );
    describe_histogram!(
        "message_delivery_latency_ms",
        Unit::Seconds,
        "End-to-end latency from publish to subscriber delivery, in milliseconds."
    );
}

pub fn record_governor_decision(verdict: &str, duration: std::time::Duration) {
    counter!("governor_requests_total", 1, "verdict" => verdict.to_string());
    histogram!("governor_decision_latency_ms", duration.as_secs_f64() * 1000.0);
}

pub fn increment_limit_hit(limit_kind: &str) {
    counter!("governor_limit_hits_total", 1, "limit_kind" => limit_kind.to_string());
}

pub fn increment_ddos_action(action: &str) {
    counter!("ddos_score_total", 1, "action" => action.to_string());
}

pub fn set_blocked_ip_count(count: f64) {
    gauge!("ddos_blocked_ips", count);
}

pub fn increment_kv_operation(op: &str) {
    counter!("kv_operations_total", 1, "op" => op.to_string());
}

pub fn increment_kv_error(op: &str, kind: &str) {
    counter!("kv_errors_total", 1, "op" => op.to_string(), "kind" => kind.to_string());
}

pub fn set_connected_clients(count: f64) {
    gauge!("connected_clients", count);
}

pub fn set_active_channels(count: f64) {
    gauge!("active_channels", count);
}

pub fn set_live_matches(count: f64) {
    gauge!("live_matches", count);
}

pub fn increment_events_processed(event_type: &str) {
    counter!("events_processed_total", 1, "event_type" => event_type.to_string());
}

pub fn increment_events_dropped() {
    counter!("events_dropped_total", 1);
}

pub fn increment_events_failed(event_type: &str) {
    counter!("events_failed_total", 1, "event_type" => event_type.to_string());
}

pub fn increment_messages_delivered(count: u64) {
    counter!("messages_delivered_total", count);
}

pub fn record_message_latency(duration: std::time::Duration) {
    histogram!(
        "message_delivery_latency_ms",
        duration.as_secs_f64() * 1000.0
    );
}
