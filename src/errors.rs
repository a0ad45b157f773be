//! Error types shared across the governor and streaming fabric.
//!
//! Each component that can fail in a way callers need to branch on gets its
//! own `thiserror` enum (mirrors the teacher's `BlockStreamError` /
//! `DeferredQueueError` split rather than one crate-wide error type).
//! `anyhow::Error` is reserved for binaries and call sites that aggregate
//! several of these without needing to match on the variant.

use std::time::Duration;
use thiserror::Error;

/// Failure surface of the KV store adapter (C1).
///
/// `Transient` failures are safe to retry (connection reset, timeout);
/// `Permanent` failures indicate a bad request (malformed key, wrong type)
/// and retrying will not help.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("permanent store error: {0}")]
    Permanent(String),
}

impl KvError {
    pub fn is_transient(&self) -> bool {
        matches!(self, KvError::Transient(_))
    }
}

/// Errors from IP parsing / reputation lookups (C3).
#[derive(Debug, Error)]
pub enum IpError {
    #[error("invalid_ip: could not parse '{0}' as an IPv4 or IPv6 address")]
    InvalidIp(String),
    #[error("invalid CIDR block '{0}'")]
    InvalidCidr(String),
    #[error(transparent)]
    Store(#[from] KvError),
}

/// The kind of limit that produced a denial, echoed on the wire as
/// `limit_type` / `limit_kind` per spec section 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    IpMinute,
    IpHour,
    TierMinute,
    TierHour,
    TierDay,
    EndpointLimit,
    AnalyticsBasicLimit,
    AnalyticsAdvancedLimit,
    AnalyticsRealtimeLimit,
    AnalyticsTeamLimit,
    AnalyticsComparisonLimit,
    ExportDaily,
    Realtime,
    Region,
    RiotPersonal,
    RiotProduction,
    Burst,
    DdosProtection,
}

impl LimitKind {
    /// The wire identifier used in JSON error bodies and headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKind::IpMinute => "ip_minute",
            LimitKind::IpHour => "ip_hour",
            LimitKind::TierMinute => "tier_minute",
            LimitKind::TierHour => "tier_hour",
            LimitKind::TierDay => "tier_day",
            LimitKind::EndpointLimit => "endpoint_limit",
            LimitKind::AnalyticsBasicLimit => "analytics_basic_limit",
            LimitKind::AnalyticsAdvancedLimit => "analytics_advanced_limit",
            LimitKind::AnalyticsRealtimeLimit => "analytics_realtime_limit",
            LimitKind::AnalyticsTeamLimit => "analytics_team_limit",
            LimitKind::AnalyticsComparisonLimit => "analytics_comparison_limit",
            LimitKind::ExportDaily => "export_daily",
            LimitKind::Realtime => "realtime",
            LimitKind::Region => "region",
            LimitKind::RiotPersonal => "riot_personal",
            LimitKind::RiotProduction => "riot_production",
            LimitKind::Burst => "burst",
            LimitKind::DdosProtection => "ddos_protection",
        }
    }
}

/// Top-level error for the governor chain (C4/C6), section 7.
#[derive(Debug, Error)]
pub enum GovernorError {
    #[error("invalid_input: {0}")]
    InvalidInput(String),
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("rate_limited: {kind:?} retry_after={retry_after:?}")]
    RateLimited {
        kind: LimitKind,
        retry_after: Duration,
        remaining: i64,
        reset_at: i64,
    },
    #[error("ddos_blocked: {reason}")]
    DdosBlocked {
        reason: String,
        retry_after: Duration,
        suspicious_score: u8,
    },
    #[error("internal_store_error: {0}")]
    InternalStoreError(#[from] KvError),
}

/// Websocket connection-admission failure (C7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapacityError {
    #[error("server connection limit reached ({current}/{max})")]
    ServerFull { current: usize, max: usize },
    #[error("user {user_id} already has {current}/{max} connections open")]
    UserFull {
        user_id: String,
        current: usize,
        max: usize,
    },
    #[error("client has subscribed to {current}/{max} channels")]
    ChannelLimitReached { current: usize, max: usize },
}

/// Event-bus-facing error (C9). Processor errors never propagate to the
/// producer; they are logged and counted by the worker loop instead.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("event queue is at capacity, event dropped")]
    QueueFull,
    #[error("no processor registered for event type '{0}'")]
    NoProcessor(String),
    #[error("processor for '{event_type}' failed: {source}")]
    ProcessorFailed {
        event_type: String,
        #[source]
        source: anyhow::Error,
    },
}
