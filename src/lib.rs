//! # Gaming Traffic Governor
//!
//! A gateway-level traffic governance and real-time streaming fabric for a
//! gaming analytics platform. Two cores live here:
//!
//! - **Rate-limit / DDoS governor**: an in-line, framework-agnostic
//!   middleware that decides `allow | challenge | block` for each inbound
//!   request, enforcing tiered quotas, upstream fairness toward a
//!   third-party gaming API, and a reputation/blocklist for abusive
//!   sources.
//! - **Real-time streaming hub**: a websocket pub/sub multiplexer that fans
//!   live-match, player, analytics, and notification events out to
//!   thousands of concurrent connections via a bounded event queue and a
//!   worker pool of typed processors.
//!
//! ## Architecture
//!
//! ### Governor path
//! `kv_store` underlies `counters` (fixed-window limits) and
//! `ip_reputation` (allow/deny lists, temp blocks). `threat_scorer` folds
//! request signals into a DDoS score. `policy` composes all of the above
//! into the ordered limit chain; `governor` wraps the chain with header
//! attachment for a host web framework to call.
//!
//! ### Streaming path
//! `connection_registry` and `channel_registry` track live sessions and
//! pub/sub topics. `event_bus` is the bounded producer/worker-pool queue
//! typed events flow through. `live_match` runs one cooperative timer per
//! watched match. `lifecycle` owns startup/shutdown of the background
//! workers; `stats` is the in-memory counters the hub exposes.
//!
//! Neither core persists state beyond the shared KV store's TTLs; this
//! crate is not a general API gateway (no TLS termination, routing table,
//! or request rewriting) and does not implement domain analytics — event
//! processors and the upstream gaming API client are collaborator traits
//! the host application supplies (see `collaborators`).

/// Capability traits this crate depends on but does not implement:
/// `KvStore`, `GamingApiClient`, `EventProcessor`, `AuthContext`.
pub mod collaborators;
/// Channel registry (C8): named pub/sub topics and fan-out.
pub mod channel_registry;
/// Connection registry (C7): live session admission and liveness.
pub mod connection_registry;
/// Fixed-window counter engine (C2).
pub mod counters;
/// Shared error types for the governor and streaming fabric.
pub mod errors;
/// Event bus (C9): bounded queue, worker pool, typed processors.
pub mod event_bus;
/// Governor middleware (C6): composes the policy chain, attaches headers.
pub mod governor;
/// IP allow/deny lists, CIDR matching, temporary blocks (C3).
pub mod ip_reputation;
/// Thin abstraction over the shared key-value store (C1).
pub mod kv_store;
/// Lifecycle manager (C11): startup, cleanup sweeps, idempotent shutdown.
pub mod lifecycle;
/// Live-match tracker (C10): per-match polling, auto-stop, registry.
pub mod live_match;
/// Prometheus-facing metrics facade (feature-gated).
pub mod metrics;
/// Limit policy evaluator (C4): the ordered per-request limit chain.
pub mod policy;
/// Configuration surface: tiers, endpoints, DDoS, regions, streaming.
pub mod settings;
/// In-memory stats & observability (C12): counters, latency, peaks.
pub mod stats;
/// Tracing subscriber initialization for binaries.
pub mod telemetry;
/// DDoS / suspicious-activity scorer (C5).
pub mod threat_scorer;
/// Websocket wire protocol: client/server message envelopes (section 6.2).
pub mod ws_protocol;

pub use collaborators::{ApiKeyClass, AuthContext, GamingApiClient};
pub use errors::{GovernorError, LimitKind};
pub use governor::{GovernorMiddleware, GovernorOutcome, GovernorRequest};
pub use lifecycle::LifecycleManager;
pub use policy::{PolicyEvaluator, PolicyRequest, PolicyVerdict};
pub use settings::{Settings, Tier};
pub use stats::{MetricsSnapshot, Stats};
