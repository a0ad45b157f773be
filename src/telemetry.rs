//! Tracing subscriber initialization for binaries.
//!
//! Libraries never install a global subscriber; only `bin/governor_daemon.rs`
//! and the demos under `demos/` call `init()`.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a `tracing-subscriber` with an env-filter honoring `RUST_LOG`,
/// defaulting to `info` for this crate and `warn` elsewhere.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,gaming_traffic_governor=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .ok();
}

/// Same as `init`, but emits newline-delimited JSON (for shipping to a log
/// aggregator instead of a terminal).
pub fn init_json() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,gaming_traffic_governor=info"));

    fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .ok();
}
