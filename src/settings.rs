// src/settings.rs
//
// Configuration surface for the governor and streaming hub. Struct-of-structs
// with an enumerated set of fields (no string-keyed config blobs, per the
// redesign flags in section 9 of the spec) and per-field env var overrides,
// following the same `config` + `serde(default = "fn")` shape the teacher
// uses for its RPC/price-feed settings.

use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}

/// Per-tier request quotas. `-1` means unlimited (spec section 3).
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct TierLimits {
    pub rpm: i64,
    pub rph: i64,
    pub rpd: i64,
    pub analytics_rpm: i64,
    pub exports_per_day: i64,
    pub burst_limit: i64,
}

/// Subscription tier. Ordering is total: `free < premium < pro < enterprise`.
/// An unknown tier string coerces to `Free` (see `Tier::parse`).
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Premium,
    Pro,
    Enterprise,
}

impl Tier {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "premium" => Tier::Premium,
            "pro" => Tier::Pro,
            "enterprise" => Tier::Enterprise,
            _ => Tier::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }

    /// Multiplier applied to `analytics_<kind>` limits (spec section 4.4 step 6).
    pub fn analytics_multiplier(&self) -> i64 {
        match self {
            Tier::Free => 1,
            Tier::Premium => 2,
            Tier::Pro => 5,
            Tier::Enterprise => 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TierConfig {
    pub free: TierLimits,
    pub premium: TierLimits,
    pub pro: TierLimits,
    pub enterprise: TierLimits,
}

impl TierConfig {
    pub fn limits_for(&self, tier: Tier) -> TierLimits {
        match tier {
            Tier::Free => self.free,
            Tier::Premium => self.premium,
            Tier::Pro => self.pro,
            Tier::Enterprise => self.enterprise,
        }
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            free: TierLimits {
                rpm: 60,
                rph: 1000,
                rpd: 10_000,
                analytics_rpm: 20,
                exports_per_day: 2,
                burst_limit: 20,
            },
            premium: TierLimits {
                rpm: 300,
                rph: 8_000,
                rpd: 80_000,
                analytics_rpm: 100,
                exports_per_day: 20,
                burst_limit: 80,
            },
            pro: TierLimits {
                rpm: 900,
                rph: 25_000,
                rpd: 250_000,
                analytics_rpm: 400,
                exports_per_day: 100,
                burst_limit: 200,
            },
            enterprise: TierLimits {
                rpm: -1,
                rph: -1,
                rpd: -1,
                analytics_rpm: -1,
                exports_per_day: -1,
                burst_limit: 2_000,
            },
        }
    }
}

/// A single endpoint policy entry keyed by the canonical path pattern
/// (spec section 3: "lookup is exact on the canonical pattern string").
#[derive(Debug, Deserialize, Clone)]
pub struct EndpointPolicy {
    pub rpm: i64,
    #[serde(default)]
    pub rph: Option<i64>,
    #[serde(default)]
    pub min_tier: Option<Tier>,
    #[serde(default = "default_false")]
    pub expensive: bool,
    #[serde(default = "default_false")]
    pub requires_auth: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EndpointConfig {
    #[serde(default)]
    pub policies: HashMap<String, EndpointPolicy>,
}

/// Weights and thresholds for the threat scorer (C5), spec section 4.5.
#[derive(Debug, Deserialize, Clone)]
pub struct DdosConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_request_threshold")]
    pub request_threshold: u64,
    #[serde(default = "default_block_duration_seconds")]
    pub block_duration_seconds: u64,
    #[serde(default = "default_geo_block_duration_seconds")]
    pub geo_block_duration_seconds: u64,
    #[serde(default)]
    pub blocked_countries: Vec<String>,
    #[serde(default = "default_challenge_score")]
    pub challenge_score_threshold: u8,
    #[serde(default = "default_block_score")]
    pub block_score_threshold: u8,
}

fn default_window_seconds() -> u64 {
    60
}
fn default_request_threshold() -> u64 {
    120
}
fn default_block_duration_seconds() -> u64 {
    900
}
fn default_geo_block_duration_seconds() -> u64 {
    86_400
}
fn default_challenge_score() -> u8 {
    50
}
fn default_block_score() -> u8 {
    80
}

impl Default for DdosConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_seconds: default_window_seconds(),
            request_threshold: default_request_threshold(),
            block_duration_seconds: default_block_duration_seconds(),
            geo_block_duration_seconds: default_geo_block_duration_seconds(),
            blocked_countries: Vec::new(),
            challenge_score_threshold: default_challenge_score(),
            block_score_threshold: default_block_score(),
        }
    }
}

/// Static allow/deny list entries for IP reputation (C3).
#[derive(Debug, Deserialize, Clone, Default)]
pub struct IpReputationConfig {
    #[serde(default)]
    pub allowlist: Vec<String>,
    #[serde(default)]
    pub denylist: Vec<String>,
}

/// Per-region multiplier applied to the tier minute limit (spec section 4.4
/// step 7). Section 9 requires every region referenced elsewhere in config
/// to have a defined multiplier here — enforced by `Settings::validate`.
#[derive(Debug, Deserialize, Clone)]
pub struct RegionConfig {
    #[serde(default = "default_region_multipliers")]
    pub multipliers: HashMap<String, f64>,
    #[serde(default = "default_region_fallback")]
    pub default_multiplier: f64,
}

fn default_region_multipliers() -> HashMap<String, f64> {
    let mut m = HashMap::new();
    m.insert("KR".to_string(), 0.8);
    m.insert("JP".to_string(), 0.8);
    m.insert("OCE".to_string(), 1.2);
    m.insert("TR".to_string(), 1.2);
    m
}

fn default_region_fallback() -> f64 {
    1.0
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            multipliers: default_region_multipliers(),
            default_multiplier: default_region_fallback(),
        }
    }
}

/// Upstream (third-party gaming API) fairness quotas, spec section 4.4 step 8.
#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamFairnessConfig {
    #[serde(default = "default_personal_limit")]
    pub personal_limit: i64,
    #[serde(default = "default_personal_window_seconds")]
    pub personal_window_seconds: u64,
    #[serde(default = "default_production_per_endpoint")]
    pub production_per_endpoint: HashMap<String, i64>,
    #[serde(default = "default_production_fallback")]
    pub production_default: i64,
}

fn default_personal_limit() -> i64 {
    100
}
fn default_personal_window_seconds() -> u64 {
    120
}
fn default_production_per_endpoint() -> HashMap<String, i64> {
    let mut m = HashMap::new();
    m.insert("summoner".to_string(), 2000);
    m.insert("match".to_string(), 1000);
    m.insert("league".to_string(), 1500);
    m
}
fn default_production_fallback() -> i64 {
    500
}

impl Default for UpstreamFairnessConfig {
    fn default() -> Self {
        Self {
            personal_limit: default_personal_limit(),
            personal_window_seconds: default_personal_window_seconds(),
            production_per_endpoint: default_production_per_endpoint(),
            production_default: default_production_fallback(),
        }
    }
}

/// Streaming hub capacity and cadence knobs (C7-C11).
#[derive(Debug, Deserialize, Clone)]
pub struct StreamingConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_connections_per_user")]
    pub max_connections_per_user: usize,
    #[serde(default = "default_max_channels_per_client")]
    pub max_channels_per_client: usize,
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,
    #[serde(default = "default_event_workers")]
    pub event_workers: usize,
    #[serde(default = "default_max_live_matches")]
    pub max_live_matches: usize,
    #[serde(default = "default_channel_ttl_seconds")]
    pub channel_ttl_seconds: u64,
    #[serde(default = "default_client_update_interval_ms")]
    pub client_update_interval_ms: u64,
    #[serde(default = "default_client_timeout_ms")]
    pub client_timeout_ms: u64,
    #[serde(default = "default_live_match_update_interval_ms")]
    pub live_match_update_interval_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default = "default_ping_period_ms")]
    pub ping_period_ms: u64,
    #[serde(default = "default_pong_wait_ms")]
    pub pong_wait_ms: u64,
}

fn default_max_connections() -> usize {
    10_000
}
fn default_max_connections_per_user() -> usize {
    5
}
fn default_max_channels_per_client() -> usize {
    50
}
fn default_event_queue_size() -> usize {
    10_000
}
fn default_event_workers() -> usize {
    8
}
fn default_max_live_matches() -> usize {
    2_000
}
fn default_channel_ttl_seconds() -> u64 {
    300
}
fn default_client_update_interval_ms() -> u64 {
    15_000
}
fn default_client_timeout_ms() -> u64 {
    45_000
}
fn default_live_match_update_interval_ms() -> u64 {
    5_000
}
fn default_shutdown_grace_ms() -> u64 {
    2_000
}
fn default_ping_period_ms() -> u64 {
    20_000
}
fn default_pong_wait_ms() -> u64 {
    10_000
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_connections_per_user: default_max_connections_per_user(),
            max_channels_per_client: default_max_channels_per_client(),
            event_queue_size: default_event_queue_size(),
            event_workers: default_event_workers(),
            max_live_matches: default_max_live_matches(),
            channel_ttl_seconds: default_channel_ttl_seconds(),
            client_update_interval_ms: default_client_update_interval_ms(),
            client_timeout_ms: default_client_timeout_ms(),
            live_match_update_interval_ms: default_live_match_update_interval_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            ping_period_ms: default_ping_period_ms(),
            pong_wait_ms: default_pong_wait_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KvConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

/// Root configuration. Loaded from `Config.toml` plus environment overrides
/// (`GOVERNOR_*` prefix), matching the teacher's `Settings::new()` shape.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub tiers: TierConfig,
    #[serde(default)]
    pub endpoints: EndpointConfig,
    #[serde(default)]
    pub ddos: DdosConfig,
    #[serde(default)]
    pub ip_reputation: IpReputationConfig,
    #[serde(default)]
    pub regions: RegionConfig,
    #[serde(default)]
    pub upstream_fairness: UpstreamFairnessConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub kv: KvConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tiers: TierConfig::default(),
            endpoints: EndpointConfig::default(),
            ddos: DdosConfig::default(),
            ip_reputation: IpReputationConfig::default(),
            regions: RegionConfig::default(),
            upstream_fairness: UpstreamFairnessConfig::default(),
            streaming: StreamingConfig::default(),
            kv: KvConfig::default(),
        }
    }
}

impl Settings {
    /// Loads `Config.toml` from the current directory if present, then
    /// applies `GOVERNOR_*` environment overrides, falling back to
    /// compiled-in defaults when no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let raw = Config::builder()
            .add_source(File::with_name("Config").required(false))
            .build()?;

        let mut settings: Self = raw.try_deserialize()?;

        if let Ok(url) = env::var("GOVERNOR_REDIS_URL") {
            if !url.trim().is_empty() {
                settings.kv.redis_url = url;
            }
        }
        if let Ok(raw_countries) = env::var("GOVERNOR_DDOS_BLOCKED_COUNTRIES") {
            let list: Vec<String> = raw_countries
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !list.is_empty() {
                settings.ddos.blocked_countries = list;
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Enforces section 9's requirement that "duration_minutes >= 1" and
    /// that every region named elsewhere has a defined multiplier.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.streaming.client_update_interval_ms < 1000 {
            return Err(ConfigError::Message(
                "streaming.client_update_interval_ms must be >= 1000 (duration_minutes >= 1 invariant)"
                    .into(),
            ));
        }
        for region in &["KR", "JP", "OCE", "TR"] {
            if !self.regions.multipliers.contains_key(*region) {
                return Err(ConfigError::Message(format!(
                    "region '{}' has no configured multiplier",
                    region
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn unknown_tier_coerces_to_free() {
        assert_eq!(Tier::parse("vip"), Tier::Free);
        assert_eq!(Tier::parse("PRO"), Tier::Pro);
    }

    #[test]
    fn tier_ordering_is_total() {
        assert!(Tier::Free < Tier::Premium);
        assert!(Tier::Premium < Tier::Pro);
        assert!(Tier::Pro < Tier::Enterprise);
    }
}
