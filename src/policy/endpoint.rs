//! Operation-class classification and the upstream-fairness production
//! lookup table (spec section 4.4 steps 6 and 8).

use crate::counters::{CounterEngine, CounterResult};
use crate::errors::{KvError, LimitKind};
use crate::settings::{Settings, Tier, TierConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsKind {
    Basic,
    Advanced,
    Realtime,
    Team,
    Comparison,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    Analytics(AnalyticsKind),
    Export,
    Realtime,
    MatchData,
    Insights,
    TeamData,
    General,
}

/// Classifies a canonical endpoint path pattern by substring match, most
/// specific first (realtime paths win over a generic analytics match).
pub fn classify(endpoint: &str) -> OperationClass {
    let e = endpoint.to_ascii_lowercase();
    if e.contains("/live") || e.contains("/current") || e.contains("/realtime") || e.contains("/streaming") {
        return OperationClass::Realtime;
    }
    if e.contains("analytics") {
        if e.contains("advanced") {
            return OperationClass::Analytics(AnalyticsKind::Advanced);
        }
        if e.contains("comparison") {
            return OperationClass::Analytics(AnalyticsKind::Comparison);
        }
        if e.contains("team") {
            return OperationClass::Analytics(AnalyticsKind::Team);
        }
        return OperationClass::Analytics(AnalyticsKind::Basic);
    }
    if e.contains("export") {
        return OperationClass::Export;
    }
    if e.contains("match") {
        return OperationClass::MatchData;
    }
    if e.contains("insight") {
        return OperationClass::Insights;
    }
    if e.contains("team") {
        return OperationClass::TeamData;
    }
    OperationClass::General
}

fn analytics_kind(class: OperationClass) -> (LimitKind, &'static str) {
    match class {
        OperationClass::Analytics(AnalyticsKind::Basic) => (LimitKind::AnalyticsBasicLimit, "basic"),
        OperationClass::Analytics(AnalyticsKind::Advanced) => (LimitKind::AnalyticsAdvancedLimit, "advanced"),
        OperationClass::Analytics(AnalyticsKind::Realtime) => (LimitKind::AnalyticsRealtimeLimit, "realtime"),
        OperationClass::Analytics(AnalyticsKind::Team) => (LimitKind::AnalyticsTeamLimit, "team"),
        OperationClass::Analytics(AnalyticsKind::Comparison) => (LimitKind::AnalyticsComparisonLimit, "comparison"),
        _ => unreachable!("analytics_kind called on a non-analytics class"),
    }
}

/// Runs the operation-class counter for `endpoint`, if its class carries one.
/// `General`, `MatchData`, `Insights` and `TeamData` fall back entirely on
/// the tier/endpoint windows already checked in earlier steps.
pub async fn evaluate_operation_class(
    counters: &CounterEngine,
    subject: &str,
    endpoint: &str,
    tier: Tier,
    tiers: &TierConfig,
) -> Result<Option<(CounterResult, LimitKind)>, KvError> {
    let limits = tiers.limits_for(tier);
    let class = classify(endpoint);
    match class {
        OperationClass::Analytics(_) => {
            let (kind, window_name) = analytics_kind(class);
            let limit = if limits.analytics_rpm < 0 {
                -1
            } else {
                limits.analytics_rpm * tier.analytics_multiplier()
            };
            let result = counters.check("analytics", subject, window_name, 60, limit).await?;
            Ok(Some((result, kind)))
        }
        OperationClass::Realtime => {
            let limit = if limits.analytics_rpm < 0 {
                -1
            } else {
                limits.analytics_rpm * tier.analytics_multiplier()
            };
            let result = counters.check("realtime", subject, "realtime", 60, limit).await?;
            Ok(Some((result, LimitKind::Realtime)))
        }
        OperationClass::Export => {
            let result = counters
                .check("export", subject, "daily", 86_400, limits.exports_per_day)
                .await?;
            Ok(Some((result, LimitKind::ExportDaily)))
        }
        OperationClass::MatchData | OperationClass::Insights | OperationClass::TeamData | OperationClass::General => {
            Ok(None)
        }
    }
}

/// Per-endpoint production-traffic fairness limit (spec section 4.4 step 8):
/// looked up by substring against the configured table, falling back to
/// `production_default`.
pub fn production_limit(settings: &Settings, endpoint: &str) -> i64 {
    let e = endpoint.to_ascii_lowercase();
    for (key, limit) in &settings.upstream_fairness.production_per_endpoint {
        if e.contains(key.as_str()) {
            return *limit;
        }
    }
    settings.upstream_fairness.production_default
}
