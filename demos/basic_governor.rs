//! Evaluates a handful of requests through the governor chain and prints
//! the resulting headers/denials, the same way the teacher's
//! `liquidity_path` demo walked a single call through its pipeline.

use gaming_traffic_governor::counters::CounterEngine;
use gaming_traffic_governor::governor::{GovernorMiddleware, GovernorOutcome, GovernorRequest};
use gaming_traffic_governor::ip_reputation::IpReputation;
use gaming_traffic_governor::kv_store::memory::InMemoryKvStore;
use gaming_traffic_governor::policy::{PolicyEvaluator, PolicyRequest};
use gaming_traffic_governor::settings::{Settings, Tier};
use gaming_traffic_governor::threat_scorer::ThreatScorer;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gaming_traffic_governor::telemetry::init();

    let settings = Arc::new(Settings::default());
    let store = Arc::new(InMemoryKvStore::new());
    let counters = Arc::new(CounterEngine::new(store.clone()));
    let ip_reputation = Arc::new(IpReputation::new(store.clone(), &[], &[])?);
    let threat_scorer = Arc::new(ThreatScorer::new(store, settings.ddos.clone()));
    let evaluator = PolicyEvaluator::new(settings, counters, ip_reputation, threat_scorer);
    let governor = GovernorMiddleware::new(evaluator);

    let clean = PolicyRequest {
        ip: "198.51.100.10".parse()?,
        user_id: Some("player-42".to_string()),
        tier: Tier::Free,
        authenticated: true,
        endpoint: "/api/summoner".to_string(),
        region: Some("NA".to_string()),
        country: Some("US".to_string()),
        upstream_target: None,
        user_agent: "GamingApp/2.0".to_string(),
        raw_path: "/api/summoner".to_string(),
        referrer: Some("https://gaming.example/client".to_string()),
    };
    print_outcome("clean free-tier request", &governor, &clean).await;

    let mut suspicious = clean.clone();
    suspicious.user_agent = "masscan/1.0".to_string();
    suspicious.raw_path = "/admin/../etc/passwd".to_string();
    suspicious.referrer = None;
    print_outcome("request matching known attack path", &governor, &suspicious).await;

    let mut bursty = clean.clone();
    bursty.ip = "198.51.100.99".parse()?;
    for i in 0..25 {
        let outcome = governor.evaluate(&GovernorRequest { policy: bursty.clone() }).await;
        if matches!(outcome, GovernorOutcome::Deny { .. }) {
            println!("burst limit hit on request #{i}");
            break;
        }
    }

    Ok(())
}

async fn print_outcome(label: &str, governor: &GovernorMiddleware, req: &PolicyRequest) {
    let outcome = governor.evaluate(&GovernorRequest { policy: req.clone() }).await;
    match outcome {
        GovernorOutcome::Allow { headers } => {
            println!("{label}: allowed, headers={headers:?}");
        }
        GovernorOutcome::Deny { status, body, .. } => {
            println!("{label}: denied status={status} limit_type={} retry_after={}s", body.limit_type, body.retry_after_seconds);
        }
        GovernorOutcome::Challenge { status, body, .. } => {
            println!("{label}: challenge status={status} reason={} score={}", body.reason, body.suspicious_score);
        }
        GovernorOutcome::Error { message } => {
            println!("{label}: store error: {message}");
        }
    }
}
