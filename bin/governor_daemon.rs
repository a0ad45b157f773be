//! Entry point wiring the governor and streaming hub into one process.
//!
//! Mirrors the teacher's `background_discoverer.rs` shape: load settings,
//! build the storage-backed services, spawn the lifecycle manager, then
//! block on a shutdown signal. No HTTP/websocket server is started here —
//! this binary is the reference wiring a host application's listener calls
//! into (spec section 4.6, "not a general API gateway").

use clap::Parser;
use gaming_traffic_governor::channel_registry::ChannelRegistry;
use gaming_traffic_governor::connection_registry::ConnectionRegistry;
use gaming_traffic_governor::counters::CounterEngine;
use gaming_traffic_governor::event_bus::EventBus;
use gaming_traffic_governor::governor::GovernorMiddleware;
use gaming_traffic_governor::ip_reputation::IpReputation;
use gaming_traffic_governor::kv_store::memory::InMemoryKvStore;
use gaming_traffic_governor::kv_store::KvStore;
use gaming_traffic_governor::lifecycle::{LifecycleIntervals, LifecycleManager};
use gaming_traffic_governor::live_match::LiveMatchRegistry;
use gaming_traffic_governor::policy::PolicyEvaluator;
use gaming_traffic_governor::settings::Settings;
use gaming_traffic_governor::stats::Stats;
use gaming_traffic_governor::threat_scorer::ThreatScorer;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The upstream gaming API client is a collaborator this crate never
/// implements (spec section 4.10, `collaborators`); the daemon runs against
/// a stub so it can demonstrate wiring without a real API key.
struct StubGamingApi;

#[async_trait::async_trait]
impl gaming_traffic_governor::GamingApiClient for StubGamingApi {
    async fn get_live_match_state(
        &self,
        match_id: &str,
    ) -> anyhow::Result<gaming_traffic_governor::collaborators::LiveMatchState> {
        Ok(gaming_traffic_governor::collaborators::LiveMatchState {
            match_id: match_id.to_string(),
            game_time_seconds: 0,
            status: "in_progress".to_string(),
            data: serde_json::json!({}),
        })
    }

    async fn get_player_status(
        &self,
        player_id: &str,
    ) -> anyhow::Result<gaming_traffic_governor::collaborators::PlayerStatus> {
        Ok(gaming_traffic_governor::collaborators::PlayerStatus {
            player_id: player_id.to_string(),
            in_game: false,
            current_match_id: None,
        })
    }
}

#[derive(Parser, Debug)]
#[command(name = "governor_daemon", about = "Gaming traffic governor + streaming hub")]
struct Args {
    /// Emit logs as newline-delimited JSON instead of the default text format.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.json_logs {
        gaming_traffic_governor::telemetry::init_json();
    } else {
        gaming_traffic_governor::telemetry::init();
    }

    let settings = Arc::new(Settings::load()?);
    info!("settings loaded, starting governor daemon");

    let store: Arc<dyn KvStore> = build_kv_store(&settings).await?;

    let counters = Arc::new(CounterEngine::new(store.clone()));
    let ip_reputation = Arc::new(IpReputation::new(
        store.clone(),
        &settings.ip_reputation.allowlist,
        &settings.ip_reputation.denylist,
    )?);
    let threat_scorer = Arc::new(ThreatScorer::new(store.clone(), settings.ddos.clone()));
    let evaluator = PolicyEvaluator::new(
        settings.clone(),
        counters,
        ip_reputation,
        threat_scorer,
    );
    let governor = GovernorMiddleware::new(evaluator);
    // The middleware is ready for a host web framework to call `evaluate`
    // per request; this binary only demonstrates the wiring, so it is kept
    // alive via the lifecycle manager below rather than serving traffic.
    let _governor = governor;

    let connections = Arc::new(ConnectionRegistry::new(
        settings.streaming.max_connections,
        settings.streaming.max_connections_per_user,
        settings.streaming.max_channels_per_client,
    ));
    let channels = Arc::new(ChannelRegistry::new(Duration::from_secs(
        settings.streaming.channel_ttl_seconds,
    )));

    let stats = Arc::new(Stats::new());
    let mut bus = EventBus::new(settings.streaming.event_queue_size, stats.clone());
    bus.register(Arc::new(LoggingProcessor));
    let (bus_shutdown_tx, bus_shutdown_rx) = tokio::sync::watch::channel(false);
    let events = bus.spawn(settings.streaming.event_workers, bus_shutdown_rx);

    let live_matches = Arc::new(LiveMatchRegistry::new(
        settings.streaming.max_live_matches,
        Arc::new(StubGamingApi),
        channels.clone(),
        events.clone(),
        Duration::from_millis(settings.streaming.live_match_update_interval_ms),
    ));

    let intervals = LifecycleIntervals {
        cleanup_sweep: Duration::from_millis(settings.streaming.client_update_interval_ms),
        metrics_sample: Duration::from_secs(10),
        live_match_scan: Duration::from_millis(settings.streaming.live_match_update_interval_ms),
        shutdown_grace: Duration::from_millis(settings.streaming.shutdown_grace_ms),
    };
    let lifecycle = Arc::new(LifecycleManager::new(
        connections,
        channels,
        live_matches,
        stats,
        events,
        intervals,
        Duration::from_millis(settings.streaming.client_timeout_ms),
    ));
    lifecycle.start();

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let snapshot = lifecycle.shutdown().await;
    let _ = bus_shutdown_tx.send(true);
    info!(?snapshot, "governor daemon stopped");

    Ok(())
}

async fn build_kv_store(settings: &Settings) -> anyhow::Result<Arc<dyn KvStore>> {
    #[cfg(feature = "redis")]
    {
        match gaming_traffic_governor::kv_store::redis_store::RedisKvStore::connect(&settings.kv.redis_url).await {
            Ok(store) => return Ok(Arc::new(store)),
            Err(e) => {
                tracing::warn!(error = %e, "falling back to in-memory KV store");
            }
        }
    }
    let _ = settings;
    Ok(Arc::new(InMemoryKvStore::new()))
}

struct LoggingProcessor;

#[async_trait::async_trait]
impl gaming_traffic_governor::event_bus::EventProcessor for LoggingProcessor {
    async fn process(&self, event: &gaming_traffic_governor::event_bus::StreamEvent) -> anyhow::Result<()> {
        tracing::debug!(channel = %event.channel, event_type = %event.event_type, "dispatched stream event");
        Ok(())
    }

    fn event_type(&self) -> &str {
        "live_match_update"
    }
}
