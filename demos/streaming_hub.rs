//! Spins up the streaming hub's registries and the event bus, subscribes a
//! couple of fake clients to a live-match channel, and prints what arrives
//! — the websocket-framework wiring itself is left to the host application
//! (spec section 4.6).

use async_trait::async_trait;
use gaming_traffic_governor::channel_registry::ChannelRegistry;
use gaming_traffic_governor::collaborators::{GamingApiClient, LiveMatchState, PlayerStatus};
use gaming_traffic_governor::connection_registry::ConnectionRegistry;
use gaming_traffic_governor::event_bus::EventBus;
use gaming_traffic_governor::live_match::LiveMatchRegistry;
use gaming_traffic_governor::stats::Stats;
use std::sync::Arc;
use std::time::Duration;

struct DemoApi;

#[async_trait]
impl GamingApiClient for DemoApi {
    async fn get_live_match_state(&self, match_id: &str) -> anyhow::Result<LiveMatchState> {
        Ok(LiveMatchState {
            match_id: match_id.to_string(),
            game_time_seconds: 120,
            status: "in_progress".to_string(),
            data: serde_json::json!({ "kills": 3, "gold": 5400 }),
        })
    }

    async fn get_player_status(&self, player_id: &str) -> anyhow::Result<PlayerStatus> {
        Ok(PlayerStatus {
            player_id: player_id.to_string(),
            in_game: true,
            current_match_id: Some("match-7".to_string()),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gaming_traffic_governor::telemetry::init();

    let connections = Arc::new(ConnectionRegistry::new(1_000, 5, 50));
    let channels = Arc::new(ChannelRegistry::new(Duration::from_secs(300)));
    let stats = Arc::new(Stats::new());
    let bus = EventBus::new(1_000, stats.clone());
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let events = bus.spawn(2, shutdown_rx);

    let live_matches = Arc::new(LiveMatchRegistry::new(
        100,
        Arc::new(DemoApi),
        channels.clone(),
        events,
        Duration::from_millis(250),
    ));

    let session_a = connections.register(Some("viewer-a".to_string()))?;
    let session_b = connections.register(Some("viewer-b".to_string()))?;
    println!("admitted sessions {session_a} and {session_b}");

    let channel_name = "live_match:match-7";
    let mut rx_a = channels.subscribe(channel_name).await;
    let mut rx_b = channels.subscribe(channel_name).await;
    live_matches.get_or_spawn("match-7")?;

    for _ in 0..2 {
        let message = rx_a.recv().await?;
        println!("viewer-a received: {message}");
        let message = rx_b.recv().await?;
        println!("viewer-b received: {message}");
    }

    channels.unsubscribe(channel_name).await;
    channels.unsubscribe(channel_name).await;
    connections.unregister(session_a);
    connections.unregister(session_b);

    println!("final stats: {:?}", stats.snapshot());
    Ok(())
}
