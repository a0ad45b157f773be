//! Capability traits the streaming fabric depends on but does not
//! implement itself (A6). Keeping these as traits — rather than
//! concrete HTTP/game-API clients — is what keeps this crate a library
//! the host application wires up, matching the teacher's `dex_adapter.rs`
//! style trait boundary between "what we need" and "how it's fetched".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use crate::event_bus::EventProcessor;
pub use crate::kv_store::KvStore;

/// A snapshot of one live match's state, as fetched from the upstream
/// gaming API (spec section 4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveMatchState {
    pub match_id: String,
    pub game_time_seconds: u64,
    pub status: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub player_id: String,
    pub in_game: bool,
    pub current_match_id: Option<String>,
}

/// Abstraction over the upstream gaming data provider. Implementations
/// live in the host application; this crate only calls through the trait.
#[async_trait]
pub trait GamingApiClient: Send + Sync {
    async fn get_live_match_state(&self, match_id: &str) -> anyhow::Result<LiveMatchState>;
    async fn get_player_status(&self, player_id: &str) -> anyhow::Result<PlayerStatus>;
}

/// Authenticated-request context, produced by the host application's auth
/// layer and consumed by the policy evaluator (spec section 3).
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Option<String>,
    pub subscription_tier: crate::settings::Tier,
    pub api_key_class: ApiKeyClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyClass {
    Personal,
    Production,
    None,
}
