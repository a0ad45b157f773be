//! Websocket wire protocol (spec section 6.2).
//!
//! Plain `serde`-tagged envelopes; no websocket framework is vendored here
//! (the host application owns the socket and calls into the connection
//! registry / channel registry with the parsed messages), matching the
//! teacher's ABI-struct style in `src/contracts/` — data shapes only, no
//! transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound message from a connected client (spec section 6.2).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    Subscribe {
        data: SubscribeData,
        #[serde(default)]
        request_id: Option<String>,
    },
    Unsubscribe {
        data: SubscribeData,
        #[serde(default)]
        request_id: Option<String>,
    },
    LiveMatchSubscribe {
        data: MatchSubscribeData,
        #[serde(default)]
        request_id: Option<String>,
    },
    PlayerSubscribe {
        data: PlayerSubscribeData,
        #[serde(default)]
        request_id: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeData {
    pub channel: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchSubscribeData {
    pub match_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerSubscribeData {
    pub player_id: String,
}

/// Outbound message to a connected client (spec section 6.2).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        client_id: String,
        server_time: i64,
        capabilities: Capabilities,
    },
    Pong {
        timestamp: i64,
    },
    Subscribed {
        channel: String,
        timestamp: i64,
    },
    Unsubscribed {
        channel: String,
        timestamp: i64,
    },
    LiveMatchState {
        channel: String,
        timestamp: i64,
        data: Value,
        message_id: u64,
    },
    LiveMatchEvent {
        channel: String,
        timestamp: i64,
        data: Value,
        message_id: u64,
    },
    PlayerStatus {
        channel: String,
        timestamp: i64,
        data: Value,
        message_id: u64,
    },
    PlayerUpdate {
        channel: String,
        timestamp: i64,
        data: Value,
        message_id: u64,
    },
    AnalyticsUpdate {
        channel: String,
        timestamp: i64,
        data: Value,
        message_id: u64,
    },
    Notification {
        channel: String,
        timestamp: i64,
        data: Value,
        message_id: u64,
    },
    Heartbeat {
        timestamp: i64,
    },
    Error {
        timestamp: i64,
        data: ErrorPayload,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

/// The enabled features and intervals surfaced in `welcome.capabilities`
/// (spec section 6.2), sourced from `StreamingConfig`.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub live_match: bool,
    pub player_status: bool,
    pub analytics: bool,
    pub notifications: bool,
    pub ping_period_ms: u64,
    pub pong_wait_ms: u64,
}

impl From<&crate::settings::StreamingConfig> for Capabilities {
    fn from(cfg: &crate::settings::StreamingConfig) -> Self {
        Self {
            live_match: true,
            player_status: true,
            analytics: true,
            notifications: true,
            ping_period_ms: cfg.ping_period_ms,
            pong_wait_ms: cfg.pong_wait_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subscribe_message() {
        let raw = r#"{"type":"subscribe","data":{"channel":"analytics:summary"},"request_id":"r1"}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMessage::Subscribe { data, request_id } => {
                assert_eq!(data.channel, "analytics:summary");
                assert_eq!(request_id.as_deref(), Some("r1"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn parses_ping_with_no_data() {
        let raw = r#"{"type":"ping"}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn serializes_welcome_with_tagged_type() {
        let msg = ServerMessage::Welcome {
            client_id: "c1".to_string(),
            server_time: 1_700_000_000,
            capabilities: Capabilities {
                live_match: true,
                player_status: true,
                analytics: true,
                notifications: true,
                ping_period_ms: 20_000,
                pong_wait_ms: 10_000,
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "welcome");
        assert_eq!(json["client_id"], "c1");
    }
}
