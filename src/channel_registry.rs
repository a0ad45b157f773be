//! Channel registry (C8): named pub-sub topics clients subscribe to.
//!
//! Grounded on the teacher's `graph_service.rs` subscriber-fanout pattern:
//! subscribers are snapshotted under a read lock and the actual sends
//! happen outside it, so a slow or dead client can't hold up the broadcast.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};

const BROADCAST_CAPACITY: usize = 256;

struct Channel {
    sender: broadcast::Sender<Arc<str>>,
    subscriber_count: usize,
    last_active: Instant,
}

/// `subscribe` creates the channel on demand. `gc` removes channels that
/// have had zero subscribers for longer than `channel_ttl` (spec section
/// 4.8) — it does not touch channels that still have listeners, however
/// idle.
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Channel>>,
    channel_ttl: Duration,
}

impl ChannelRegistry {
    pub fn new(channel_ttl: Duration) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            channel_ttl,
        }
    }

    pub async fn subscribe(&self, channel: &str) -> broadcast::Receiver<Arc<str>> {
        let mut channels = self.channels.write().await;
        let entry = channels.entry(channel.to_string()).or_insert_with(|| {
            let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
            Channel {
                sender,
                subscriber_count: 0,
                last_active: Instant::now(),
            }
        });
        entry.subscriber_count += 1;
        entry.last_active = Instant::now();
        entry.sender.subscribe()
    }

    pub async fn unsubscribe(&self, channel: &str) {
        let mut channels = self.channels.write().await;
        if let Some(entry) = channels.get_mut(channel) {
            entry.subscriber_count = entry.subscriber_count.saturating_sub(1);
            entry.last_active = Instant::now();
        }
    }

    /// Snapshots the channel's sender under the read lock, then sends
    /// outside it. A `SendError` (no receivers) is not an error here — it
    /// just means nobody is currently listening.
    pub async fn broadcast(&self, channel: &str, message: Arc<str>) -> usize {
        let sender = {
            let channels = self.channels.read().await;
            channels.get(channel).map(|c| c.sender.clone())
        };
        match sender {
            Some(sender) => sender.send(message).unwrap_or(0),
            None => 0,
        }
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .await
            .get(channel)
            .map(|c| c.subscriber_count)
            .unwrap_or(0)
    }

    pub async fn exists(&self, channel: &str) -> bool {
        self.channels.read().await.contains_key(channel)
    }

    /// Removes channels with no subscribers that have been idle past the
    /// configured TTL.
    pub async fn gc(&self) -> usize {
        let mut channels = self.channels.write().await;
        let ttl = self.channel_ttl;
        let before = channels.len();
        channels.retain(|_, c| c.subscriber_count > 0 || c.last_active.elapsed() < ttl);
        before - channels.len()
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_creates_channel_on_demand() {
        let registry = ChannelRegistry::new(Duration::from_secs(300));
        assert!(!registry.exists("live_match:1").await);
        let _rx = registry.subscribe("live_match:1").await;
        assert!(registry.exists("live_match:1").await);
    }

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let registry = ChannelRegistry::new(Duration::from_secs(300));
        let mut rx1 = registry.subscribe("chan").await;
        let mut rx2 = registry.subscribe("chan").await;
        let delivered = registry.broadcast("chan", Arc::from("hello")).await;
        assert_eq!(delivered, 2);
        assert_eq!(&*rx1.recv().await.unwrap(), "hello");
        assert_eq!(&*rx2.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn broadcast_to_unknown_channel_delivers_nothing() {
        let registry = ChannelRegistry::new(Duration::from_secs(300));
        let delivered = registry.broadcast("nobody-home", Arc::from("x")).await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn gc_removes_only_empty_idle_channels() {
        let registry = ChannelRegistry::new(Duration::from_millis(10));
        let rx = registry.subscribe("kept").await;
        let _rx2 = registry.subscribe("also-kept").await;
        registry.unsubscribe("kept").await;
        drop(rx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let removed = registry.gc().await;
        assert_eq!(removed, 1);
        assert!(!registry.exists("kept").await);
        assert!(registry.exists("also-kept").await);
    }
}
