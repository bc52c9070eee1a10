//! In-process event bus. The single-node default, and the test double:
//! tests subscribe and assert on the frames services publish.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use super::EventPublisher;
use crate::Result;

/// One published frame.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub channel: String,
    pub event: String,
    pub payload: Value,
}

#[derive(Debug)]
pub struct LocalBus {
    sender: broadcast::Sender<PublishedEvent>,
}

impl LocalBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventPublisher for LocalBus {
    async fn publish(&self, channel: &str, event: &str, payload: Value) -> Result<()> {
        // A send error only means nobody is subscribed right now.
        let _ = self.sender.send(PublishedEvent {
            channel: channel.to_string(),
            event: event.to_string(),
            payload,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_published_frames() {
        let bus = LocalBus::default();
        let mut rx = bus.subscribe();

        bus.publish("stream-s1", "like-update", json!({"totalLikes": 3}))
            .await
            .unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.channel, "stream-s1");
        assert_eq!(frame.event, "like-update");
        assert_eq!(frame.payload["totalLikes"], 3);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_fine() {
        let bus = LocalBus::default();
        bus.publish("stream-s1", "reaction", json!({})).await.unwrap();
    }
}
