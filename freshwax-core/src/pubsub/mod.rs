//! Pub/sub adapter
//!
//! Fire-and-forget broadcast to named channels; delivery is at-most-once
//! and best-effort. Publish failures are logged by callers, never
//! propagated: remote events are reconciliation triggers, not state.

mod local;
mod pusher;

pub use local::LocalBus;
pub use pusher::{PusherCredentials, PusherTransport};

use async_trait::async_trait;
use serde_json::Value;

use crate::models::SlotId;
use crate::Result;

/// Channel carrying playlist synchronization events.
pub const PLAYLIST_CHANNEL: &str = "live-playlist";
/// Channel carrying the public schedule-changed signal.
pub const SCHEDULE_CHANNEL: &str = "schedule";

pub const EVENT_VIEWER_UPDATE: &str = "viewer-update";
pub const EVENT_LIKE_UPDATE: &str = "like-update";
pub const EVENT_REACTION: &str = "reaction";
pub const EVENT_SHOUTOUT: &str = "shoutout";
pub const EVENT_PLAYLIST_UPDATE: &str = "playlist-update";
pub const EVENT_SCHEDULE_UPDATE: &str = "schedule-update";

/// Per-stream channel name.
#[must_use]
pub fn stream_channel(slot_id: &SlotId) -> String {
    format!("stream-{slot_id}")
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, channel: &str, event: &str, payload: Value) -> Result<()>;
}

/// Publish and swallow failures with a log line; the canonical call site
/// for every non-critical fan-out.
pub async fn publish_best_effort(
    publisher: &dyn EventPublisher,
    channel: &str,
    event: &str,
    payload: Value,
) {
    if let Err(err) = publisher.publish(channel, event, payload).await {
        tracing::warn!(channel, event, error = %err, "event publish failed");
    }
}
