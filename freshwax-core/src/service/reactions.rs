//! Reactions and presence
//!
//! Viewer-session tracking, like/rating aggregation, and broadcast of
//! ephemeral emoji/star/shoutout events. Counters on the slot are
//! projections: periodically reconciled from the active sessions, never
//! authoritative.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::clock::Clock;
use crate::models::{
    generate_id, ReactionRecord, ReactionType, SessionId, SlotId, UserId, ViewerSession,
};
use crate::pubsub::{
    publish_best_effort, stream_channel, EventPublisher, EVENT_LIKE_UPDATE, EVENT_REACTION,
    EVENT_SHOUTOUT, EVENT_VIEWER_UPDATE,
};
use crate::repo::{LiveRepository, ReactionRepository, SlotRepository};
use crate::{Error, Result};

/// Shoutout messages are 1..=30 characters.
const SHOUTOUT_MAX_CHARS: usize = 30;

/// Counters returned to presence callers.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerCounters {
    pub current_viewers: i64,
    pub viewer_peak: i64,
    pub total_likes: i64,
}

/// A caller's prior durable reactions on a stream.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerReactionState {
    pub has_liked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
}

#[derive(Clone)]
pub struct ReactionService {
    slots: SlotRepository,
    reactions: ReactionRepository,
    live: LiveRepository,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ReactionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactionService").finish()
    }
}

impl ReactionService {
    #[must_use]
    pub fn new(
        slots: SlotRepository,
        reactions: ReactionRepository,
        live: LiveRepository,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            slots,
            reactions,
            live,
            publisher,
            clock,
        }
    }

    /// Register a viewer. Re-joining with the same session id refreshes
    /// the heartbeat instead of double-counting.
    pub async fn join(
        &self,
        stream_id: &SlotId,
        user_id: Option<&UserId>,
        session_id: &SessionId,
    ) -> Result<ViewerCounters> {
        let slot = self.slots.require(stream_id).await?;
        let now = self.clock.now();

        if let Some(existing) = self
            .reactions
            .find_active_session(stream_id, session_id)
            .await?
        {
            self.reactions
                .update_session(&existing.id, json!({ "lastHeartbeat": now }))
                .await?;
            return self.counters(stream_id).await;
        }

        let session = ViewerSession {
            id: generate_id(),
            stream_id: stream_id.clone(),
            user_id: user_id.cloned(),
            session_id: session_id.clone(),
            joined_at: now,
            left_at: None,
            last_heartbeat: now,
            is_active: true,
        };
        self.reactions.create_session(&session).await?;

        let current = self
            .slots
            .increment_field(stream_id, "currentViewers", 1.0)
            .await? as i64;
        self.slots
            .increment_field(stream_id, "totalViews", 1.0)
            .await?;
        if current > slot.viewer_peak {
            self.slots
                .update_fields(stream_id, json!({ "viewerPeak": current }))
                .await?;
        }
        if let Err(err) = self
            .live
            .increment_field(stream_id, "currentViewers", 1.0)
            .await
        {
            tracing::debug!(stream_id = %stream_id, error = %err, "live viewer mirror failed");
        }

        self.publish_viewer_update(stream_id).await;
        self.counters(stream_id).await
    }

    /// Unregister a viewer session. Leaving twice is a no-op.
    pub async fn leave(
        &self,
        stream_id: &SlotId,
        session_id: &SessionId,
    ) -> Result<ViewerCounters> {
        let now = self.clock.now();
        let Some(session) = self
            .reactions
            .find_active_session(stream_id, session_id)
            .await?
        else {
            return self.counters(stream_id).await;
        };

        self.reactions
            .update_session(&session.id, json!({ "isActive": false, "leftAt": now }))
            .await?;

        let current = self
            .slots
            .increment_field(stream_id, "currentViewers", -1.0)
            .await? as i64;
        if current < 0 {
            self.slots
                .update_fields(stream_id, json!({ "currentViewers": 0 }))
                .await?;
        }
        if let Err(err) = self
            .live
            .increment_field(stream_id, "currentViewers", -1.0)
            .await
        {
            tracing::debug!(stream_id = %stream_id, error = %err, "live viewer mirror failed");
        }

        self.publish_viewer_update(stream_id).await;
        self.counters(stream_id).await
    }

    /// Keep a session alive; `NotFound` tells the client to re-join.
    pub async fn heartbeat(
        &self,
        stream_id: &SlotId,
        session_id: &SessionId,
    ) -> Result<ViewerCounters> {
        let session = self
            .reactions
            .find_active_session(stream_id, session_id)
            .await?
            .ok_or_else(|| Error::NotFound("No active viewer session".to_string()))?;
        self.reactions
            .update_session(&session.id, json!({ "lastHeartbeat": self.clock.now() }))
            .await?;
        self.counters(stream_id).await
    }

    /// Likes accumulate; no per-user dedup.
    pub async fn like(&self, stream_id: &SlotId, user_id: &UserId) -> Result<i64> {
        self.slots.require(stream_id).await?;
        let now = self.clock.now();
        self.reactions.new_like(stream_id, user_id, now).await?;
        let total = self
            .slots
            .increment_field(stream_id, "totalLikes", 1.0)
            .await? as i64;

        publish_best_effort(
            self.publisher.as_ref(),
            &stream_channel(stream_id),
            EVENT_LIKE_UPDATE,
            json!({ "totalLikes": total, "timestamp": now }),
        )
        .await;
        Ok(total)
    }

    /// Upsert the caller's 1–5 rating and fold it into the running
    /// average.
    pub async fn rate(&self, stream_id: &SlotId, user_id: &UserId, rating: u8) -> Result<f64> {
        if !(1..=5).contains(&rating) {
            return Err(Error::InvalidRequest(
                "Rating must be between 1 and 5".to_string(),
            ));
        }
        let slot = self.slots.require(stream_id).await?;
        let now = self.clock.now();

        let prior = self.reactions.find_rating(stream_id, user_id).await?;
        let (average, count) = match prior {
            None => {
                let record = ReactionRecord {
                    id: generate_id(),
                    stream_id: stream_id.clone(),
                    user_id: user_id.clone(),
                    reaction_type: ReactionType::Rating,
                    rating: Some(rating),
                    created_at: now,
                };
                self.reactions.append(&record).await?;
                let count = slot.rating_count + 1;
                let average = (slot.average_rating * slot.rating_count as f64
                    + f64::from(rating))
                    / count as f64;
                (average, count)
            }
            Some(mut record) => {
                let old = f64::from(record.rating.unwrap_or(0));
                record.rating = Some(rating);
                self.reactions.append(&record).await?;
                let count = slot.rating_count.max(1);
                let average = (slot.average_rating * count as f64 - old + f64::from(rating))
                    / count as f64;
                (average, count)
            }
        };

        self.slots
            .update_fields(
                stream_id,
                json!({ "averageRating": average, "ratingCount": count }),
            )
            .await?;
        Ok(average)
    }

    /// Broadcast-only emoji burst.
    pub async fn emoji(
        &self,
        stream_id: &SlotId,
        user_id: &UserId,
        user_name: &str,
        emoji: &str,
        session_id: Option<&SessionId>,
    ) -> Result<()> {
        if emoji.trim().is_empty() {
            return Err(Error::InvalidRequest("Empty emoji".to_string()));
        }
        publish_best_effort(
            self.publisher.as_ref(),
            &stream_channel(stream_id),
            EVENT_REACTION,
            json!({
                "type": "emoji",
                "emoji": emoji,
                "userName": user_name,
                "userId": user_id,
                "sessionId": session_id,
                "timestamp": self.clock.now(),
            }),
        )
        .await;
        Ok(())
    }

    /// Broadcast-only star burst.
    pub async fn star(
        &self,
        stream_id: &SlotId,
        user_id: &UserId,
        user_name: &str,
        count: u32,
    ) -> Result<()> {
        publish_best_effort(
            self.publisher.as_ref(),
            &stream_channel(stream_id),
            EVENT_REACTION,
            json!({
                "type": "star",
                "count": count.max(1),
                "userName": user_name,
                "userId": user_id,
                "timestamp": self.clock.now(),
            }),
        )
        .await;
        Ok(())
    }

    /// Broadcast-only shoutout; message must be 1..=30 characters.
    pub async fn shoutout(&self, stream_id: &SlotId, name: &str, message: &str) -> Result<()> {
        let message = message.trim();
        if message.is_empty() || message.chars().count() > SHOUTOUT_MAX_CHARS {
            return Err(Error::InvalidRequest(format!(
                "Shoutout message must be 1-{SHOUTOUT_MAX_CHARS} characters"
            )));
        }
        publish_best_effort(
            self.publisher.as_ref(),
            &stream_channel(stream_id),
            EVENT_SHOUTOUT,
            json!({
                "name": name,
                "message": message,
                "timestamp": self.clock.now(),
            }),
        )
        .await;
        Ok(())
    }

    /// A caller's prior like/rating state for the GET endpoint.
    pub async fn viewer_state(
        &self,
        stream_id: &SlotId,
        user_id: &UserId,
    ) -> Result<ViewerReactionState> {
        let has_liked = self.reactions.has_liked(stream_id, user_id).await?;
        let rating = self
            .reactions
            .find_rating(stream_id, user_id)
            .await?
            .and_then(|r| r.rating);
        Ok(ViewerReactionState { has_liked, rating })
    }

    /// Recover `currentViewers` from the active sessions (the source of
    /// truth) and fan out the corrected count.
    pub async fn reconcile_viewers(&self, stream_id: &SlotId) -> Result<i64> {
        let actual = self.reactions.active_sessions(stream_id).await?.len() as i64;
        let slot = self.slots.require(stream_id).await?;
        if slot.current_viewers != actual {
            tracing::info!(
                stream_id = %stream_id,
                recorded = slot.current_viewers,
                actual,
                "viewer counter drift corrected"
            );
            self.slots
                .update_fields(
                    stream_id,
                    json!({
                        "currentViewers": actual,
                        "viewerPeak": slot.viewer_peak.max(actual),
                    }),
                )
                .await?;
            self.publish_viewer_update(stream_id).await;
        }
        Ok(actual)
    }

    async fn counters(&self, stream_id: &SlotId) -> Result<ViewerCounters> {
        let slot = self.slots.require(stream_id).await?;
        Ok(ViewerCounters {
            current_viewers: slot.current_viewers.max(0),
            viewer_peak: slot.viewer_peak,
            total_likes: slot.total_likes,
        })
    }

    async fn publish_viewer_update(&self, stream_id: &SlotId) {
        let counters = match self.counters(stream_id).await {
            Ok(c) => c,
            Err(err) => {
                tracing::debug!(stream_id = %stream_id, error = %err, "counter read failed");
                return;
            }
        };
        publish_best_effort(
            self.publisher.as_ref(),
            &stream_channel(stream_id),
            EVENT_VIEWER_UPDATE,
            json!({
                "currentViewers": counters.current_viewers,
                "peakViewers": counters.viewer_peak,
                "timestamp": self.clock.now(),
            }),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{Slot, SlotStatus};
    use crate::pubsub::LocalBus;
    use crate::store::MemoryStore;

    fn fixture() -> (ReactionService, SlotRepository, Arc<LocalBus>, SlotId) {
        let store = Arc::new(MemoryStore::new());
        let slots = SlotRepository::new(store.clone());
        let reactions = ReactionRepository::new(store.clone());
        let live = LiveRepository::new(store);
        let bus = Arc::new(LocalBus::default());
        let clock = Arc::new(ManualClock::new("2025-01-10T10:00:00Z".parse().unwrap()));
        let service = ReactionService::new(
            slots.clone(),
            reactions,
            live,
            bus.clone(),
            clock,
        );
        (service, slots, bus, SlotId::from_string("stream1".to_string()))
    }

    async fn seed_live_slot(slots: &SlotRepository, id: &SlotId) {
        let start: DateTime<Utc> = "2025-01-10T09:00:00Z".parse().unwrap();
        let slot = Slot {
            id: id.clone(),
            dj_id: UserId::from_string("dj1".to_string()),
            dj_name: "DJ One".to_string(),
            start_time: start,
            end_time: "2025-01-10T11:00:00Z".parse().unwrap(),
            duration: 120,
            status: SlotStatus::Live,
            stream_key: None,
            title: "set".to_string(),
            genre: String::new(),
            description: String::new(),
            is_relay: false,
            relay_source: None,
            created_at: start,
            updated_at: start,
            viewer_peak: 0,
            current_viewers: 0,
            total_views: 0,
            total_likes: 0,
            average_rating: 0.0,
            rating_count: 0,
            started_at: Some(start),
            ended_at: None,
            cancelled_at: None,
            original_start_time: None,
            queued_after: None,
            went_live_at: Some(start),
            end_reason: None,
            takeover_history: Vec::new(),
        };
        slots.put(&slot).await.unwrap();
    }

    #[tokio::test]
    async fn join_is_idempotent_per_session() {
        let (service, slots, _bus, stream) = fixture();
        seed_live_slot(&slots, &stream).await;
        let session = SessionId::from_string("sess1".to_string());

        let counters = service.join(&stream, None, &session).await.unwrap();
        assert_eq!(counters.current_viewers, 1);

        // Same session joining again does not double-count.
        let counters = service.join(&stream, None, &session).await.unwrap();
        assert_eq!(counters.current_viewers, 1);

        let other = SessionId::from_string("sess2".to_string());
        let counters = service.join(&stream, None, &other).await.unwrap();
        assert_eq!(counters.current_viewers, 2);
        assert_eq!(counters.viewer_peak, 2);
    }

    #[tokio::test]
    async fn leave_floors_at_zero() {
        let (service, slots, _bus, stream) = fixture();
        seed_live_slot(&slots, &stream).await;
        let session = SessionId::from_string("sess1".to_string());

        service.join(&stream, None, &session).await.unwrap();
        let counters = service.leave(&stream, &session).await.unwrap();
        assert_eq!(counters.current_viewers, 0);

        // A second leave is a no-op.
        let counters = service.leave(&stream, &session).await.unwrap();
        assert_eq!(counters.current_viewers, 0);
    }

    #[tokio::test]
    async fn likes_accumulate() {
        let (service, slots, bus, stream) = fixture();
        seed_live_slot(&slots, &stream).await;
        let user = UserId::from_string("u1".to_string());
        let mut rx = bus.subscribe();

        assert_eq!(service.like(&stream, &user).await.unwrap(), 1);
        assert_eq!(service.like(&stream, &user).await.unwrap(), 2);

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.event, EVENT_LIKE_UPDATE);
        assert_eq!(frame.channel, "stream-stream1");
        assert_eq!(frame.payload["totalLikes"], 1);
    }

    #[tokio::test]
    async fn rating_math_first_and_update() {
        let (service, slots, _bus, stream) = fixture();
        seed_live_slot(&slots, &stream).await;
        let alice = UserId::from_string("alice".to_string());
        let bob = UserId::from_string("bob".to_string());

        // First ratings fold into the average with a growing count.
        let avg = service.rate(&stream, &alice, 4).await.unwrap();
        assert!((avg - 4.0).abs() < f64::EPSILON);
        let avg = service.rate(&stream, &bob, 2).await.unwrap();
        assert!((avg - 3.0).abs() < f64::EPSILON);

        // Alice revises: count stays 2, average becomes (2 + 2) / 2.
        let avg = service.rate(&stream, &alice, 2).await.unwrap();
        assert!((avg - 2.0).abs() < f64::EPSILON);

        let slot = slots.require(&stream).await.unwrap();
        assert_eq!(slot.rating_count, 2);

        // Only one rating record per user.
        let state = service.viewer_state(&stream, &alice).await.unwrap();
        assert_eq!(state.rating, Some(2));
        assert!(!state.has_liked);
    }

    #[tokio::test]
    async fn rating_out_of_range_is_rejected() {
        let (service, slots, _bus, stream) = fixture();
        seed_live_slot(&slots, &stream).await;
        let user = UserId::from_string("u1".to_string());

        assert!(matches!(
            service.rate(&stream, &user, 0).await.unwrap_err(),
            Error::InvalidRequest(_)
        ));
        assert!(matches!(
            service.rate(&stream, &user, 6).await.unwrap_err(),
            Error::InvalidRequest(_)
        ));
    }

    #[tokio::test]
    async fn shoutout_length_limits() {
        let (service, slots, bus, stream) = fixture();
        seed_live_slot(&slots, &stream).await;
        let mut rx = bus.subscribe();

        service.shoutout(&stream, "MC", "big up the headphone crew").await.unwrap();
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.event, EVENT_SHOUTOUT);
        assert_eq!(frame.payload["name"], "MC");

        let too_long = "x".repeat(31);
        assert!(service.shoutout(&stream, "MC", &too_long).await.is_err());
        assert!(service.shoutout(&stream, "MC", "   ").await.is_err());
    }

    #[tokio::test]
    async fn reconcile_recovers_from_drift() {
        let (service, slots, _bus, stream) = fixture();
        seed_live_slot(&slots, &stream).await;
        let session = SessionId::from_string("sess1".to_string());
        service.join(&stream, None, &session).await.unwrap();

        // Simulate drift: the counter says 5, but one session is active.
        slots
            .update_fields(&stream, json!({ "currentViewers": 5 }))
            .await
            .unwrap();
        let actual = service.reconcile_viewers(&stream).await.unwrap();
        assert_eq!(actual, 1);
        assert_eq!(slots.require(&stream).await.unwrap().current_viewers, 1);
    }
}
