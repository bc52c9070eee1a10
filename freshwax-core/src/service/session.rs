//! Live-session state machine
//!
//! Owns slot status transitions driven by ingest webhooks and the periodic
//! auto-switchover tick, plus the public current-live and key-countdown
//! projections.
//!
//! Transition writes are fatal if they error (the tick retries next
//! cycle); projection updates and fan-out never fail a transition.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cache::ScheduleCache;
use crate::clock::Clock;
use crate::config::IngestConfig;
use crate::crypto::{constant_time_eq, hmac_sha256_hex_bytes};
use crate::models::{PublicSlot, Slot, SlotId, SlotStatus, UserId};
use crate::pubsub::{
    publish_best_effort, stream_channel, EventPublisher, EVENT_SCHEDULE_UPDATE,
    EVENT_VIEWER_UPDATE, SCHEDULE_CHANNEL,
};
use crate::repo::{ArtistRepository, LiveRepository, ReactionRepository, SlotRepository};
use crate::service::credentials::StreamKeyService;
use crate::service::scheduler::ScheduleView;
use crate::{Error, Result};

/// Gap required between a live slot's end and the next reservation for
/// go-live-after to be possible, minutes.
const GO_LIVE_AFTER_GAP_MINUTES: i64 = 5;

/// Events posted by the ingest server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestEventKind {
    Publish,
    Unpublish,
    ViewerJoin,
    ViewerLeave,
    RecordStart,
    RecordStop,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestEvent {
    pub event: IngestEventKind,
    pub stream_key: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Key-reveal countdown for a DJ's next slot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyCountdown {
    pub key_available: bool,
    /// Seconds until the key appears; 0 when available or no slot.
    pub time_until_key: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<PublicSlot>,
}

/// Current live slot with its end countdown.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveNow {
    pub slot: PublicSlot,
    /// Seconds left, floored at zero.
    pub time_remaining: i64,
    pub show_countdown: bool,
}

#[derive(Clone)]
pub struct LiveSessionService {
    slots: SlotRepository,
    artists: ArtistRepository,
    live: LiveRepository,
    viewers: ReactionRepository,
    keys: StreamKeyService,
    publisher: Arc<dyn EventPublisher>,
    cache: ScheduleCache<ScheduleView>,
    clock: Arc<dyn Clock>,
    ingest: IngestConfig,
}

impl std::fmt::Debug for LiveSessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSessionService").finish()
    }
}

impl LiveSessionService {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        slots: SlotRepository,
        artists: ArtistRepository,
        live: LiveRepository,
        viewers: ReactionRepository,
        keys: StreamKeyService,
        publisher: Arc<dyn EventPublisher>,
        cache: ScheduleCache<ScheduleView>,
        clock: Arc<dyn Clock>,
        ingest: IngestConfig,
    ) -> Self {
        Self {
            slots,
            artists,
            live,
            viewers,
            keys,
            publisher,
            cache,
            clock,
            ingest,
        }
    }

    /// Constant-time webhook signature check over the raw body.
    #[must_use]
    pub fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        let expected = hmac_sha256_hex_bytes(&self.ingest.webhook_secret, raw_body);
        constant_time_eq(&expected, signature.trim())
    }

    /// DJ marks themselves ready; scheduled → in_lobby, only inside the
    /// reveal window.
    pub async fn mark_ready(&self, slot_id: &SlotId, caller: &UserId) -> Result<Slot> {
        let mut slot = self.slots.require(slot_id).await?;
        if slot.dj_id != *caller {
            return Err(Error::Forbidden("Not your slot".to_string()));
        }
        if slot.status != SlotStatus::Scheduled {
            return Err(Error::Conflict(format!(
                "Slot is {}, not scheduled",
                slot.status.as_str()
            )));
        }
        let now = self.clock.now();
        if now < slot.start_time - Duration::minutes(self.ingest.reveal_minutes) {
            return Err(Error::Forbidden(
                "The lobby opens with the key-reveal window".to_string(),
            ));
        }

        slot.status = SlotStatus::InLobby;
        slot.updated_at = now;
        self.slots.put(&slot).await?;
        self.signal_schedule_change().await;
        tracing::info!(slot_id = %slot.id, "dj entered lobby");
        Ok(slot)
    }

    /// Apply a verified ingest webhook event. Unknown keys are logged and
    /// swallowed so the ingest server never retries.
    pub async fn apply_webhook(&self, event: &IngestEvent) -> Result<()> {
        let mut matches = self.slots.find_by_stream_key(&event.stream_key).await?;
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let Some(slot) = matches
            .into_iter()
            .find(|s| s.status != SlotStatus::Cancelled)
        else {
            tracing::warn!(event = ?event.event, "webhook for unknown stream key");
            return Ok(());
        };

        match event.event {
            IngestEventKind::Publish => self.on_publish(slot).await,
            IngestEventKind::Unpublish => self.on_unpublish(slot).await,
            IngestEventKind::ViewerJoin => self.on_viewer_delta(slot, 1).await,
            IngestEventKind::ViewerLeave => self.on_viewer_delta(slot, -1).await,
            IngestEventKind::RecordStart | IngestEventKind::RecordStop => {
                tracing::info!(
                    slot_id = %slot.id,
                    event = ?event.event,
                    client_ip = event.client_ip.as_deref().unwrap_or(""),
                    "recording event"
                );
                Ok(())
            }
            IngestEventKind::Unknown => {
                tracing::warn!(slot_id = %slot.id, "unknown webhook event");
                Ok(())
            }
        }
    }

    async fn on_publish(&self, mut slot: Slot) -> Result<()> {
        let now = self.clock.now();
        if slot.status == SlotStatus::Live {
            tracing::debug!(slot_id = %slot.id, "publish for already-live slot");
        }
        slot.status = SlotStatus::Live;
        slot.started_at.get_or_insert(now);
        slot.went_live_at = Some(now);
        slot.updated_at = now;
        self.slots.put(&slot).await?;

        let hls = slot
            .stream_key
            .as_deref()
            .map(|key| self.keys.hls_url(key));
        if let Err(err) = self.live.upsert_live(&slot, hls, now).await {
            tracing::warn!(slot_id = %slot.id, error = %err, "live projection failed");
        }
        self.signal_schedule_change().await;
        tracing::info!(slot_id = %slot.id, dj_id = %slot.dj_id, "stream went live");
        Ok(())
    }

    async fn on_unpublish(&self, mut slot: Slot) -> Result<()> {
        let now = self.clock.now();
        if slot.status.is_terminal() {
            return Ok(());
        }

        if now < slot.end_time {
            slot.status = SlotStatus::Failed;
            slot.end_reason = Some("disconnected".to_string());
        } else {
            slot.status = SlotStatus::Completed;
            slot.end_reason = Some("scheduled_end".to_string());
        }
        slot.ended_at = Some(now);
        slot.updated_at = now;
        self.slots.put(&slot).await?;

        let started = slot.started_at.unwrap_or(slot.start_time);
        let minutes = ((now - started).num_seconds().max(0) + 59) / 60;
        if minutes > 0 {
            if let Err(err) = self
                .artists
                .record_stream_minutes(&slot.dj_id, minutes, now.date_naive())
                .await
            {
                tracing::warn!(dj_id = %slot.dj_id, error = %err, "usage recording failed");
            }
        }

        if let Err(err) = self.live.mark_offline(&slot.id, now).await {
            tracing::debug!(slot_id = %slot.id, error = %err, "offline projection failed");
        }
        if let Err(err) = self.viewers.end_all_sessions(&slot.id, now).await {
            tracing::warn!(slot_id = %slot.id, error = %err, "viewer session sweep failed");
        }
        self.signal_schedule_change().await;
        tracing::info!(
            slot_id = %slot.id,
            status = slot.status.as_str(),
            reason = slot.end_reason.as_deref().unwrap_or(""),
            "stream unpublished"
        );
        Ok(())
    }

    async fn on_viewer_delta(&self, slot: Slot, delta: i64) -> Result<()> {
        let current = self
            .slots
            .increment_field(&slot.id, "currentViewers", delta as f64)
            .await?;
        let mut current = current as i64;
        if current < 0 {
            self.slots
                .update_fields(&slot.id, json!({ "currentViewers": 0 }))
                .await?;
            current = 0;
        }

        let mut peak = slot.viewer_peak;
        if delta > 0 {
            self.slots
                .increment_field(&slot.id, "totalViews", 1.0)
                .await?;
            if current > peak {
                self.slots
                    .update_fields(&slot.id, json!({ "viewerPeak": current }))
                    .await?;
                peak = current;
            }
        }

        publish_best_effort(
            self.publisher.as_ref(),
            &stream_channel(&slot.id),
            EVENT_VIEWER_UPDATE,
            json!({
                "currentViewers": current,
                "peakViewers": peak,
                "timestamp": self.clock.now(),
            }),
        )
        .await;
        Ok(())
    }

    /// Periodic auto-switchover, ~every 30 s. Each pass logs and continues
    /// on per-slot failures; transition errors are retried next tick.
    pub async fn tick(&self) -> Result<()> {
        let now = self.clock.now();

        // 1. Complete overdue live slots, then hand over to the lobby.
        let mut handed_over = false;
        for slot in self.slots.live_slots().await? {
            if now >= slot.end_time {
                if let Err(err) = self.complete_overdue(slot, now).await {
                    tracing::warn!(error = %err, "overdue completion failed");
                    continue;
                }
                handed_over = true;
            }
        }
        if handed_over {
            self.promote_first_lobby(now, false).await;
        }

        // 2. Nothing live: promote a due lobby slot.
        if self.slots.live_slots().await?.is_empty() {
            self.promote_first_lobby(now, true).await;
        }

        // 3. Mark abandoned scheduled slots missed.
        for slot in self.slots.in_statuses(&[SlotStatus::Scheduled]).await? {
            if slot.end_time < now {
                if let Err(err) = self
                    .slots
                    .update_fields(
                        &slot.id,
                        json!({ "status": "missed", "updatedAt": now }),
                    )
                    .await
                {
                    tracing::warn!(slot_id = %slot.id, error = %err, "missed mark failed");
                } else {
                    tracing::info!(slot_id = %slot.id, "slot missed");
                }
            }
        }
        Ok(())
    }

    async fn complete_overdue(&self, mut slot: Slot, now: DateTime<Utc>) -> Result<()> {
        slot.status = SlotStatus::Completed;
        slot.ended_at = Some(now);
        slot.end_reason = Some("scheduled_end".to_string());
        slot.updated_at = now;
        self.slots.put(&slot).await?;

        let started = slot.started_at.unwrap_or(slot.start_time);
        let minutes = ((now - started).num_seconds().max(0) + 59) / 60;
        if minutes > 0 {
            if let Err(err) = self
                .artists
                .record_stream_minutes(&slot.dj_id, minutes, now.date_naive())
                .await
            {
                tracing::warn!(dj_id = %slot.dj_id, error = %err, "usage recording failed");
            }
        }
        if let Err(err) = self.live.mark_offline(&slot.id, now).await {
            tracing::debug!(slot_id = %slot.id, error = %err, "offline projection failed");
        }
        if let Err(err) = self.viewers.end_all_sessions(&slot.id, now).await {
            tracing::warn!(slot_id = %slot.id, error = %err, "viewer session sweep failed");
        }
        self.signal_schedule_change().await;
        tracing::info!(slot_id = %slot.id, "live slot completed at end time");
        Ok(())
    }

    /// Promote the first in_lobby slot, optionally requiring its start
    /// time to have arrived.
    async fn promote_first_lobby(&self, now: DateTime<Utc>, require_due: bool) {
        let lobby = match self.slots.in_statuses(&[SlotStatus::InLobby]).await {
            Ok(slots) => slots,
            Err(err) => {
                tracing::warn!(error = %err, "lobby lookup failed");
                return;
            }
        };
        let Some(mut next) = lobby
            .into_iter()
            .find(|s| !require_due || s.start_time <= now)
        else {
            return;
        };

        next.status = SlotStatus::Live;
        next.started_at.get_or_insert(now);
        next.went_live_at = Some(now);
        next.updated_at = now;
        if let Err(err) = self.slots.put(&next).await {
            tracing::warn!(slot_id = %next.id, error = %err, "lobby promotion failed");
            return;
        }
        let hls = next.stream_key.as_deref().map(|k| self.keys.hls_url(k));
        if let Err(err) = self.live.upsert_live(&next, hls, now).await {
            tracing::debug!(slot_id = %next.id, error = %err, "live projection failed");
        }
        self.signal_schedule_change().await;
        tracing::info!(slot_id = %next.id, "lobby slot promoted to live");
    }

    // --- projections ---

    /// "When does my key appear?" for the DJ's next non-terminal slot.
    pub async fn check_stream_key(&self, dj_id: &UserId) -> Result<KeyCountdown> {
        let now = self.clock.now();
        let candidates = self
            .slots
            .dj_slots_in_range(
                dj_id,
                now - Duration::days(1),
                now + Duration::days(self.horizon_days()),
                &[
                    SlotStatus::Scheduled,
                    SlotStatus::InLobby,
                    SlotStatus::Connecting,
                    SlotStatus::Live,
                    SlotStatus::Queued,
                ],
            )
            .await?;
        let Some(slot) = candidates.into_iter().find(|s| {
            s.end_time + Duration::minutes(self.ingest.grace_period_minutes) > now
        }) else {
            return Ok(KeyCountdown {
                key_available: false,
                time_until_key: 0,
                slot: None,
            });
        };

        let reveal_at = slot.start_time - Duration::minutes(self.ingest.reveal_minutes);
        let key_available = now >= reveal_at;
        Ok(KeyCountdown {
            key_available,
            time_until_key: if key_available {
                0
            } else {
                (reveal_at - now).num_seconds()
            },
            slot: Some(slot.public()),
        })
    }

    /// Current live slot plus the end-of-session countdown.
    pub async fn current_live(&self) -> Result<Option<LiveNow>> {
        let now = self.clock.now();
        let Some(slot) = self.slots.live_slots().await?.into_iter().next() else {
            return Ok(None);
        };
        let time_remaining = (slot.end_time - now).num_seconds().max(0);
        Ok(Some(LiveNow {
            show_countdown: time_remaining <= self.ingest.session_end_countdown,
            time_remaining,
            slot: slot.public(),
        }))
    }

    /// Go-live-after is possible iff something is live and the next
    /// reservation leaves at least a 5-minute gap after it. An existing
    /// queued follow-up is a reservation at the live slot's end, so it
    /// closes the gap.
    pub async fn can_go_live_after(&self) -> Result<bool> {
        let Some(live) = self.slots.live_slots().await?.into_iter().next() else {
            return Ok(false);
        };
        let upcoming = self
            .slots
            .in_statuses(&[
                SlotStatus::Scheduled,
                SlotStatus::InLobby,
                SlotStatus::Queued,
            ])
            .await?;
        Ok(upcoming
            .iter()
            .filter(|s| s.id != live.id)
            .all(|s| {
                s.start_time >= live.end_time + Duration::minutes(GO_LIVE_AFTER_GAP_MINUTES)
            }))
    }

    fn horizon_days(&self) -> i64 {
        // Wide enough to find any bookable slot.
        31
    }

    async fn signal_schedule_change(&self) {
        self.cache.invalidate_all();
        publish_best_effort(
            self.publisher.as_ref(),
            SCHEDULE_CHANNEL,
            EVENT_SCHEDULE_UPDATE,
            json!({ "timestamp": self.clock.now() }),
        )
        .await;
    }
}
