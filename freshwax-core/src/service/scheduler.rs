//! Slot scheduler and quota enforcer
//!
//! Owns the booking lifecycle on the shared broadcast channel: conflict
//! detection, daily/weekly quota enforcement, credential materialization,
//! and the schedule read path.
//!
//! The store is last-writer-wins, so booking writes follow a
//! read-verify-compensate pattern: write the candidate, re-read the
//! window, and if an earlier-created overlapping slot won the race, delete
//! the candidate and report a conflict.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cache::{schedule_key, ScheduleCache};
use crate::clock::Clock;
use crate::config::{FeatureFlags, IngestConfig, QuotaConfig};
use crate::models::{
    RelaySource, Slot, SlotId, SlotStatus, UserId, ALLOWED_DURATIONS,
};
use crate::pubsub::{
    publish_best_effort, EventPublisher, EVENT_SCHEDULE_UPDATE, SCHEDULE_CHANNEL,
};
use crate::repo::{ArtistRepository, LiveRepository, ReactionRepository, SlotRepository};
use crate::service::credentials::StreamKeyService;
use crate::{Error, Result};

/// Minimum gap before an imminent booking for the ad-hoc go-live paths,
/// minutes.
const IMMINENT_GAP_MINUTES: i64 = 5;
/// How far ahead an early start may pull a slot, hours.
const EARLY_START_HORIZON_HOURS: i64 = 2;
/// Default length of ad-hoc go-live sessions, minutes.
const DEFAULT_ADHOC_MINUTES: i64 = 60;

#[derive(Debug, Clone)]
pub struct BookRequest {
    pub dj_id: UserId,
    pub start_time: DateTime<Utc>,
    pub duration: i64,
    pub title: String,
    pub genre: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct GoLiveRequest {
    pub dj_id: UserId,
    pub duration: Option<i64>,
    pub title: String,
    pub genre: String,
    pub description: String,
}

/// A slot plus the ingest endpoints its owner needs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookedSlot {
    #[serde(flatten)]
    pub slot: Slot,
    pub rtmp_url: String,
    pub hls_url: String,
}

/// Outcome of a key-reveal request inside/outside its window.
#[derive(Debug, Clone)]
pub enum StreamKeyAccess {
    Available {
        stream_key: String,
        rtmp_url: String,
        hls_url: String,
        expires_at: DateTime<Utc>,
    },
    NotYetAvailable {
        key_available_at: DateTime<Utc>,
    },
    Expired,
}

/// Feature switches and constants clients need to render booking UIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSettings {
    pub allowed_durations: Vec<i64>,
    pub allow_go_live_now: bool,
    pub allow_go_live_after: bool,
    pub reveal_minutes: i64,
    pub booking_horizon_days: i64,
}

/// The cached schedule-query projection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleView {
    pub slots: Vec<crate::models::PublicSlot>,
    pub current_live: Option<crate::models::PublicSlot>,
    pub upcoming: Vec<crate::models::PublicSlot>,
    pub settings: ScheduleSettings,
}

#[derive(Clone)]
pub struct SlotScheduler {
    slots: SlotRepository,
    artists: ArtistRepository,
    live: LiveRepository,
    viewers: ReactionRepository,
    keys: StreamKeyService,
    publisher: Arc<dyn EventPublisher>,
    cache: ScheduleCache<ScheduleView>,
    clock: Arc<dyn Clock>,
    quota: QuotaConfig,
    features: FeatureFlags,
    ingest: IngestConfig,
}

impl std::fmt::Debug for SlotScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotScheduler").finish()
    }
}

impl SlotScheduler {
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
        quota: QuotaConfig,
        features: FeatureFlags,
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
            quota,
            features,
            ingest,
        }
    }

    /// Book a future slot. Returns the slot with its ingest endpoints.
    pub async fn book(&self, request: BookRequest) -> Result<BookedSlot> {
        let now = self.clock.now();

        if !ALLOWED_DURATIONS.contains(&request.duration) {
            return Err(Error::InvalidRequest(format!(
                "Duration must be one of {ALLOWED_DURATIONS:?} minutes"
            )));
        }
        if request.start_time < now {
            return Err(Error::InvalidRequest(
                "Start time must not be in the past".to_string(),
            ));
        }
        if request.start_time > now + Duration::days(self.quota.booking_horizon_days) {
            return Err(Error::InvalidRequest(format!(
                "Bookings open {} days ahead",
                self.quota.booking_horizon_days
            )));
        }

        let profile = self.artists.require_approved(&request.dj_id).await?;
        let end_time = request.start_time + Duration::minutes(request.duration);

        self.check_window_free(request.start_time, end_time, None)
            .await?;
        self.check_quotas(&request.dj_id, request.start_time, request.duration)
            .await?;

        let slot_id = SlotId::new();
        let stream_key =
            self.keys
                .generate(&request.dj_id, &slot_id, request.start_time, end_time);
        let slot = Slot {
            id: slot_id.clone(),
            dj_id: request.dj_id.clone(),
            dj_name: profile.artist_name,
            start_time: request.start_time,
            end_time,
            duration: request.duration,
            status: SlotStatus::Scheduled,
            stream_key: Some(stream_key),
            title: request.title,
            genre: request.genre,
            description: request.description,
            is_relay: false,
            relay_source: None,
            created_at: now,
            updated_at: now,
            viewer_peak: 0,
            current_viewers: 0,
            total_views: 0,
            total_likes: 0,
            average_rating: 0.0,
            rating_count: 0,
            started_at: None,
            ended_at: None,
            cancelled_at: None,
            original_start_time: None,
            queued_after: None,
            went_live_at: None,
            end_reason: None,
            takeover_history: Vec::new(),
        };
        self.slots.put(&slot).await?;

        // Re-read and verify: another booking may have won the window
        // between our conflict check and our write.
        let contenders = self
            .slots
            .blocking_in_window(request.start_time, end_time)
            .await?;
        let lost_to = contenders.iter().find(|other| {
            other.id != slot.id
                && (other.created_at < slot.created_at
                    || (other.created_at == slot.created_at && other.id.as_str() < slot.id.as_str()))
        });
        if let Some(winner) = lost_to {
            let winner_name = winner.dj_name.clone();
            self.slots.delete(&slot.id).await?;
            return Err(Error::Conflict(format!(
                "That window was just booked by {winner_name}"
            )));
        }

        tracing::info!(
            slot_id = %slot.id,
            dj_id = %slot.dj_id,
            start = %slot.start_time,
            duration = slot.duration,
            "slot booked"
        );
        self.after_write().await;
        Ok(self.with_endpoints(slot))
    }

    /// Start an unscheduled session immediately.
    pub async fn go_live_now(&self, request: GoLiveRequest) -> Result<BookedSlot> {
        if !self.features.allow_go_live_now {
            return Err(Error::Forbidden("Go-live-now is disabled".to_string()));
        }
        let profile = self.artists.require_approved(&request.dj_id).await?;
        let now = self.clock.now();

        self.ensure_channel_idle().await?;
        self.ensure_no_imminent_booking(now).await?;

        let duration = request.duration.unwrap_or(DEFAULT_ADHOC_MINUTES);
        let slot = self
            .build_live_slot(&request, &profile.artist_name, now, duration, None)
            .await?;

        tracing::info!(slot_id = %slot.slot.id, dj_id = %request.dj_id, "go-live-now");
        Ok(slot)
    }

    /// Queue a session behind the current live stream.
    pub async fn go_live_after(&self, request: GoLiveRequest) -> Result<Slot> {
        if !self.features.allow_go_live_after {
            return Err(Error::Forbidden("Go-live-after is disabled".to_string()));
        }
        let profile = self.artists.require_approved(&request.dj_id).await?;
        let now = self.clock.now();

        let live = self
            .slots
            .live_slots()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidRequest("No active stream to queue behind".to_string()))?;

        // The queued session needs at least a 5-minute gap after the live
        // slot before the next reservation. A queued slot is itself a
        // reservation: only one follow-up fits behind a live stream.
        let next = self.next_reservation_after(&live, now).await?;
        if let Some(next) = next {
            if next.status == SlotStatus::Queued {
                return Err(Error::Conflict(format!(
                    "{} is already queued after the current stream",
                    next.dj_name
                )));
            }
            if next.start_time < live.end_time + Duration::minutes(IMMINENT_GAP_MINUTES) {
                return Err(Error::Conflict(format!(
                    "{} is scheduled too soon after the current stream",
                    next.dj_name
                )));
            }
        }

        let duration = request.duration.unwrap_or(DEFAULT_ADHOC_MINUTES);
        let slot_id = SlotId::new();
        let start_time = live.end_time;
        let end_time = start_time + Duration::minutes(duration);
        let stream_key = self
            .keys
            .generate(&request.dj_id, &slot_id, start_time, end_time);
        let slot = Slot {
            id: slot_id,
            dj_id: request.dj_id.clone(),
            dj_name: profile.artist_name,
            start_time,
            end_time,
            duration,
            status: SlotStatus::Queued,
            stream_key: Some(stream_key),
            title: request.title,
            genre: request.genre,
            description: request.description,
            is_relay: false,
            relay_source: None,
            created_at: now,
            updated_at: now,
            viewer_peak: 0,
            current_viewers: 0,
            total_views: 0,
            total_likes: 0,
            average_rating: 0.0,
            rating_count: 0,
            started_at: None,
            ended_at: None,
            cancelled_at: None,
            original_start_time: None,
            queued_after: Some(live.id.clone()),
            went_live_at: None,
            end_reason: None,
            takeover_history: Vec::new(),
        };
        self.slots.put(&slot).await?;
        self.after_write().await;
        tracing::info!(slot_id = %slot.id, after = %live.id, "go-live-after queued");
        Ok(slot)
    }

    /// Pull the caller's next slot (within 2 hours) forward to start now.
    pub async fn early_start(&self, dj_id: &UserId) -> Result<BookedSlot> {
        self.artists.require_approved(dj_id).await?;
        let now = self.clock.now();

        let upcoming = self
            .slots
            .dj_slots_in_range(
                dj_id,
                now,
                now + Duration::hours(EARLY_START_HORIZON_HOURS),
                &[SlotStatus::Scheduled],
            )
            .await?;
        let mut slot = upcoming
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound("No upcoming slot in the next 2 hours".to_string()))?;

        self.ensure_channel_idle().await?;

        let new_end = now + Duration::minutes(slot.duration);
        let conflicts = self.slots.blocking_in_window(now, new_end).await?;
        if let Some(other) = conflicts.iter().find(|s| s.id != slot.id) {
            return Err(Error::Conflict(format!(
                "Starting early would overlap {}'s slot",
                other.dj_name
            )));
        }

        if slot.original_start_time.is_none() {
            slot.original_start_time = Some(slot.start_time);
        }
        slot.start_time = now;
        slot.end_time = new_end;
        slot.updated_at = now;
        // The signature binds to the window, so the key must be reminted.
        slot.stream_key = Some(self.keys.generate(dj_id, &slot.id, now, new_end));
        self.slots.put(&slot).await?;
        self.after_write().await;

        tracing::info!(slot_id = %slot.id, "early start");
        Ok(self.with_endpoints(slot))
    }

    /// Cancel a slot. Idempotent on terminal states.
    pub async fn cancel(&self, slot_id: &SlotId, caller: &UserId, is_admin: bool) -> Result<Slot> {
        let mut slot = self.slots.require(slot_id).await?;
        if slot.status.is_terminal() {
            return Ok(slot);
        }
        if !is_admin && slot.dj_id != *caller {
            return Err(Error::Forbidden("Only the slot owner can cancel".to_string()));
        }

        let now = self.clock.now();
        let was_live = slot.status == SlotStatus::Live;
        slot.status = SlotStatus::Cancelled;
        slot.cancelled_at = Some(now);
        slot.updated_at = now;
        self.slots.put(&slot).await?;

        if was_live {
            if let Err(err) = self.live.mark_offline(&slot.id, now).await {
                tracing::warn!(slot_id = %slot.id, error = %err, "offline projection failed");
            }
        }
        self.after_write().await;
        tracing::info!(slot_id = %slot.id, admin = is_admin, "slot cancelled");
        Ok(slot)
    }

    /// End a stream: complete the slot, record usage, promote any queued
    /// follow-up.
    pub async fn end_stream(
        &self,
        slot_id: &SlotId,
        caller: &UserId,
        is_admin: bool,
    ) -> Result<Slot> {
        let mut slot = self.slots.require(slot_id).await?;
        if slot.status.is_terminal() {
            return Ok(slot);
        }
        if !is_admin && slot.dj_id != *caller {
            return Err(Error::Forbidden("Only the slot owner can end it".to_string()));
        }

        let now = self.clock.now();
        slot.status = SlotStatus::Completed;
        slot.ended_at = Some(now);
        slot.end_reason = Some("manual_end".to_string());
        slot.updated_at = now;
        self.slots.put(&slot).await?;

        let started = slot.started_at.unwrap_or(slot.start_time);
        let streamed_secs = (now - started).num_seconds().max(0);
        let minutes = (streamed_secs + 59) / 60;
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

        self.promote_queued(&slot.id, now).await;
        self.after_write().await;
        tracing::info!(slot_id = %slot.id, minutes, "stream ended");
        Ok(slot)
    }

    /// Promote the queued slot waiting on `ended`, if any. Verified with a
    /// fresh read; failures are left for the periodic tick.
    async fn promote_queued(&self, ended: &SlotId, now: DateTime<Utc>) {
        let queued = match self.slots.queued_after(ended).await {
            Ok(q) => q,
            Err(err) => {
                tracing::warn!(error = %err, "queued lookup failed");
                return;
            }
        };
        let Some(mut next) = queued else { return };

        next.status = SlotStatus::Live;
        next.start_time = now;
        next.end_time = now + Duration::minutes(next.duration);
        next.started_at = Some(now);
        next.went_live_at = Some(now);
        next.updated_at = now;
        if let Err(err) = self.slots.put(&next).await {
            tracing::warn!(slot_id = %next.id, error = %err, "queued promotion failed");
            return;
        }

        // Verify the promotion stuck; a concurrent writer may have raced us.
        match self.slots.get(&next.id).await {
            Ok(Some(current)) if current.status == SlotStatus::Live => {
                tracing::info!(slot_id = %next.id, "queued slot promoted to live");
                if let Err(err) = self.live.upsert_live(&current, None, now).await {
                    tracing::debug!(slot_id = %next.id, error = %err, "live projection failed");
                }
            }
            Ok(_) => tracing::warn!(slot_id = %next.id, "queued promotion lost a race"),
            Err(err) => tracing::warn!(slot_id = %next.id, error = %err, "promotion verify failed"),
        }
    }

    /// Reveal the stream key to its owner inside the reveal window.
    pub async fn get_stream_key(
        &self,
        slot_id: &SlotId,
        caller: &UserId,
        is_admin: bool,
    ) -> Result<StreamKeyAccess> {
        // Authorization path: always a fresh read, never the cache.
        let slot = self.slots.require(slot_id).await?;
        if !is_admin && slot.dj_id != *caller {
            return Err(Error::Forbidden("Not your slot".to_string()));
        }
        if slot.is_relay {
            return Err(Error::InvalidRequest(
                "Relay slots have no stream key".to_string(),
            ));
        }
        if slot.status.is_terminal() {
            return Err(Error::Forbidden(format!(
                "Slot is {}",
                slot.status.as_str()
            )));
        }
        let Some(stream_key) = slot.stream_key.clone() else {
            return Err(Error::NotFound("Slot has no stream key".to_string()));
        };

        let now = self.clock.now();
        let reveal_at = slot.start_time - Duration::minutes(self.ingest.reveal_minutes);
        let expires_at = slot.end_time + Duration::minutes(self.ingest.grace_period_minutes);
        if now < reveal_at {
            return Ok(StreamKeyAccess::NotYetAvailable {
                key_available_at: reveal_at,
            });
        }
        if now > expires_at {
            return Ok(StreamKeyAccess::Expired);
        }

        Ok(StreamKeyAccess::Available {
            rtmp_url: self.keys.rtmp_url(&stream_key),
            hls_url: self.keys.hls_url(&stream_key),
            stream_key,
            expires_at,
        })
    }

    /// Mint an ephemeral key valid until the top of the next hour.
    pub async fn generate_key(&self, dj_id: &UserId) -> Result<BookedSlot> {
        let profile = self.artists.require_approved(dj_id).await?;
        let now = self.clock.now();

        let busy = self
            .slots
            .in_statuses(&[SlotStatus::Live, SlotStatus::Connecting])
            .await?;
        if let Some(other) = busy.iter().find(|s| s.dj_id != *dj_id) {
            return Err(Error::Conflict(format!(
                "{} is currently streaming",
                other.dj_name
            )));
        }

        let hour_top = now
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now)
            + Duration::hours(1);
        let minutes = ((hour_top - now).num_seconds() + 59) / 60;

        let slot_id = SlotId::new();
        let stream_key = self.keys.generate(dj_id, &slot_id, now, hour_top);
        let slot = Slot {
            id: slot_id,
            dj_id: dj_id.clone(),
            dj_name: profile.artist_name,
            start_time: now,
            end_time: hour_top,
            duration: minutes,
            status: SlotStatus::Scheduled,
            stream_key: Some(stream_key),
            title: "Open session".to_string(),
            genre: String::new(),
            description: String::new(),
            is_relay: false,
            relay_source: None,
            created_at: now,
            updated_at: now,
            viewer_peak: 0,
            current_viewers: 0,
            total_views: 0,
            total_likes: 0,
            average_rating: 0.0,
            rating_count: 0,
            started_at: None,
            ended_at: None,
            cancelled_at: None,
            original_start_time: None,
            queued_after: None,
            went_live_at: None,
            end_reason: None,
            takeover_history: Vec::new(),
        };
        self.slots.put(&slot).await?;
        self.after_write().await;
        tracing::info!(slot_id = %slot.id, until = %hour_top, "ephemeral key issued");
        Ok(self.with_endpoints(slot))
    }

    /// Go live from an approved relay URL; no stream key involved.
    pub async fn start_relay(
        &self,
        dj_id: &UserId,
        relay_url: &str,
        title: String,
        duration: Option<i64>,
    ) -> Result<Slot> {
        let profile = self.artists.require_approved(dj_id).await?;
        if !profile
            .approved_relay_urls
            .iter()
            .any(|approved| approved == relay_url)
        {
            return Err(Error::Forbidden(
                "Relay URL is not approved for this DJ".to_string(),
            ));
        }

        self.ensure_channel_idle().await?;
        let now = self.clock.now();
        let duration = duration.unwrap_or(DEFAULT_ADHOC_MINUTES);

        let slot = Slot {
            id: SlotId::new(),
            dj_id: dj_id.clone(),
            dj_name: profile.artist_name,
            start_time: now,
            end_time: now + Duration::minutes(duration),
            duration,
            status: SlotStatus::Live,
            stream_key: None,
            title,
            genre: String::new(),
            description: String::new(),
            is_relay: true,
            relay_source: Some(RelaySource {
                url: relay_url.to_string(),
                name: None,
            }),
            created_at: now,
            updated_at: now,
            viewer_peak: 0,
            current_viewers: 0,
            total_views: 0,
            total_likes: 0,
            average_rating: 0.0,
            rating_count: 0,
            started_at: Some(now),
            ended_at: None,
            cancelled_at: None,
            original_start_time: None,
            queued_after: None,
            went_live_at: Some(now),
            end_reason: None,
            takeover_history: Vec::new(),
        };
        self.slots.put(&slot).await?;
        if let Err(err) = self.live.upsert_live(&slot, None, now).await {
            tracing::debug!(slot_id = %slot.id, error = %err, "live projection failed");
        }
        self.after_write().await;
        tracing::info!(slot_id = %slot.id, relay = relay_url, "relay started");
        Ok(slot)
    }

    /// Schedule view for a window. May serve from the 5-second cache;
    /// never used for authorization decisions.
    pub async fn query_schedule(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        dj_id: Option<&UserId>,
    ) -> Result<Arc<ScheduleView>> {
        let key = schedule_key(start, end, dj_id.map(UserId::as_str));
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let now = self.clock.now();
        let slots = self.slots.in_window(start, end, dj_id).await?;
        let current_live = self
            .slots
            .live_slots()
            .await?
            .into_iter()
            .next()
            .map(|s| s.public());
        let upcoming = self
            .slots
            .in_statuses(&[SlotStatus::Scheduled, SlotStatus::InLobby, SlotStatus::Queued])
            .await?
            .into_iter()
            .filter(|s| s.end_time > now)
            .take(10)
            .map(|s| s.public())
            .collect();

        let view = ScheduleView {
            slots: slots.iter().map(Slot::public).collect(),
            current_live,
            upcoming,
            settings: ScheduleSettings {
                allowed_durations: ALLOWED_DURATIONS.to_vec(),
                allow_go_live_now: self.features.allow_go_live_now,
                allow_go_live_after: self.features.allow_go_live_after,
                reveal_minutes: self.ingest.reveal_minutes,
                booking_horizon_days: self.quota.booking_horizon_days,
            },
        };
        self.cache.insert(key.clone(), view);
        self.cache
            .get(&key)
            .ok_or_else(|| Error::Internal("schedule cache read-back failed".to_string()))
    }

    /// Public projection of one slot, for the status endpoint.
    pub async fn get_public_slot(&self, id: &SlotId) -> Result<crate::models::PublicSlot> {
        Ok(self.slots.require(id).await?.public())
    }

    /// Completed and otherwise finished slots, newest first.
    pub async fn history(&self, dj_id: Option<&UserId>) -> Result<Vec<Slot>> {
        let mut finished = self
            .slots
            .in_statuses(&[
                SlotStatus::Completed,
                SlotStatus::Failed,
                SlotStatus::Missed,
                SlotStatus::Cancelled,
            ])
            .await?;
        if let Some(dj) = dj_id {
            finished.retain(|s| s.dj_id == *dj);
        }
        finished.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(finished)
    }

    // --- internals ---

    /// Create and persist an immediately-live slot for the ad-hoc paths.
    async fn build_live_slot(
        &self,
        request: &GoLiveRequest,
        dj_name: &str,
        now: DateTime<Utc>,
        duration: i64,
        queued_after: Option<SlotId>,
    ) -> Result<BookedSlot> {
        let slot_id = SlotId::new();
        let end_time = now + Duration::minutes(duration);
        let stream_key = self.keys.generate(&request.dj_id, &slot_id, now, end_time);
        let slot = Slot {
            id: slot_id,
            dj_id: request.dj_id.clone(),
            dj_name: dj_name.to_string(),
            start_time: now,
            end_time,
            duration,
            status: SlotStatus::Live,
            stream_key: Some(stream_key),
            title: request.title.clone(),
            genre: request.genre.clone(),
            description: request.description.clone(),
            is_relay: false,
            relay_source: None,
            created_at: now,
            updated_at: now,
            viewer_peak: 0,
            current_viewers: 0,
            total_views: 0,
            total_likes: 0,
            average_rating: 0.0,
            rating_count: 0,
            started_at: Some(now),
            ended_at: None,
            cancelled_at: None,
            original_start_time: None,
            queued_after,
            went_live_at: Some(now),
            end_reason: None,
            takeover_history: Vec::new(),
        };
        self.slots.put(&slot).await?;
        if let Err(err) = self.live.upsert_live(&slot, None, now).await {
            tracing::debug!(slot_id = %slot.id, error = %err, "live projection failed");
        }
        self.after_write().await;
        Ok(self.with_endpoints(slot))
    }

    fn with_endpoints(&self, slot: Slot) -> BookedSlot {
        let key = slot.stream_key.clone().unwrap_or_default();
        BookedSlot {
            rtmp_url: self.keys.rtmp_url(&key),
            hls_url: self.keys.hls_url(&key),
            slot,
        }
    }

    async fn after_write(&self) {
        self.cache.invalidate_all();
        publish_best_effort(
            self.publisher.as_ref(),
            SCHEDULE_CHANNEL,
            EVENT_SCHEDULE_UPDATE,
            json!({ "timestamp": self.clock.now() }),
        )
        .await;
    }

    async fn check_window_free(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        ignore: Option<&SlotId>,
    ) -> Result<()> {
        let conflicts = self.slots.blocking_in_window(start, end).await?;
        if let Some(conflict) = conflicts.iter().find(|s| Some(&s.id) != ignore) {
            return Err(Error::Conflict(format!(
                "Overlaps {}'s slot at {}",
                conflict.dj_name,
                conflict.start_time.format("%H:%M")
            )));
        }
        Ok(())
    }

    async fn ensure_channel_idle(&self) -> Result<()> {
        if let Some(live) = self.slots.live_slots().await?.into_iter().next() {
            return Err(Error::Conflict(format!(
                "{} is live right now",
                live.dj_name
            )));
        }
        Ok(())
    }

    async fn ensure_no_imminent_booking(&self, now: DateTime<Utc>) -> Result<()> {
        let soon = self
            .slots
            .in_statuses(&[SlotStatus::Scheduled, SlotStatus::InLobby])
            .await?;
        if let Some(imminent) = soon
            .iter()
            .find(|s| s.start_time > now && s.start_time <= now + Duration::minutes(IMMINENT_GAP_MINUTES))
        {
            return Err(Error::Conflict(format!(
                "{}'s slot starts in under 5 minutes",
                imminent.dj_name
            )));
        }
        Ok(())
    }

    /// The next channel reservation after a live slot: the earliest
    /// scheduled, lobby, or already-queued slot other than the live one.
    /// Queued slots block the channel just like bookings do.
    async fn next_reservation_after(
        &self,
        live: &Slot,
        now: DateTime<Utc>,
    ) -> Result<Option<Slot>> {
        let upcoming = self
            .slots
            .in_statuses(&[SlotStatus::Scheduled, SlotStatus::InLobby, SlotStatus::Queued])
            .await?;
        Ok(upcoming
            .into_iter()
            .find(|s| s.id != live.id && s.start_time >= now))
    }

    /// Daily-hours and weekly-slots quota checks for a candidate booking.
    async fn check_quotas(
        &self,
        dj_id: &UserId,
        start: DateTime<Utc>,
        duration: i64,
    ) -> Result<()> {
        let quota_statuses = [
            SlotStatus::Scheduled,
            SlotStatus::InLobby,
            SlotStatus::Live,
            SlotStatus::Completed,
        ];

        // Daily cap: calendar day in UTC.
        let day = start.date_naive();
        let day_start = day
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .ok_or_else(|| Error::Internal("invalid day boundary".to_string()))?;
        let day_end = day_start + Duration::days(1);
        let todays = self
            .slots
            .dj_slots_in_range(dj_id, day_start, day_end, &quota_statuses)
            .await?;
        let booked_minutes: i64 = todays.iter().map(|s| s.duration).sum();

        let subscription = self.artists.subscription(dj_id).await?;
        let is_pro = subscription.is_pro_active(self.clock.now());
        let base_minutes = if is_pro {
            self.quota.default_daily_hours * 60
        } else {
            self.quota.free_daily_hours * 60
        };
        let event_minutes = self.artists.approved_event_minutes(dj_id, day).await?;

        if booked_minutes + duration > base_minutes + event_minutes {
            return Err(Error::quota(
                format!(
                    "Daily limit reached: {booked_minutes} of {} minutes used",
                    base_minutes + event_minutes
                ),
                !is_pro,
                true,
            ));
        }

        // Weekly cap: slots in the ISO week containing the start.
        let iso = start.iso_week();
        let week_start = chrono::NaiveDate::from_isoywd_opt(iso.year(), iso.week(), Weekday::Mon)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|t| t.and_utc())
            .ok_or_else(|| Error::Internal("invalid ISO week".to_string()))?;
        let week_end = week_start + Duration::days(7);
        let weeks = self
            .slots
            .dj_slots_in_range(dj_id, week_start, week_end, &quota_statuses)
            .await?;

        let weekly_limit = self
            .artists
            .allowance(dj_id)
            .await?
            .map_or(self.quota.default_weekly_slots, |a| a.weekly_slots);
        if weeks.len() as u32 >= weekly_limit {
            return Err(Error::quota(
                format!("Weekly limit of {weekly_limit} slots reached"),
                false,
                false,
            ));
        }
        Ok(())
    }
}
