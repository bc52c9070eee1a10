//! Broadcast slot model and its status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{SlotId, UserId};

/// Booking durations accepted by the scheduler, in minutes.
pub const ALLOWED_DURATIONS: [i64; 6] = [30, 45, 60, 120, 180, 240];

/// Slot lifecycle status.
///
/// ```text
/// scheduled -> in_lobby -> connecting -> live -> completed | failed
/// scheduled -> missed | cancelled
/// queued    -> live
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Scheduled,
    InLobby,
    Connecting,
    Live,
    Queued,
    Completed,
    Failed,
    Missed,
    Cancelled,
}

impl SlotStatus {
    /// Terminal states admit no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Missed | Self::Cancelled
        )
    }

    /// Statuses that occupy the channel for conflict detection.
    #[must_use]
    pub const fn blocks_channel(self) -> bool {
        matches!(
            self,
            Self::Scheduled | Self::InLobby | Self::Live | Self::Queued
        )
    }

    /// Statuses counted against the daily-hours and weekly-slots quotas.
    #[must_use]
    pub const fn counts_toward_quota(self) -> bool {
        matches!(
            self,
            Self::Scheduled | Self::InLobby | Self::Live | Self::Completed
        )
    }

    /// Statuses in which a stream key may still authenticate ingest.
    #[must_use]
    pub const fn key_may_validate(self) -> bool {
        matches!(
            self,
            Self::Scheduled | Self::InLobby | Self::Connecting | Self::Live | Self::Queued
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InLobby => "in_lobby",
            Self::Connecting => "connecting",
            Self::Live => "live",
            Self::Queued => "queued",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Missed => "missed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// External source for a relay slot; relays consume quota but bypass
/// RTMP ingest, so they carry no stream key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaySource {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One approved ownership transfer, mid-broadcast. Experimental.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TakeoverRecord {
    pub original_dj_id: UserId,
    pub new_dj_id: UserId,
    pub approved_at: DateTime<Utc>,
}

/// A reserved interval on the shared broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: SlotId,
    pub dj_id: UserId,
    pub dj_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Minutes; one of [`ALLOWED_DURATIONS`] for booked slots.
    pub duration: i64,
    pub status: SlotStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_key: Option<String>,
    pub title: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_relay: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_source: Option<RelaySource>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub viewer_peak: i64,
    #[serde(default)]
    pub current_viewers: i64,
    #[serde(default)]
    pub total_views: i64,
    #[serde(default)]
    pub total_likes: i64,
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default)]
    pub rating_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Set when an early start rewrites `start_time`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_start_time: Option<DateTime<Utc>>,
    /// For queued go-live-after slots: the live slot this one waits on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_after: Option<SlotId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub went_live_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub takeover_history: Vec<TakeoverRecord>,
}

impl Slot {
    /// Half-open interval overlap: `[start, end)` against this slot.
    #[must_use]
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end_time && end > self.start_time
    }

    /// Public projection; never leaks the stream key.
    #[must_use]
    pub fn public(&self) -> PublicSlot {
        PublicSlot {
            id: self.id.clone(),
            dj_id: self.dj_id.clone(),
            dj_name: self.dj_name.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            duration: self.duration,
            status: self.status,
            title: self.title.clone(),
            genre: self.genre.clone(),
            description: self.description.clone(),
            is_relay: self.is_relay,
            viewer_peak: self.viewer_peak,
            current_viewers: self.current_viewers,
            total_views: self.total_views,
            total_likes: self.total_likes,
            average_rating: self.average_rating,
            rating_count: self.rating_count,
            started_at: self.started_at,
            ended_at: self.ended_at,
            original_start_time: self.original_start_time,
        }
    }
}

/// The slot view served on unauthenticated endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSlot {
    pub id: SlotId,
    pub dj_id: UserId,
    pub dj_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: i64,
    pub status: SlotStatus,
    pub title: String,
    pub genre: String,
    pub description: String,
    pub is_relay: bool,
    pub viewer_peak: i64,
    pub current_viewers: i64,
    pub total_views: i64,
    pub total_likes: i64,
    pub average_rating: f64,
    pub rating_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_start_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(start: &str, end: &str) -> Slot {
        let start: DateTime<Utc> = start.parse().unwrap();
        Slot {
            id: SlotId::new(),
            dj_id: UserId::new(),
            dj_name: "Test DJ".to_string(),
            start_time: start,
            end_time: end.parse().unwrap(),
            duration: 60,
            status: SlotStatus::Scheduled,
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
            started_at: None,
            ended_at: None,
            cancelled_at: None,
            original_start_time: None,
            queued_after: None,
            went_live_at: None,
            end_reason: None,
            takeover_history: Vec::new(),
        }
    }

    #[test]
    fn overlap_is_half_open() {
        let existing = slot("2025-01-10T10:00:00Z", "2025-01-10T11:00:00Z");

        // Strict overlap.
        assert!(existing.overlaps(
            "2025-01-10T10:30:00Z".parse().unwrap(),
            "2025-01-10T11:30:00Z".parse().unwrap()
        ));
        // Back-to-back booking starting exactly at end_time is allowed.
        assert!(!existing.overlaps(
            "2025-01-10T11:00:00Z".parse().unwrap(),
            "2025-01-10T12:00:00Z".parse().unwrap()
        ));
        // Ending exactly at start_time is allowed.
        assert!(!existing.overlaps(
            "2025-01-10T09:00:00Z".parse().unwrap(),
            "2025-01-10T10:00:00Z".parse().unwrap()
        ));
        // Containment.
        assert!(existing.overlaps(
            "2025-01-10T09:00:00Z".parse().unwrap(),
            "2025-01-10T12:00:00Z".parse().unwrap()
        ));
    }

    #[test]
    fn status_classes() {
        assert!(SlotStatus::Cancelled.is_terminal());
        assert!(!SlotStatus::Connecting.is_terminal());
        assert!(SlotStatus::Queued.blocks_channel());
        assert!(!SlotStatus::Connecting.blocks_channel());
        assert!(SlotStatus::Completed.counts_toward_quota());
        assert!(!SlotStatus::Queued.counts_toward_quota());
        assert!(SlotStatus::Connecting.key_may_validate());
        assert!(!SlotStatus::Missed.key_may_validate());
    }

    #[test]
    fn public_projection_has_no_stream_key() {
        let mut s = slot("2025-01-10T10:00:00Z", "2025-01-10T11:00:00Z");
        s.stream_key = Some("fwx_secret".to_string());
        let json = serde_json::to_value(s.public()).unwrap();
        assert!(json.get("streamKey").is_none());
        assert_eq!(json["status"], "scheduled");
    }
}
