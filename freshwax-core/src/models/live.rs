//! Denormalized `livestreams` projection served on the public status feed.
//!
//! The slot collection is authoritative; this record is written as a
//! best-effort side effect and must never fail a transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{SlotId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStreamRecord {
    pub id: String,
    pub slot_id: SlotId,
    pub dj_id: UserId,
    pub dj_name: String,
    pub title: String,
    #[serde(default)]
    pub genre: String,
    pub is_live: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hls_url: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_viewers: i64,
    #[serde(default)]
    pub viewer_peak: i64,
    pub updated_at: DateTime<Utc>,
}
