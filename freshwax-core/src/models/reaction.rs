//! Reaction records and viewer presence sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{SessionId, SlotId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionType {
    Like,
    Rating,
}

/// Durable reaction. Likes accumulate; ratings upsert per (stream, user).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRecord {
    pub id: String,
    pub stream_id: SlotId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub reaction_type: ReactionType,
    /// 1..=5, only for ratings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    pub created_at: DateTime<Utc>,
}

/// One viewer's presence on one stream. Exactly one active session per
/// (stream, session) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerSession {
    pub id: String,
    pub stream_id: SlotId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub session_id: SessionId,
    pub joined_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_at: Option<DateTime<Utc>>,
    pub last_heartbeat: DateTime<Utc>,
    pub is_active: bool,
}

/// Ephemeral broadcast payloads; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmojiReaction {
    pub emoji: String,
    pub user_name: String,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarReaction {
    pub count: u32,
    pub user_name: String,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shoutout {
    pub name: String,
    /// 1..=30 chars, enforced at the service boundary.
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
