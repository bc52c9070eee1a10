//! Chat cleanup jobs, keyed by stream id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::SlotId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupStatus {
    Pending,
    Completed,
    Failed,
}

/// Scheduled deletion of a stream's chat messages. Executed only once
/// `cleanup_at` has passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCleanupJob {
    pub stream_id: SlotId,
    pub scheduled_at: DateTime<Utc>,
    pub cleanup_at: DateTime<Utc>,
    pub status: CleanupStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages_deleted: Option<i64>,
}
