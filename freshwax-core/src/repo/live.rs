use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::models::{LiveStreamRecord, Slot, SlotId};
use crate::store::{collections, DocumentStore, Filter, Query};
use crate::Result;

/// Accessor for the denormalized `livestreams` projection. Everything here
/// is best-effort; callers log failures and move on.
#[derive(Clone)]
pub struct LiveRepository {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for LiveRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveRepository").finish()
    }
}

impl LiveRepository {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Upsert the record for a slot going (or staying) live. Keyed by slot
    /// id so repeated publishes update in place.
    pub async fn upsert_live(
        &self,
        slot: &Slot,
        hls_url: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let record = LiveStreamRecord {
            id: slot.id.as_str().to_string(),
            slot_id: slot.id.clone(),
            dj_id: slot.dj_id.clone(),
            dj_name: slot.dj_name.clone(),
            title: slot.title.clone(),
            genre: slot.genre.clone(),
            is_live: true,
            hls_url,
            started_at: slot.started_at.unwrap_or(now),
            ended_at: None,
            current_viewers: slot.current_viewers,
            viewer_peak: slot.viewer_peak,
            updated_at: now,
        };
        let doc = serde_json::to_value(&record)?;
        self.store
            .set(collections::LIVESTREAMS, &record.id, &doc)
            .await
    }

    pub async fn mark_offline(&self, slot_id: &SlotId, now: DateTime<Utc>) -> Result<()> {
        self.store
            .update(
                collections::LIVESTREAMS,
                slot_id.as_str(),
                &json!({ "isLive": false, "endedAt": now, "updatedAt": now }),
            )
            .await
    }

    pub async fn get(&self, slot_id: &SlotId) -> Result<Option<LiveStreamRecord>> {
        let doc = self
            .store
            .get(collections::LIVESTREAMS, slot_id.as_str())
            .await?;
        doc.map(|d| serde_json::from_value(d).map_err(crate::Error::from))
            .transpose()
    }

    pub async fn live_records(&self) -> Result<Vec<LiveStreamRecord>> {
        let query = Query::new().filter(Filter::Eq("isLive", json!(true)));
        let docs = self.store.query(collections::LIVESTREAMS, &query).await?;
        docs.iter().map(|d| d.parse::<LiveStreamRecord>()).collect()
    }

    pub async fn increment_field(
        &self,
        slot_id: &SlotId,
        field: &'static str,
        delta: f64,
    ) -> Result<f64> {
        self.store
            .increment(collections::LIVESTREAMS, slot_id.as_str(), field, delta)
            .await
    }
}
