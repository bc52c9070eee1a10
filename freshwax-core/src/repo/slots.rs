use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::models::{Slot, SlotId, SlotStatus, UserId};
use crate::store::{collections, DocumentStore, Filter, Query};
use crate::{Error, Result};

/// Accessor for the authoritative `livestreamSlots` collection.
#[derive(Clone)]
pub struct SlotRepository {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for SlotRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotRepository").finish()
    }
}

/// Schedule ordering: `startTime` ascending, ties broken by `createdAt`.
pub(crate) fn sort_schedule(slots: &mut [Slot]) {
    slots.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then(a.created_at.cmp(&b.created_at))
    });
}

impl SlotRepository {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: &SlotId) -> Result<Option<Slot>> {
        let doc = self.store.get(collections::SLOTS, id.as_str()).await?;
        doc.map(|d| serde_json::from_value(d).map_err(Error::from))
            .transpose()
    }

    pub async fn require(&self, id: &SlotId) -> Result<Slot> {
        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Slot {id} not found")))
    }

    pub async fn put(&self, slot: &Slot) -> Result<()> {
        let doc = serde_json::to_value(slot)?;
        self.store
            .set(collections::SLOTS, slot.id.as_str(), &doc)
            .await
    }

    pub async fn update_fields(&self, id: &SlotId, fields: Value) -> Result<()> {
        self.store
            .update(collections::SLOTS, id.as_str(), &fields)
            .await
    }

    pub async fn delete(&self, id: &SlotId) -> Result<()> {
        self.store.delete(collections::SLOTS, id.as_str()).await
    }

    async fn query_slots(&self, query: &Query) -> Result<Vec<Slot>> {
        let docs = self.store.query(collections::SLOTS, query).await?;
        let mut slots = docs
            .iter()
            .map(|doc| doc.parse::<Slot>())
            .collect::<Result<Vec<_>>>()?;
        sort_schedule(&mut slots);
        Ok(slots)
    }

    fn status_values(statuses: &[SlotStatus]) -> Vec<Value> {
        statuses.iter().map(|s| json!(s.as_str())).collect()
    }

    /// Slots in channel-blocking statuses overlapping `[start, end)`.
    pub async fn blocking_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Slot>> {
        let blocking = [
            SlotStatus::Scheduled,
            SlotStatus::InLobby,
            SlotStatus::Live,
            SlotStatus::Queued,
        ];
        let query = Query::new()
            .filter(Filter::In("status", Self::status_values(&blocking)))
            .filter(Filter::Lt("startTime", json!(end)))
            .filter(Filter::Gt("endTime", json!(start)));
        self.query_slots(&query).await
    }

    /// All slots in the given statuses.
    pub async fn in_statuses(&self, statuses: &[SlotStatus]) -> Result<Vec<Slot>> {
        let query = Query::new().filter(Filter::In("status", Self::status_values(statuses)));
        self.query_slots(&query).await
    }

    /// One DJ's slots in the given statuses whose `startTime` lies in
    /// `[from, to)`.
    pub async fn dj_slots_in_range(
        &self,
        dj_id: &UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        statuses: &[SlotStatus],
    ) -> Result<Vec<Slot>> {
        let query = Query::new()
            .filter(Filter::Eq("djId", json!(dj_id)))
            .filter(Filter::In("status", Self::status_values(statuses)))
            .filter(Filter::Ge("startTime", json!(from)))
            .filter(Filter::Lt("startTime", json!(to)));
        self.query_slots(&query).await
    }

    /// Slots within a window, optionally for one DJ, any status.
    pub async fn in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        dj_id: Option<&UserId>,
    ) -> Result<Vec<Slot>> {
        let mut query = Query::new()
            .filter(Filter::Lt("startTime", json!(end)))
            .filter(Filter::Gt("endTime", json!(start)));
        if let Some(dj) = dj_id {
            query = query.filter(Filter::Eq("djId", json!(dj)));
        }
        self.query_slots(&query).await
    }

    pub async fn find_by_stream_key(&self, stream_key: &str) -> Result<Vec<Slot>> {
        let query = Query::new().filter(Filter::Eq("streamKey", json!(stream_key)));
        self.query_slots(&query).await
    }

    /// The queued slot waiting on `after`, if any.
    pub async fn queued_after(&self, after: &SlotId) -> Result<Option<Slot>> {
        let query = Query::new()
            .filter(Filter::Eq("status", json!(SlotStatus::Queued.as_str())))
            .filter(Filter::Eq("queuedAfter", json!(after)));
        Ok(self.query_slots(&query).await?.into_iter().next())
    }

    pub async fn live_slots(&self) -> Result<Vec<Slot>> {
        self.in_statuses(&[SlotStatus::Live]).await
    }

    /// Atomic counter bump on a slot; counters are projections, so drift
    /// under contention is acceptable.
    pub async fn increment_field(
        &self,
        id: &SlotId,
        field: &'static str,
        delta: f64,
    ) -> Result<f64> {
        self.store
            .increment(collections::SLOTS, id.as_str(), field, delta)
            .await
    }
}
