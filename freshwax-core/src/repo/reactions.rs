use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::models::{
    generate_id, ReactionRecord, ReactionType, SessionId, SlotId, UserId, ViewerSession,
};
use crate::store::{collections, DocumentStore, Filter, Query};
use crate::Result;

/// Accessor for reaction records and viewer presence sessions.
#[derive(Clone)]
pub struct ReactionRepository {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for ReactionRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactionRepository").finish()
    }
}

impl ReactionRepository {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn append(&self, record: &ReactionRecord) -> Result<()> {
        let doc = serde_json::to_value(record)?;
        self.store
            .set(collections::REACTIONS, &record.id, &doc)
            .await
    }

    /// The one rating record for (stream, user), if present.
    pub async fn find_rating(
        &self,
        stream_id: &SlotId,
        user_id: &UserId,
    ) -> Result<Option<ReactionRecord>> {
        let query = Query::new()
            .filter(Filter::Eq("streamId", json!(stream_id)))
            .filter(Filter::Eq("userId", json!(user_id)))
            .filter(Filter::Eq("type", json!("rating")));
        let doc = self.store.find_one(collections::REACTIONS, &query).await?;
        doc.map(|d| d.parse()).transpose()
    }

    pub async fn has_liked(&self, stream_id: &SlotId, user_id: &UserId) -> Result<bool> {
        let query = Query::new()
            .filter(Filter::Eq("streamId", json!(stream_id)))
            .filter(Filter::Eq("userId", json!(user_id)))
            .filter(Filter::Eq("type", json!("like")));
        Ok(self
            .store
            .find_one(collections::REACTIONS, &query)
            .await?
            .is_some())
    }

    pub async fn new_like(
        &self,
        stream_id: &SlotId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<ReactionRecord> {
        let record = ReactionRecord {
            id: generate_id(),
            stream_id: stream_id.clone(),
            user_id: user_id.clone(),
            reaction_type: ReactionType::Like,
            rating: None,
            created_at: now,
        };
        self.append(&record).await?;
        Ok(record)
    }

    // --- viewer sessions ---

    pub async fn create_session(&self, session: &ViewerSession) -> Result<()> {
        let doc = serde_json::to_value(session)?;
        self.store.set(collections::VIEWERS, &session.id, &doc).await
    }

    /// The active session for (stream, session id), if one exists.
    pub async fn find_active_session(
        &self,
        stream_id: &SlotId,
        session_id: &SessionId,
    ) -> Result<Option<ViewerSession>> {
        let query = Query::new()
            .filter(Filter::Eq("streamId", json!(stream_id)))
            .filter(Filter::Eq("sessionId", json!(session_id)))
            .filter(Filter::Eq("isActive", json!(true)));
        let doc = self.store.find_one(collections::VIEWERS, &query).await?;
        doc.map(|d| d.parse()).transpose()
    }

    pub async fn update_session(&self, id: &str, fields: serde_json::Value) -> Result<()> {
        self.store.update(collections::VIEWERS, id, &fields).await
    }

    pub async fn active_sessions(&self, stream_id: &SlotId) -> Result<Vec<ViewerSession>> {
        let query = Query::new()
            .filter(Filter::Eq("streamId", json!(stream_id)))
            .filter(Filter::Eq("isActive", json!(true)));
        let docs = self.store.query(collections::VIEWERS, &query).await?;
        docs.iter().map(|d| d.parse::<ViewerSession>()).collect()
    }

    /// Batch sweep: mark every active session of a stream inactive.
    pub async fn end_all_sessions(
        &self,
        stream_id: &SlotId,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let sessions = self.active_sessions(stream_id).await?;
        let count = sessions.len();
        for session in sessions {
            self.update_session(
                &session.id,
                json!({ "isActive": false, "leftAt": now }),
            )
            .await?;
        }
        Ok(count)
    }
}
