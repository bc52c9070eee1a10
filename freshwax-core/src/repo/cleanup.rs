use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::models::{ChatCleanupJob, CleanupStatus, SlotId};
use crate::store::{collections, DocumentStore, Filter, Query};
use crate::{Error, Result};

/// Accessor for chat-cleanup jobs and the chat messages they delete.
#[derive(Clone)]
pub struct CleanupRepository {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for CleanupRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRepository").finish()
    }
}

impl CleanupRepository {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, stream_id: &SlotId) -> Result<Option<ChatCleanupJob>> {
        let doc = self
            .store
            .get(collections::CHAT_CLEANUP, stream_id.as_str())
            .await?;
        doc.map(|d| serde_json::from_value(d).map_err(Error::from))
            .transpose()
    }

    pub async fn put(&self, job: &ChatCleanupJob) -> Result<()> {
        let doc = serde_json::to_value(job)?;
        self.store
            .set(collections::CHAT_CLEANUP, job.stream_id.as_str(), &doc)
            .await
    }

    pub async fn delete(&self, stream_id: &SlotId) -> Result<()> {
        self.store
            .delete(collections::CHAT_CLEANUP, stream_id.as_str())
            .await
    }

    pub async fn pending(&self) -> Result<Vec<ChatCleanupJob>> {
        let query = Query::new().filter(Filter::Eq("status", json!("pending")));
        let docs = self.store.query(collections::CHAT_CLEANUP, &query).await?;
        docs.iter().map(|d| d.parse::<ChatCleanupJob>()).collect()
    }

    /// Pending jobs whose `cleanupAt` has passed.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<ChatCleanupJob>> {
        let query = Query::new()
            .filter(Filter::Eq("status", json!("pending")))
            .filter(Filter::Le("cleanupAt", json!(now)));
        let docs = self.store.query(collections::CHAT_CLEANUP, &query).await?;
        docs.iter().map(|d| d.parse::<ChatCleanupJob>()).collect()
    }

    pub async fn set_result(
        &self,
        stream_id: &SlotId,
        status: CleanupStatus,
        messages_deleted: Option<i64>,
    ) -> Result<()> {
        self.store
            .update(
                collections::CHAT_CLEANUP,
                stream_id.as_str(),
                &json!({ "status": status, "messagesDeleted": messages_deleted }),
            )
            .await
    }

    /// Delete every chat message belonging to a stream, returning the count.
    pub async fn delete_chat_messages(&self, stream_id: &SlotId) -> Result<i64> {
        let query = Query::new().filter(Filter::Eq("streamId", json!(stream_id)));
        let docs = self.store.query(collections::CHAT_MESSAGES, &query).await?;
        let count = docs.len() as i64;
        for doc in docs {
            self.store
                .delete(collections::CHAT_MESSAGES, &doc.key)
                .await?;
        }
        Ok(count)
    }
}
