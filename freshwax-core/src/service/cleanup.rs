//! Scheduled chat cleanup
//!
//! After a stream ends, its chat log is deleted on a delay. Jobs are
//! keyed by stream id; a periodic sweep executes whatever has come due.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::models::{ChatCleanupJob, CleanupStatus, SlotId};
use crate::repo::CleanupRepository;
use crate::{Error, Result};

/// Default delay between scheduling and deletion, hours.
const DEFAULT_DELAY_HOURS: i64 = 24;

#[derive(Clone)]
pub struct ChatCleanupService {
    repo: CleanupRepository,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ChatCleanupService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCleanupService").finish()
    }
}

impl ChatCleanupService {
    #[must_use]
    pub fn new(repo: CleanupRepository, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Schedule (or reschedule) cleanup for a stream.
    pub async fn schedule(
        &self,
        stream_id: &SlotId,
        cleanup_at: Option<DateTime<Utc>>,
    ) -> Result<ChatCleanupJob> {
        let now = self.clock.now();
        let job = ChatCleanupJob {
            stream_id: stream_id.clone(),
            scheduled_at: now,
            cleanup_at: cleanup_at.unwrap_or(now + Duration::hours(DEFAULT_DELAY_HOURS)),
            status: CleanupStatus::Pending,
            messages_deleted: None,
        };
        self.repo.put(&job).await?;
        tracing::info!(stream_id = %stream_id, cleanup_at = %job.cleanup_at, "cleanup scheduled");
        Ok(job)
    }

    pub async fn cancel(&self, stream_id: &SlotId) -> Result<()> {
        let job = self.repo.get(stream_id).await?;
        if job.is_none() {
            return Err(Error::NotFound("No cleanup job for that stream".to_string()));
        }
        self.repo.delete(stream_id).await?;
        tracing::info!(stream_id = %stream_id, "cleanup cancelled");
        Ok(())
    }

    /// Execute one job now. Refuses jobs whose `cleanup_at` is still in
    /// the future unless forced.
    pub async fn execute(&self, stream_id: &SlotId, force: bool) -> Result<ChatCleanupJob> {
        let mut job = self
            .repo
            .get(stream_id)
            .await?
            .ok_or_else(|| Error::NotFound("No cleanup job for that stream".to_string()))?;
        if job.status != CleanupStatus::Pending {
            return Ok(job);
        }
        let now = self.clock.now();
        if !force && job.cleanup_at > now {
            return Err(Error::InvalidRequest(format!(
                "Cleanup is not due until {}",
                job.cleanup_at
            )));
        }

        match self.repo.delete_chat_messages(stream_id).await {
            Ok(deleted) => {
                self.repo
                    .set_result(stream_id, CleanupStatus::Completed, Some(deleted))
                    .await?;
                job.status = CleanupStatus::Completed;
                job.messages_deleted = Some(deleted);
                tracing::info!(stream_id = %stream_id, deleted, "chat cleaned up");
            }
            Err(err) => {
                tracing::error!(stream_id = %stream_id, error = %err, "chat cleanup failed");
                self.repo
                    .set_result(stream_id, CleanupStatus::Failed, None)
                    .await?;
                job.status = CleanupStatus::Failed;
            }
        }
        Ok(job)
    }

    pub async fn pending(&self) -> Result<Vec<ChatCleanupJob>> {
        self.repo.pending().await
    }

    /// Periodic sweep: run every due job, logging and continuing on
    /// failures.
    pub async fn run_due(&self) -> Result<usize> {
        let due = self.repo.due(self.clock.now()).await?;
        let mut executed = 0;
        for job in due {
            match self.execute(&job.stream_id, false).await {
                Ok(_) => executed += 1,
                Err(err) => {
                    tracing::warn!(stream_id = %job.stream_id, error = %err, "sweep job failed");
                }
            }
        }
        Ok(executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{collections, DocumentStore, MemoryStore};
    use serde_json::json;

    fn fixture() -> (ChatCleanupService, Arc<MemoryStore>, ManualClock) {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new("2025-01-10T10:00:00Z".parse().unwrap());
        let service = ChatCleanupService::new(
            CleanupRepository::new(store.clone()),
            Arc::new(clock.clone()),
        );
        (service, store, clock)
    }

    #[tokio::test]
    async fn executes_only_after_due_time() {
        let (service, store, clock) = fixture();
        let stream = SlotId::from_string("s1".to_string());

        for i in 0..3 {
            store
                .set(
                    collections::CHAT_MESSAGES,
                    &format!("m{i}"),
                    &json!({ "streamId": "s1", "text": "hi" }),
                )
                .await
                .unwrap();
        }
        // A message for another stream must survive.
        store
            .set(
                collections::CHAT_MESSAGES,
                "other",
                &json!({ "streamId": "s2", "text": "keep" }),
            )
            .await
            .unwrap();

        service.schedule(&stream, None).await.unwrap();
        assert!(matches!(
            service.execute(&stream, false).await.unwrap_err(),
            Error::InvalidRequest(_)
        ));

        clock.advance(Duration::hours(25));
        let job = service.execute(&stream, false).await.unwrap();
        assert_eq!(job.status, CleanupStatus::Completed);
        assert_eq!(job.messages_deleted, Some(3));
        assert!(store
            .get(collections::CHAT_MESSAGES, "other")
            .await
            .unwrap()
            .is_some());

        // Executing a completed job is a no-op.
        let again = service.execute(&stream, false).await.unwrap();
        assert_eq!(again.status, CleanupStatus::Completed);
    }

    #[tokio::test]
    async fn sweep_runs_due_jobs() {
        let (service, _store, clock) = fixture();
        let due = SlotId::from_string("due".to_string());
        let later = SlotId::from_string("later".to_string());

        service.schedule(&due, Some(clock.now() + Duration::hours(1))).await.unwrap();
        service
            .schedule(&later, Some(clock.now() + Duration::hours(48)))
            .await
            .unwrap();

        clock.advance(Duration::hours(2));
        assert_eq!(service.run_due().await.unwrap(), 1);
        assert_eq!(service.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancel_removes_the_job() {
        let (service, _store, _clock) = fixture();
        let stream = SlotId::from_string("s1".to_string());

        service.schedule(&stream, None).await.unwrap();
        service.cancel(&stream).await.unwrap();
        assert!(matches!(
            service.cancel(&stream).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }
}
