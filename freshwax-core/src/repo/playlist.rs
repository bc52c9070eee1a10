use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::models::{GlobalPlaylist, PlayHistoryEntry, UserId};
use crate::store::{collections, DocumentStore, Query};
use crate::{Error, Result};

/// The singleton playlist document's key.
const GLOBAL_KEY: &str = "global";

#[derive(Clone)]
pub struct PlaylistRepository {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for PlaylistRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistRepository").finish()
    }
}

impl PlaylistRepository {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> Result<GlobalPlaylist> {
        let doc = self
            .store
            .get(collections::GLOBAL_PLAYLIST, GLOBAL_KEY)
            .await?;
        match doc {
            Some(d) => Ok(serde_json::from_value(d)?),
            None => Ok(GlobalPlaylist::default()),
        }
    }

    pub async fn save(&self, playlist: &GlobalPlaylist) -> Result<()> {
        let doc = serde_json::to_value(playlist)?;
        self.store
            .set(collections::GLOBAL_PLAYLIST, GLOBAL_KEY, &doc)
            .await
    }

    /// Log a play into the master history. URL-deduped: replays refresh
    /// `playedAt` and keep a single entry.
    pub async fn log_play(&self, entry: &PlayHistoryEntry) -> Result<()> {
        let doc = serde_json::to_value(entry)?;
        self.store
            .set(collections::PLAY_HISTORY, &entry.url, &doc)
            .await
    }

    pub async fn history_entry(&self, url: &str) -> Result<Option<PlayHistoryEntry>> {
        let doc = self.store.get(collections::PLAY_HISTORY, url).await?;
        doc.map(|d| serde_json::from_value(d).map_err(Error::from))
            .transpose()
    }

    pub async fn history_all(&self) -> Result<Vec<PlayHistoryEntry>> {
        let docs = self
            .store
            .query(collections::PLAY_HISTORY, &Query::new())
            .await?;
        docs.iter().map(|d| d.parse::<PlayHistoryEntry>()).collect()
    }

    /// Most recent `played_at` for a URL, for cooldown checks.
    pub async fn last_played(&self, url: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.history_entry(url).await?.map(|e| e.played_at))
    }

    /// A user's saved personal playlist, stored on the user document.
    pub async fn personal_playlist(&self, user_id: &UserId) -> Result<Vec<PlayHistoryEntry>> {
        let doc = self.store.get(collections::USERS, user_id.as_str()).await?;
        let Some(doc) = doc else {
            return Ok(Vec::new());
        };
        match doc.get("personalPlaylist") {
            Some(tracks) => Ok(serde_json::from_value(tracks.clone())?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn save_personal_playlist(
        &self,
        user_id: &UserId,
        tracks: &[PlayHistoryEntry],
    ) -> Result<()> {
        let user_key = user_id.as_str();
        let patch = json!({ "personalPlaylist": tracks });
        match self.store.update(collections::USERS, user_key, &patch).await {
            Err(Error::NotFound(_)) => self.store.set(collections::USERS, user_key, &patch).await,
            other => other,
        }
    }
}
