//! Global playlist coordinator
//!
//! One shared queue every viewer sees identically: a fair DJ waitlist
//! with per-user quotas, per-URL cooldowns, a hard per-track time cap,
//! and an auto-play fallback from the master history when the queue runs
//! dry. Every state-changing write persists the document first, then
//! broadcasts it whole; clients reconcile against the document, not the
//! events.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::seq::IteratorRandom;
use serde_json::json;

use crate::clock::Clock;
use crate::config::PlaylistConfig;
use crate::models::{
    generate_id, GlobalPlaylist, PlayHistoryEntry, Platform, PlaylistItem, UserId, SYSTEM_USER,
    SYSTEM_USER_NAME,
};
use crate::oembed::MetadataFetcher;
use crate::pubsub::{
    publish_best_effort, EventPublisher, EVENT_PLAYLIST_UPDATE, PLAYLIST_CHANNEL,
};
use crate::repo::PlaylistRepository;
use crate::{Error, Result};

#[derive(Clone)]
pub struct PlaylistCoordinator {
    repo: PlaylistRepository,
    fetcher: MetadataFetcher,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    config: PlaylistConfig,
}

impl std::fmt::Debug for PlaylistCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistCoordinator").finish()
    }
}

impl PlaylistCoordinator {
    #[must_use]
    pub fn new(
        repo: PlaylistRepository,
        fetcher: MetadataFetcher,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        config: PlaylistConfig,
    ) -> Self {
        Self {
            repo,
            fetcher,
            publisher,
            clock,
            config,
        }
    }

    /// Load the playlist, resetting it first if it is stale (playing with
    /// an empty queue, or a track "started" longer ago than the safety
    /// cap).
    pub async fn load(&self) -> Result<GlobalPlaylist> {
        let playlist = self.repo.load().await?;
        let now = self.clock.now();

        let playing_nothing = playlist.is_playing && playlist.queue.is_empty();
        let ancient_track = playlist.track_started_at.is_some_and(|started| {
            now - started > Duration::minutes(self.config.stale_after_minutes)
        });
        if playing_nothing || ancient_track {
            tracing::info!(
                playing_nothing,
                ancient_track,
                "stale playlist reset"
            );
            let fresh = GlobalPlaylist {
                last_updated: Some(now),
                ..GlobalPlaylist::default()
            };
            self.repo.save(&fresh).await?;
            self.broadcast(&fresh).await;
            return Ok(fresh);
        }
        Ok(playlist)
    }

    /// Seconds into the current track a late joiner should seek to.
    #[must_use]
    pub fn playhead_ms(&self, playlist: &GlobalPlaylist) -> i64 {
        let Some(started) = playlist.track_started_at else {
            return 0;
        };
        (self.clock.now() - started)
            .num_milliseconds()
            .clamp(0, self.config.max_track_duration_ms)
    }

    /// Add a track to the shared queue.
    pub async fn add(
        &self,
        user_id: &UserId,
        user_name: &str,
        raw_url: &str,
    ) -> Result<GlobalPlaylist> {
        let trimmed = raw_url.trim();
        let parsed: url::Url = trimmed
            .parse()
            .map_err(|_| Error::InvalidRequest("Invalid track URL".to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidRequest("Invalid track URL".to_string()));
        }

        let now = self.clock.now();
        let mut playlist = self.load().await?;

        if playlist.contains_url(trimmed) {
            return Err(Error::InvalidRequest(
                "That track is already in the queue".to_string(),
            ));
        }
        if let Some(played_at) = self.repo.last_played(trimmed).await? {
            let cooldown = Duration::milliseconds(self.config.track_cooldown_ms);
            let since = now - played_at;
            if since < cooldown {
                let wait_minutes = ((cooldown - since).num_seconds() + 59) / 60;
                return Err(Error::InvalidRequest(format!(
                    "That track played recently, try again in {wait_minutes} minutes"
                )));
            }
        }
        if playlist.owned_count(user_id) >= self.config.per_user_queue_limit {
            return Err(Error::quota(
                format!(
                    "You already have {} tracks in the queue",
                    self.config.per_user_queue_limit
                ),
                false,
                false,
            ));
        }

        let platform = Platform::classify(&parsed);
        let metadata = self.fetcher.fetch(platform, trimmed).await;
        let item = PlaylistItem {
            id: generate_id(),
            url: trimmed.to_string(),
            platform,
            embed_id: platform.embed_id(&parsed),
            title: metadata.title,
            thumbnail: metadata.thumbnail,
            added_by: user_id.clone(),
            added_by_name: user_name.to_string(),
            added_at: now,
        };

        let starting_fresh = playlist.queue.is_empty() && !playlist.is_playing;
        playlist.queue.push(item);
        if starting_fresh {
            playlist.current_index = 0;
            playlist.is_playing = true;
            playlist.track_started_at = Some(now);
        }
        playlist.last_updated = Some(now);

        self.repo.save(&playlist).await?;
        self.broadcast(&playlist).await;
        tracing::info!(user_id = %user_id, url = trimmed, "track queued");
        Ok(playlist)
    }

    /// Remove an item; only its owner or an admin may.
    pub async fn remove(
        &self,
        item_id: &str,
        caller: &UserId,
        is_admin: bool,
    ) -> Result<GlobalPlaylist> {
        let now = self.clock.now();
        let mut playlist = self.load().await?;

        let index = playlist
            .queue
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| Error::NotFound("Track not in queue".to_string()))?;
        if !is_admin && playlist.queue[index].added_by != *caller {
            return Err(Error::Forbidden(
                "Only the user who added a track can remove it".to_string(),
            ));
        }

        let removing_current = index == playlist.current_index;
        playlist.queue.remove(index);
        if index < playlist.current_index {
            playlist.current_index -= 1;
        }
        if removing_current {
            self.normalize_after_advance(&mut playlist, now);
        }
        playlist.last_updated = Some(now);

        self.repo.save(&playlist).await?;
        self.broadcast(&playlist).await;
        Ok(playlist)
    }

    /// The current track finished (naturally or via the 10-minute cap) or
    /// was skipped. Logs it to the master history, drops it from the
    /// queue, and falls back to auto-play when the queue empties.
    pub async fn advance(&self, mark_played: bool) -> Result<GlobalPlaylist> {
        let now = self.clock.now();
        let mut playlist = self.load().await?;

        let finished_url = match playlist.current_item() {
            Some(item) => {
                let url = item.url.clone();
                if mark_played {
                    let entry = PlayHistoryEntry {
                        url: url.clone(),
                        platform: item.platform,
                        embed_id: item.embed_id.clone(),
                        title: item.title.clone(),
                        thumbnail: item.thumbnail.clone(),
                        played_at: now,
                    };
                    if let Err(err) = self.repo.log_play(&entry).await {
                        tracing::warn!(url = %entry.url, error = %err, "history log failed");
                    }
                }
                playlist.queue.remove(playlist.current_index);
                Some(url)
            }
            None => None,
        };

        self.normalize_after_advance(&mut playlist, now);
        if playlist.queue.is_empty() {
            self.autoplay_fallback(&mut playlist, finished_url.as_deref(), now)
                .await?;
        }
        playlist.last_updated = Some(now);

        self.repo.save(&playlist).await?;
        self.broadcast(&playlist).await;
        Ok(playlist)
    }

    /// Auto-skip the current track once it has played for the hard cap.
    /// Called from the periodic tick; a no-op otherwise.
    pub async fn enforce_track_cap(&self) -> Result<Option<GlobalPlaylist>> {
        let playlist = self.repo.load().await?;
        if !playlist.is_playing {
            return Ok(None);
        }
        let Some(started) = playlist.track_started_at else {
            return Ok(None);
        };
        let played_ms = (self.clock.now() - started).num_milliseconds();
        if played_ms >= self.config.max_track_duration_ms {
            tracing::info!(played_ms, "track hit the duration cap, skipping");
            return Ok(Some(self.advance(true).await?));
        }
        Ok(None)
    }

    // --- personal playlists ---

    /// Save a track to the caller's personal playlist (capped).
    pub async fn save_personal_track(
        &self,
        user_id: &UserId,
        entry: PlayHistoryEntry,
    ) -> Result<Vec<PlayHistoryEntry>> {
        let mut tracks = self.repo.personal_playlist(user_id).await?;
        tracks.retain(|t| t.url != entry.url);
        tracks.insert(0, entry);
        if tracks.len() > self.config.personal_playlist_cap {
            tracks.truncate(self.config.personal_playlist_cap);
        }
        self.repo.save_personal_playlist(user_id, &tracks).await?;
        Ok(tracks)
    }

    pub async fn remove_personal_track(
        &self,
        user_id: &UserId,
        url: &str,
    ) -> Result<Vec<PlayHistoryEntry>> {
        let mut tracks = self.repo.personal_playlist(user_id).await?;
        tracks.retain(|t| t.url != url);
        self.repo.save_personal_playlist(user_id, &tracks).await?;
        Ok(tracks)
    }

    pub async fn personal_playlist(&self, user_id: &UserId) -> Result<Vec<PlayHistoryEntry>> {
        self.repo.personal_playlist(user_id).await
    }

    // --- internals ---

    /// After removing the current item: wrap the index, restart the clock
    /// for the next track, or go quiet on an empty queue.
    fn normalize_after_advance(&self, playlist: &mut GlobalPlaylist, now: DateTime<Utc>) {
        if playlist.queue.is_empty() {
            playlist.current_index = 0;
            playlist.is_playing = false;
            playlist.track_started_at = None;
            return;
        }
        if playlist.current_index >= playlist.queue.len() {
            playlist.current_index = 0;
        }
        playlist.is_playing = true;
        playlist.track_started_at = Some(now);
    }

    /// Refill an empty queue from the master history: random entry, not
    /// the one that just finished, not played within the cooldown. If the
    /// filter rejects everything, any entry other than the last played.
    async fn autoplay_fallback(
        &self,
        playlist: &mut GlobalPlaylist,
        just_finished: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let history = self.repo.history_all().await?;
        if history.is_empty() {
            return Ok(());
        }

        let cooldown = Duration::milliseconds(self.config.track_cooldown_ms);
        let fresh = history
            .iter()
            .filter(|e| Some(e.url.as_str()) != just_finished)
            .filter(|e| now - e.played_at >= cooldown);
        let chosen = fresh
            .choose(&mut rand::thread_rng())
            .or_else(|| {
                history
                    .iter()
                    .filter(|e| Some(e.url.as_str()) != just_finished)
                    .choose(&mut rand::thread_rng())
            })
            .cloned();

        let Some(entry) = chosen else {
            return Ok(());
        };
        tracing::info!(url = %entry.url, "auto-play fallback");
        playlist.queue.push(PlaylistItem {
            id: generate_id(),
            url: entry.url,
            platform: entry.platform,
            embed_id: entry.embed_id,
            title: entry.title,
            thumbnail: entry.thumbnail,
            added_by: UserId::from_string(SYSTEM_USER.to_string()),
            added_by_name: SYSTEM_USER_NAME.to_string(),
            added_at: now,
        });
        playlist.current_index = 0;
        playlist.is_playing = true;
        playlist.track_started_at = Some(now);
        Ok(())
    }

    async fn broadcast(&self, playlist: &GlobalPlaylist) {
        let payload = match serde_json::to_value(playlist) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, "playlist serialize failed");
                return;
            }
        };
        publish_best_effort(
            self.publisher.as_ref(),
            PLAYLIST_CHANNEL,
            EVENT_PLAYLIST_UPDATE,
            json!({ "playlist": payload }),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::pubsub::LocalBus;
    use crate::store::MemoryStore;

    fn fixture() -> (PlaylistCoordinator, PlaylistRepository, ManualClock, Arc<LocalBus>) {
        let store = Arc::new(MemoryStore::new());
        let repo = PlaylistRepository::new(store);
        let clock = ManualClock::new("2025-01-10T10:00:00Z".parse().unwrap());
        let bus = Arc::new(LocalBus::default());
        let coordinator = PlaylistCoordinator::new(
            repo.clone(),
            MetadataFetcher::new(1).unwrap(),
            bus.clone(),
            Arc::new(clock.clone()),
            PlaylistConfig::default(),
        );
        (coordinator, repo, clock, bus)
    }

    fn user(id: &str) -> UserId {
        UserId::from_string(id.to_string())
    }

    #[tokio::test]
    async fn first_add_starts_playback() {
        let (coordinator, _, _, bus) = fixture();
        let mut rx = bus.subscribe();

        let playlist = coordinator
            .add(&user("u1"), "Lena", "https://cdn.example.com/a.mp3")
            .await
            .unwrap();
        assert_eq!(playlist.queue.len(), 1);
        assert!(playlist.is_playing);
        assert_eq!(playlist.current_index, 0);
        assert!(playlist.track_started_at.is_some());
        assert_eq!(playlist.queue[0].platform, Platform::Direct);

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.channel, PLAYLIST_CHANNEL);
        assert_eq!(frame.event, EVENT_PLAYLIST_UPDATE);
    }

    #[tokio::test]
    async fn rejects_duplicates_quota_and_bad_urls() {
        let (coordinator, _, _, _) = fixture();
        let u1 = user("u1");

        coordinator
            .add(&u1, "Lena", "https://cdn.example.com/a.mp3")
            .await
            .unwrap();

        // Queue duplicate.
        let err = coordinator
            .add(&user("u2"), "Max", "https://cdn.example.com/a.mp3")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        // Third track for the same owner.
        coordinator
            .add(&u1, "Lena", "https://cdn.example.com/b.mp3")
            .await
            .unwrap();
        let err = coordinator
            .add(&u1, "Lena", "https://cdn.example.com/c.mp3")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { .. }));

        // Invalid URL.
        let err = coordinator.add(&u1, "Lena", "not a url").await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        let err = coordinator
            .add(&u1, "Lena", "ftp://cdn.example.com/d.mp3")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn cooldown_blocks_recent_replays() {
        let (coordinator, _, clock, _) = fixture();
        let url = "https://cdn.example.com/a.mp3";

        coordinator.add(&user("u1"), "Lena", url).await.unwrap();
        // Track completes; history records the play.
        coordinator.advance(true).await.unwrap();

        // Thirty minutes later, a replay is still inside the 60-minute
        // cooldown and names the remaining wait.
        clock.advance(Duration::minutes(30));
        let err = coordinator.add(&user("u2"), "Max", url).await.unwrap_err();
        match err {
            Error::InvalidRequest(message) => {
                assert!(message.contains("30 minutes"), "got: {message}");
            }
            other => panic!("expected InvalidRequest, got {other:?}"),
        }

        // Past the cooldown it is accepted again.
        clock.advance(Duration::minutes(31));
        coordinator.add(&user("u2"), "Max", url).await.unwrap();
    }

    #[tokio::test]
    async fn owner_only_removal_and_current_advance() {
        let (coordinator, _, _, _) = fixture();
        let u1 = user("u1");
        let u2 = user("u2");

        let playlist = coordinator
            .add(&u1, "Lena", "https://cdn.example.com/a.mp3")
            .await
            .unwrap();
        let first_id = playlist.queue[0].id.clone();
        coordinator
            .add(&u2, "Max", "https://cdn.example.com/b.mp3")
            .await
            .unwrap();

        // Non-owner cannot remove.
        let err = coordinator.remove(&first_id, &u2, false).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        // Admin removes the currently-playing item; the next track takes
        // over with a fresh start time.
        let playlist = coordinator.remove(&first_id, &u2, true).await.unwrap();
        assert_eq!(playlist.queue.len(), 1);
        assert_eq!(playlist.current_index, 0);
        assert!(playlist.is_playing);
        assert_eq!(playlist.queue[0].url, "https://cdn.example.com/b.mp3");
    }

    #[tokio::test]
    async fn advance_falls_back_to_history() {
        let (coordinator, repo, clock, _) = fixture();

        // Seed the master history with an old play.
        repo.log_play(&PlayHistoryEntry {
            url: "https://cdn.example.com/old.mp3".to_string(),
            platform: Platform::Direct,
            embed_id: None,
            title: None,
            thumbnail: None,
            played_at: "2025-01-10T08:00:00Z".parse().unwrap(),
        })
        .await
        .unwrap();

        coordinator
            .add(&user("u1"), "Lena", "https://cdn.example.com/live.mp3")
            .await
            .unwrap();
        clock.advance(Duration::minutes(5));

        // Queue empties; the coordinator injects the eligible history
        // entry as the synthetic system user.
        let playlist = coordinator.advance(true).await.unwrap();
        assert_eq!(playlist.queue.len(), 1);
        assert_eq!(playlist.queue[0].url, "https://cdn.example.com/old.mp3");
        assert_eq!(playlist.queue[0].added_by.as_str(), SYSTEM_USER);
        assert_eq!(playlist.queue[0].added_by_name, SYSTEM_USER_NAME);
        assert!(playlist.is_playing);
    }

    #[tokio::test]
    async fn fallback_never_repeats_the_finished_track() {
        let (coordinator, _repo, clock, _) = fixture();

        // Only history entry will be the track that just finished, so the
        // fallback must leave the queue empty rather than repeat it.
        coordinator
            .add(&user("u1"), "Lena", "https://cdn.example.com/only.mp3")
            .await
            .unwrap();
        clock.advance(Duration::minutes(5));
        let playlist = coordinator.advance(true).await.unwrap();
        assert!(playlist.queue.is_empty());
        assert!(!playlist.is_playing);
    }

    #[tokio::test]
    async fn track_cap_fires_at_exactly_ten_minutes() {
        let (coordinator, _, clock, _) = fixture();
        coordinator
            .add(&user("u1"), "Lena", "https://cdn.example.com/a.mp3")
            .await
            .unwrap();

        clock.advance(Duration::minutes(9));
        assert!(coordinator.enforce_track_cap().await.unwrap().is_none());

        clock.advance(Duration::minutes(1));
        let skipped = coordinator.enforce_track_cap().await.unwrap();
        assert!(skipped.is_some());
    }

    #[tokio::test]
    async fn stale_playlist_resets_on_load() {
        let (coordinator, repo, clock, _) = fixture();
        coordinator
            .add(&user("u1"), "Lena", "https://cdn.example.com/a.mp3")
            .await
            .unwrap();

        // Sixteen minutes without an advance exceeds the safety cap.
        clock.advance(Duration::minutes(16));
        let playlist = coordinator.load().await.unwrap();
        assert!(playlist.queue.is_empty());
        assert!(!playlist.is_playing);

        // Playing-with-empty-queue is also stale.
        repo.save(&GlobalPlaylist {
            is_playing: true,
            ..GlobalPlaylist::default()
        })
        .await
        .unwrap();
        let playlist = coordinator.load().await.unwrap();
        assert!(!playlist.is_playing);
    }

    #[tokio::test]
    async fn personal_playlist_dedupes_and_caps() {
        let (coordinator, _, _, _) = fixture();
        let u1 = user("u1");
        let entry = |url: &str| PlayHistoryEntry {
            url: url.to_string(),
            platform: Platform::Direct,
            embed_id: None,
            title: None,
            thumbnail: None,
            played_at: "2025-01-10T09:00:00Z".parse().unwrap(),
        };

        coordinator
            .save_personal_track(&u1, entry("https://x.test/a.mp3"))
            .await
            .unwrap();
        let tracks = coordinator
            .save_personal_track(&u1, entry("https://x.test/a.mp3"))
            .await
            .unwrap();
        assert_eq!(tracks.len(), 1);

        let tracks = coordinator
            .remove_personal_track(&u1, "https://x.test/a.mp3")
            .await
            .unwrap();
        assert!(tracks.is_empty());
    }
}
