//! Global playlist document and playlist items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::UserId;

/// Synthetic owner of auto-play fallback entries.
pub const SYSTEM_USER: &str = "system";
pub const SYSTEM_USER_NAME: &str = "Auto-Play";

/// Supported track sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Vimeo,
    Soundcloud,
    Direct,
}

impl Platform {
    /// Classify a URL by host; anything unrecognized is a direct stream.
    #[must_use]
    pub fn classify(url: &url::Url) -> Self {
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        match host {
            "youtube.com" | "m.youtube.com" | "youtu.be" | "music.youtube.com" => Self::Youtube,
            "vimeo.com" | "player.vimeo.com" => Self::Vimeo,
            "soundcloud.com" | "on.soundcloud.com" => Self::Soundcloud,
            _ => Self::Direct,
        }
    }

    /// Embed id for iframe players, where the platform has one.
    #[must_use]
    pub fn embed_id(self, url: &url::Url) -> Option<String> {
        match self {
            Self::Youtube => {
                if url.host_str().is_some_and(|h| h.ends_with("youtu.be")) {
                    return url
                        .path_segments()
                        .and_then(|mut s| s.next())
                        .filter(|s| !s.is_empty())
                        .map(ToString::to_string);
                }
                url.query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned())
                    .or_else(|| {
                        // /embed/<id> and /shorts/<id> forms
                        let segments: Vec<&str> = url
                            .path_segments()
                            .map(|s| s.collect())
                            .unwrap_or_default();
                        match segments.as_slice() {
                            ["embed" | "shorts", id, ..] if !id.is_empty() => {
                                Some((*id).to_string())
                            }
                            _ => None,
                        }
                    })
            }
            Self::Vimeo => url
                .path_segments()
                .and_then(|s| s.last())
                .filter(|s| s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty())
                .map(ToString::to_string),
            Self::Soundcloud | Self::Direct => None,
        }
    }
}

/// One queued track, owned by the user who added it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItem {
    pub id: String,
    pub url: String,
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub added_by: UserId,
    pub added_by_name: String,
    pub added_at: DateTime<Utc>,
}

/// The process-wide shared queue. Singleton document `globalPlaylist/global`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GlobalPlaylist {
    #[serde(default)]
    pub queue: Vec<PlaylistItem>,
    #[serde(default)]
    pub current_index: usize,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl GlobalPlaylist {
    #[must_use]
    pub fn current_item(&self) -> Option<&PlaylistItem> {
        self.queue.get(self.current_index)
    }

    /// Queued items owned by a user.
    #[must_use]
    pub fn owned_count(&self, user: &UserId) -> usize {
        self.queue.iter().filter(|i| &i.added_by == user).count()
    }

    #[must_use]
    pub fn contains_url(&self, url: &str) -> bool {
        self.queue.iter().any(|i| i.url == url)
    }
}

/// Master play-history entry, keyed by URL and deduped: re-logging a URL
/// refreshes `played_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayHistoryEntry {
    pub url: String,
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub played_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(url: &str) -> url::Url {
        url.parse().unwrap()
    }

    #[test]
    fn classifies_known_hosts() {
        assert_eq!(
            Platform::classify(&parsed("https://www.youtube.com/watch?v=abc123")),
            Platform::Youtube
        );
        assert_eq!(
            Platform::classify(&parsed("https://youtu.be/abc123")),
            Platform::Youtube
        );
        assert_eq!(
            Platform::classify(&parsed("https://vimeo.com/12345")),
            Platform::Vimeo
        );
        assert_eq!(
            Platform::classify(&parsed("https://soundcloud.com/artist/track")),
            Platform::Soundcloud
        );
        assert_eq!(
            Platform::classify(&parsed("https://cdn.example.com/mix.mp3")),
            Platform::Direct
        );
    }

    #[test]
    fn extracts_embed_ids() {
        let yt = Platform::Youtube;
        assert_eq!(
            yt.embed_id(&parsed("https://www.youtube.com/watch?v=dQw4w9WgXcQ")),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            yt.embed_id(&parsed("https://youtu.be/dQw4w9WgXcQ")),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            yt.embed_id(&parsed("https://www.youtube.com/embed/dQw4w9WgXcQ")),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            Platform::Vimeo.embed_id(&parsed("https://vimeo.com/76979871")),
            Some("76979871".to_string())
        );
        assert_eq!(
            Platform::Soundcloud.embed_id(&parsed("https://soundcloud.com/a/b")),
            None
        );
    }

    #[test]
    fn ownership_counting() {
        let user = UserId::from_string("u1".to_string());
        let other = UserId::from_string("u2".to_string());
        let item = |owner: &UserId, url: &str| PlaylistItem {
            id: super::super::id::generate_id(),
            url: url.to_string(),
            platform: Platform::Direct,
            embed_id: None,
            title: None,
            thumbnail: None,
            added_by: owner.clone(),
            added_by_name: "x".to_string(),
            added_at: Utc::now(),
        };

        let playlist = GlobalPlaylist {
            queue: vec![item(&user, "a"), item(&user, "b"), item(&other, "c")],
            ..Default::default()
        };
        assert_eq!(playlist.owned_count(&user), 2);
        assert_eq!(playlist.owned_count(&other), 1);
        assert!(playlist.contains_url("b"));
        assert!(!playlist.contains_url("z"));
    }
}
