//! Best-effort track metadata via the platforms' oEmbed endpoints.
//!
//! Never blocks a playlist write: failures and timeouts degrade to a bare
//! URL entry.

use std::time::Duration;

use serde::Deserialize;

use crate::models::Platform;

#[derive(Debug, Clone, Default)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OembedResponse {
    title: Option<String>,
    thumbnail_url: Option<String>,
}

#[derive(Clone)]
pub struct MetadataFetcher {
    client: reqwest::Client,
}

impl std::fmt::Debug for MetadataFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataFetcher").finish()
    }
}

impl MetadataFetcher {
    pub fn new(timeout_secs: u64) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| crate::Error::Transport(format!("http client: {e}")))?;
        Ok(Self { client })
    }

    /// oEmbed endpoint for a platform, if it has one.
    fn endpoint(platform: Platform, track_url: &str) -> Option<String> {
        let encoded: String =
            url::form_urlencoded::byte_serialize(track_url.as_bytes()).collect();
        match platform {
            Platform::Youtube => Some(format!(
                "https://www.youtube.com/oembed?url={encoded}&format=json"
            )),
            Platform::Vimeo => Some(format!("https://vimeo.com/api/oembed.json?url={encoded}")),
            Platform::Soundcloud => Some(format!(
                "https://soundcloud.com/oembed?url={encoded}&format=json"
            )),
            Platform::Direct => None,
        }
    }

    /// Fetch title/thumbnail; any failure returns empty metadata.
    pub async fn fetch(&self, platform: Platform, track_url: &str) -> TrackMetadata {
        let Some(endpoint) = Self::endpoint(platform, track_url) else {
            return TrackMetadata::default();
        };

        let response = match self.client.get(&endpoint).send().await {
            Ok(r) => r,
            Err(err) => {
                tracing::debug!(url = track_url, error = %err, "oembed fetch failed");
                return TrackMetadata::default();
            }
        };

        if !response.status().is_success() {
            tracing::debug!(
                url = track_url,
                status = %response.status(),
                "oembed fetch rejected"
            );
            return TrackMetadata::default();
        }

        match response.json::<OembedResponse>().await {
            Ok(body) => TrackMetadata {
                title: body.title,
                thumbnail: body.thumbnail_url,
            },
            Err(err) => {
                tracing::debug!(url = track_url, error = %err, "oembed body unreadable");
                TrackMetadata::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_urls_have_no_endpoint() {
        assert!(MetadataFetcher::endpoint(Platform::Direct, "https://x.test/a.mp3").is_none());
    }

    #[test]
    fn endpoints_urlencode_the_track() {
        let endpoint = MetadataFetcher::endpoint(
            Platform::Youtube,
            "https://www.youtube.com/watch?v=abc&t=10",
        )
        .unwrap();
        assert!(endpoint.starts_with("https://www.youtube.com/oembed?url="));
        assert!(endpoint.contains("%3A%2F%2F"));
        assert!(!endpoint["https://www.youtube.com/oembed?url=".len()..].contains("&t="));
    }
}
