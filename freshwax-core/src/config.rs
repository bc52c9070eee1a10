use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub redis: RedisConfig,
    pub pubsub: PubSubConfig,
    pub auth: AuthConfig,
    pub ingest: IngestConfig,
    pub quota: QuotaConfig,
    pub features: FeatureFlags,
    pub playlist: PlaylistConfig,
    pub logging: LoggingConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("store", &"<redacted>")
            .field("redis", &"<redacted>")
            .field("pubsub", &"<redacted>")
            .field("auth", &"<redacted>")
            .field("ingest", &self.ingest.redacted())
            .field("quota", &self.quota)
            .field("features", &self.features)
            .field("playlist", &self.playlist)
            .field("logging", &self.logging)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    /// CORS allowed origins; empty list allows any origin.
    pub cors_allowed_origins: Vec<String>,
    /// Per-request body size cap in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
            cors_allowed_origins: Vec::new(),
            max_body_bytes: 256 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `memory` or `postgres`.
    pub backend: String,
    pub postgres_url: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            postgres_url: String::new(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RedisConfig {
    /// Optional; rate limiting falls back to per-instance windows without it.
    pub url: String,
}

impl RedisConfig {
    #[must_use]
    pub fn url_opt(&self) -> Option<&str> {
        if self.url.is_empty() {
            None
        } else {
            Some(&self.url)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    /// `local` or `pusher`.
    pub backend: String,
    pub host: String,
    pub app_id: String,
    pub key: String,
    pub secret: String,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            backend: "local".to_string(),
            host: "https://api.pusherapp.com".to_string(),
            app_id: String::new(),
            key: String::new(),
            secret: String::new(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret for bearer-token verification.
    pub jwt_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// RTMP ingest base, e.g. `rtmp://ingest.freshwax.live/live`.
    pub rtmp_base: String,
    /// HLS playback base, e.g. `https://play.freshwax.live/hls`.
    pub hls_base: String,
    /// Leading segment of the stream-key grammar.
    pub stream_key_prefix: String,
    /// HMAC key for stream-key signatures.
    pub signing_secret: String,
    /// HMAC key for ingest webhook verification.
    pub webhook_secret: String,
    /// User-facing key-reveal window, minutes before slot start.
    pub reveal_minutes: i64,
    /// User-facing grace after slot end, minutes.
    pub grace_period_minutes: i64,
    /// Window the ingest edge accepts a key, minutes before start.
    pub ingest_reveal_minutes: i64,
    /// Grace the ingest edge allows after end, minutes.
    pub ingest_grace_minutes: i64,
    /// Final-countdown threshold, seconds.
    pub session_end_countdown: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            rtmp_base: "rtmp://localhost/live".to_string(),
            hls_base: "http://localhost:8088/hls".to_string(),
            stream_key_prefix: "fwx".to_string(),
            signing_secret: String::new(),
            webhook_secret: String::new(),
            reveal_minutes: 15,
            grace_period_minutes: 3,
            ingest_reveal_minutes: 30,
            ingest_grace_minutes: 5,
            session_end_countdown: 10,
        }
    }
}

impl IngestConfig {
    fn redacted(&self) -> RedactedIngest<'_> {
        RedactedIngest {
            rtmp_base: &self.rtmp_base,
            hls_base: &self.hls_base,
            stream_key_prefix: &self.stream_key_prefix,
            reveal_minutes: self.reveal_minutes,
            grace_period_minutes: self.grace_period_minutes,
            ingest_reveal_minutes: self.ingest_reveal_minutes,
            ingest_grace_minutes: self.ingest_grace_minutes,
            session_end_countdown: self.session_end_countdown,
        }
    }
}

#[derive(Debug)]
#[allow(dead_code)]
struct RedactedIngest<'a> {
    rtmp_base: &'a str,
    hls_base: &'a str,
    stream_key_prefix: &'a str,
    reveal_minutes: i64,
    grace_period_minutes: i64,
    ingest_reveal_minutes: i64,
    ingest_grace_minutes: i64,
    session_end_countdown: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Daily cap in hours for active Pro subscribers.
    pub default_daily_hours: i64,
    /// Daily cap in hours for free-tier DJs.
    pub free_daily_hours: i64,
    /// Weekly booking cap when no allowance override exists.
    pub default_weekly_slots: u32,
    /// Calendar used for the daily cap; only `utc` is honored.
    pub day_boundary_tz: String,
    /// Booking horizon in days.
    pub booking_horizon_days: i64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_daily_hours: 2,
            free_daily_hours: 1,
            default_weekly_slots: 2,
            day_boundary_tz: "utc".to_string(),
            booking_horizon_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub allow_go_live_now: bool,
    pub allow_go_live_after: bool,
    pub allow_takeover: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            allow_go_live_now: true,
            allow_go_live_after: true,
            allow_takeover: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistConfig {
    /// Per-URL replay cooldown.
    pub track_cooldown_ms: i64,
    /// Hard cap per track appearance.
    pub max_track_duration_ms: i64,
    /// Local history cap.
    pub max_queue_history: usize,
    /// Queued items one user may own at once.
    pub per_user_queue_limit: usize,
    /// Saved tracks per user.
    pub personal_playlist_cap: usize,
    /// A track older than this is considered stale on load, minutes.
    pub stale_after_minutes: i64,
    /// Deadline for oEmbed metadata fetches, seconds.
    pub metadata_timeout_secs: u64,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            track_cooldown_ms: 3_600_000,
            max_track_duration_ms: 600_000,
            max_queue_history: 100,
            per_user_queue_limit: 2,
            personal_playlist_cap: 500,
            stale_after_minutes: 15,
            metadata_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration, layering an optional TOML file under
    /// `FRESHWAX_`-prefixed environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        } else {
            builder = builder.add_source(File::with_name("freshwax").required(false));
        }

        builder
            .add_source(Environment::with_prefix("FRESHWAX").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = Config::default();
        assert_eq!(config.ingest.reveal_minutes, 15);
        assert_eq!(config.ingest.grace_period_minutes, 3);
        assert_eq!(config.ingest.ingest_reveal_minutes, 30);
        assert_eq!(config.ingest.ingest_grace_minutes, 5);
        assert_eq!(config.ingest.session_end_countdown, 10);
        assert_eq!(config.ingest.stream_key_prefix, "fwx");
        assert_eq!(config.quota.default_daily_hours, 2);
        assert_eq!(config.quota.default_weekly_slots, 2);
        assert_eq!(config.quota.booking_horizon_days, 30);
        assert_eq!(config.playlist.track_cooldown_ms, 3_600_000);
        assert_eq!(config.playlist.max_track_duration_ms, 600_000);
        assert_eq!(config.playlist.max_queue_history, 100);
        assert_eq!(config.playlist.per_user_queue_limit, 2);
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = Config::default();
        config.auth.jwt_secret = "super-secret".to_string();
        config.ingest.signing_secret = "key-secret".to_string();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("key-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
