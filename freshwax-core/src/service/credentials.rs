//! Stream credential service
//!
//! Mints opaque, time-bound stream keys, validates them at publish time,
//! and builds the matching RTMP ingest and HLS playback URLs.
//!
//! Key grammar: `{prefix}_{djIdShort}_{slotIdShort}_{tsBase36}_{sig12}`.
//! The signature binds the key to the slot window, so rescheduling a slot
//! requires regenerating its key.

use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::json;

use crate::clock::Clock;
use crate::config::IngestConfig;
use crate::crypto::{base36_decode, base36_encode, hmac_sha256_hex};
use crate::models::{Slot, SlotId, SlotStatus, UserId};
use crate::repo::{ArtistRepository, SlotRepository};
use crate::Result;

/// Hex chars of the HMAC kept in the key.
const SIG_LEN: usize = 12;

/// Structural parts of a candidate key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub dj_short: String,
    pub slot_short: String,
    pub start_unix: u64,
    pub signature: String,
}

/// Why a candidate key was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRejection {
    Malformed,
    NotFound,
    BadStatus,
    Cancelled,
    TooEarly { minutes_until: i64 },
    Expired,
    DjBlocked,
}

impl KeyRejection {
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Malformed => "Malformed stream key".to_string(),
            Self::NotFound => "Unknown stream key".to_string(),
            Self::BadStatus => "Slot is not accepting a stream".to_string(),
            Self::Cancelled => "Slot was cancelled".to_string(),
            Self::TooEarly { minutes_until } => {
                format!("Stream key becomes valid in {minutes_until} minutes")
            }
            Self::Expired => "Stream key has expired".to_string(),
            Self::DjBlocked => "DJ account is suspended".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum KeyValidation {
    Valid { slot: Box<Slot> },
    Rejected(KeyRejection),
}

impl KeyValidation {
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

#[derive(Clone)]
pub struct StreamKeyService {
    config: IngestConfig,
    slots: SlotRepository,
    artists: ArtistRepository,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for StreamKeyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamKeyService")
            .field("prefix", &self.config.stream_key_prefix)
            .finish()
    }
}

impl StreamKeyService {
    #[must_use]
    pub fn new(
        config: IngestConfig,
        slots: SlotRepository,
        artists: ArtistRepository,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            slots,
            artists,
            clock,
        }
    }

    /// Deterministic signed key for a slot window.
    #[must_use]
    pub fn generate(
        &self,
        dj_id: &UserId,
        slot_id: &SlotId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> String {
        let payload = format!(
            "{}:{}:{}:{}",
            dj_id,
            slot_id,
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        let signature = hmac_sha256_hex(&self.config.signing_secret, &payload);
        format!(
            "{}_{}_{}_{}_{}",
            self.config.stream_key_prefix,
            dj_id.short(),
            slot_id.short(),
            base36_encode(start.timestamp().max(0) as u64),
            &signature[..SIG_LEN],
        )
    }

    /// Structural parse; `None` on shape or prefix mismatch.
    #[must_use]
    pub fn parse(&self, candidate: &str) -> Option<ParsedKey> {
        let parts: Vec<&str> = candidate.split('_').collect();
        if parts.len() != 5 {
            return None;
        }
        let (prefix, dj_short, slot_short, ts, signature) =
            (parts[0], parts[1], parts[2], parts[3], parts[4]);
        if prefix != self.config.stream_key_prefix
            || dj_short.is_empty()
            || slot_short.is_empty()
            || signature.len() != SIG_LEN
        {
            return None;
        }
        Some(ParsedKey {
            dj_short: dj_short.to_string(),
            slot_short: slot_short.to_string(),
            start_unix: base36_decode(ts)?,
            signature: signature.to_string(),
        })
    }

    /// Full publish-time validation against the slot window and DJ state.
    ///
    /// Accepting bumps a `scheduled`/`in_lobby` slot to `connecting` as a
    /// non-critical side effect; a failed bump never changes the outcome.
    pub async fn validate(&self, candidate: &str) -> Result<KeyValidation> {
        if self.parse(candidate).is_none() {
            return Ok(KeyValidation::Rejected(KeyRejection::Malformed));
        }

        let mut matches = self.slots.find_by_stream_key(candidate).await?;
        if matches.is_empty() {
            return Ok(KeyValidation::Rejected(KeyRejection::NotFound));
        }
        // Multiple matches should not occur; prefer the most recent
        // non-cancelled one.
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let slot = matches
            .iter()
            .find(|s| s.status != SlotStatus::Cancelled)
            .unwrap_or(&matches[0])
            .clone();

        if slot.status == SlotStatus::Cancelled {
            return Ok(KeyValidation::Rejected(KeyRejection::Cancelled));
        }
        if !slot.status.key_may_validate() {
            return Ok(KeyValidation::Rejected(KeyRejection::BadStatus));
        }

        let now = self.clock.now();
        let window_start = slot.start_time - Duration::minutes(self.config.ingest_reveal_minutes);
        let window_end = slot.end_time + Duration::minutes(self.config.ingest_grace_minutes);
        if now < window_start {
            let millis_until = (window_start - now).num_milliseconds();
            return Ok(KeyValidation::Rejected(KeyRejection::TooEarly {
                minutes_until: (millis_until + 59_999) / 60_000,
            }));
        }
        if now > window_end {
            return Ok(KeyValidation::Rejected(KeyRejection::Expired));
        }

        if let Some(profile) = self.artists.profile(&slot.dj_id).await? {
            if profile.is_blocked() {
                return Ok(KeyValidation::Rejected(KeyRejection::DjBlocked));
            }
        }

        if matches!(slot.status, SlotStatus::Scheduled | SlotStatus::InLobby) {
            if let Err(err) = self
                .slots
                .update_fields(&slot.id, json!({ "status": "connecting", "updatedAt": now }))
                .await
            {
                tracing::warn!(slot_id = %slot.id, error = %err, "connecting bump failed");
            }
        }

        Ok(KeyValidation::Valid {
            slot: Box::new(slot),
        })
    }

    // --- URL builders ---

    #[must_use]
    pub fn rtmp_url(&self, stream_key: &str) -> String {
        format!("{}/{stream_key}", self.config.rtmp_base.trim_end_matches('/'))
    }

    #[must_use]
    pub fn hls_url(&self, stream_key: &str) -> String {
        format!(
            "{}/{stream_key}/index.m3u8",
            self.config.hls_base.trim_end_matches('/')
        )
    }

    /// Fallback and low-latency playlist variants, in preference order.
    #[must_use]
    pub fn hls_fallback_urls(&self, stream_key: &str) -> Vec<String> {
        let base = self.config.hls_base.trim_end_matches('/');
        vec![
            format!("{base}/{stream_key}/playlist.m3u8"),
            format!("{base}/{stream_key}/chunklist.m3u8"),
        ]
    }
}

/// Pull a candidate key out of an ingest request: explicit `key`/`name`/
/// `streamKey` params win, else the last path segment with a leading
/// `live/` application prefix trimmed.
#[must_use]
pub fn extract_stream_key(
    key: Option<&str>,
    name: Option<&str>,
    stream_key: Option<&str>,
    path: Option<&str>,
) -> Option<String> {
    for explicit in [key, name, stream_key] {
        if let Some(value) = explicit {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    let path = path?.trim().trim_start_matches('/');
    let path = path.strip_prefix("live/").unwrap_or(path);
    let last = path.rsplit('/').next()?.trim();
    if last.is_empty() {
        None
    } else {
        Some(last.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn service_with_clock(now: &str) -> (StreamKeyService, SlotRepository, ManualClock) {
        let store = Arc::new(MemoryStore::new());
        let slots = SlotRepository::new(store.clone());
        let artists = ArtistRepository::new(store);
        let clock = ManualClock::new(now.parse().unwrap());
        let config = IngestConfig {
            signing_secret: "test-secret".to_string(),
            ..IngestConfig::default()
        };
        let service =
            StreamKeyService::new(config, slots.clone(), artists, Arc::new(clock.clone()));
        (service, slots, clock)
    }

    #[test]
    fn key_grammar_has_five_parts() {
        let (service, _, _) = service_with_clock("2025-01-10T10:00:00Z");
        let dj = UserId::from_string("d1d1d1d1d1d1d1d1d1d1".to_string());
        let slot = SlotId::from_string("5105105105105105105a".to_string());
        let start: DateTime<Utc> = "2025-01-10T11:00:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2025-01-10T12:00:00Z".parse().unwrap();

        let key = service.generate(&dj, &slot, start, end);
        assert!(key.starts_with("fwx_d1d1d1d1_51051051_"));

        let parsed = service.parse(&key).unwrap();
        assert_eq!(parsed.dj_short, "d1d1d1d1");
        assert_eq!(parsed.slot_short, "51051051");
        assert_eq!(parsed.start_unix, start.timestamp() as u64);
        assert_eq!(parsed.signature.len(), SIG_LEN);
    }

    #[test]
    fn signature_binds_the_window() {
        let (service, _, _) = service_with_clock("2025-01-10T10:00:00Z");
        let dj = UserId::from_string("d1d1d1d1d1d1d1d1d1d1".to_string());
        let slot = SlotId::from_string("5105105105105105105a".to_string());
        let start: DateTime<Utc> = "2025-01-10T11:00:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2025-01-10T12:00:00Z".parse().unwrap();

        let key = service.generate(&dj, &slot, start, end);
        let rescheduled = service.generate(&dj, &slot, start + Duration::minutes(30), end);
        assert_ne!(key, rescheduled);
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        let (service, _, _) = service_with_clock("2025-01-10T10:00:00Z");
        assert!(service.parse("").is_none());
        assert!(service.parse("fwx_only_three").is_none());
        assert!(service.parse("bad_a_b_c_d").is_none());
        assert!(service
            .parse("fwx_djdjdjdj_slotslot_zz!!_123456789012")
            .is_none());
        // Wrong signature length.
        assert!(service.parse("fwx_djdjdjdj_slotslot_1a2b_short").is_none());
    }

    #[test]
    fn extracts_keys_from_params_and_paths() {
        assert_eq!(
            extract_stream_key(Some("fwx_a_b_c_d"), None, None, None),
            Some("fwx_a_b_c_d".to_string())
        );
        assert_eq!(
            extract_stream_key(None, Some("named"), None, Some("ignored")),
            Some("named".to_string())
        );
        assert_eq!(
            extract_stream_key(None, None, None, Some("/live/fwx_a_b_c_d")),
            Some("fwx_a_b_c_d".to_string())
        );
        assert_eq!(
            extract_stream_key(None, None, None, Some("live/app/fwx_a_b_c_d")),
            Some("fwx_a_b_c_d".to_string())
        );
        assert_eq!(extract_stream_key(None, None, None, None), None);
        assert_eq!(extract_stream_key(Some("  "), None, None, None), None);
    }

    #[tokio::test]
    async fn validate_walks_the_window() {
        let (service, slots, clock) = service_with_clock("2025-01-10T10:00:00Z");
        let dj = UserId::from_string("d1d1d1d1d1d1d1d1d1d1".to_string());
        let slot_id = SlotId::from_string("5105105105105105105a".to_string());
        let start: DateTime<Utc> = "2025-01-10T11:00:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2025-01-10T12:00:00Z".parse().unwrap();
        let key = service.generate(&dj, &slot_id, start, end);

        let slot = Slot {
            id: slot_id.clone(),
            dj_id: dj,
            dj_name: "D1".to_string(),
            start_time: start,
            end_time: end,
            duration: 60,
            status: SlotStatus::Scheduled,
            stream_key: Some(key.clone()),
            title: "set".to_string(),
            genre: String::new(),
            description: String::new(),
            is_relay: false,
            relay_source: None,
            created_at: clock.now(),
            updated_at: clock.now(),
            viewer_peak: 0,
            current_viewers: 0,
            total_views: 0,
            total_likes: 0,
            average_rating: 0.0,
            rating_count: 0,
            started_at: None,
            ended_at: None,
            cancelled_at: None,
            original_start_time: None,
            queued_after: None,
            went_live_at: None,
            end_reason: None,
            takeover_history: Vec::new(),
        };
        slots.put(&slot).await.unwrap();

        // 10:00 is 60 minutes early; the ingest window opens at 10:30.
        let result = service.validate(&key).await.unwrap();
        assert!(matches!(
            result,
            KeyValidation::Rejected(KeyRejection::TooEarly { minutes_until: 30 })
        ));

        // Exactly at window start: accepted, slot bumped to connecting.
        clock.set("2025-01-10T10:30:00Z".parse().unwrap());
        let result = service.validate(&key).await.unwrap();
        assert!(result.is_valid());
        let stored = slots.require(&slot_id).await.unwrap();
        assert_eq!(stored.status, SlotStatus::Connecting);

        // Past end + grace: expired.
        clock.set("2025-01-10T12:05:01Z".parse().unwrap());
        let result = service.validate(&key).await.unwrap();
        assert!(matches!(
            result,
            KeyValidation::Rejected(KeyRejection::Expired)
        ));

        // Unknown key.
        let result = service.validate("fwx_x_y_1z_abcdefabcdef").await.unwrap();
        assert!(matches!(
            result,
            KeyValidation::Rejected(KeyRejection::NotFound)
        ));
    }

    #[test]
    fn urls_follow_the_configured_bases() {
        let (service, _, _) = service_with_clock("2025-01-10T10:00:00Z");
        assert_eq!(
            service.rtmp_url("fwx_a_b_c_d"),
            "rtmp://localhost/live/fwx_a_b_c_d"
        );
        assert_eq!(
            service.hls_url("fwx_a_b_c_d"),
            "http://localhost:8088/hls/fwx_a_b_c_d/index.m3u8"
        );
        let fallbacks = service.hls_fallback_urls("fwx_a_b_c_d");
        assert!(fallbacks[0].ends_with("playlist.m3u8"));
        assert!(fallbacks[1].ends_with("chunklist.m3u8"));
    }
}
