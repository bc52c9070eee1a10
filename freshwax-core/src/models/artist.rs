//! Read-side records consulted by the scheduler: artist approval state,
//! subscriptions, per-DJ allowance overrides, usage counters, and approved
//! event requests.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::id::UserId;

/// DJ profile; unapproved DJs cannot book or go live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistProfile {
    pub artist_name: String,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub banned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Relay URLs an admin has approved for `start_relay`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub approved_relay_urls: Vec<String>,
}

impl ArtistProfile {
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        self.suspended || self.banned
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
}

/// External subscription record, read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default)]
    pub tier: SubscriptionTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Pro is active iff the tier is pro and the expiry is in the future.
    #[must_use]
    pub fn is_pro_active(&self, now: DateTime<Utc>) -> bool {
        self.tier == SubscriptionTier::Pro && self.expires_at.is_some_and(|exp| exp > now)
    }
}

/// Admin override of the default booking quotas for one DJ.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DjAllowance {
    /// 1..=14
    pub weekly_slots: u32,
    /// 1..=12
    pub max_hours_per_day: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DjAllowance {
    pub const WEEKLY_SLOTS_RANGE: std::ops::RangeInclusive<u32> = 1..=14;
    pub const MAX_HOURS_RANGE: std::ops::RangeInclusive<u32> = 1..=12;

    #[must_use]
    pub fn is_valid(&self) -> bool {
        Self::WEEKLY_SLOTS_RANGE.contains(&self.weekly_slots)
            && Self::MAX_HOURS_RANGE.contains(&self.max_hours_per_day)
    }
}

/// Daily/weekly usage counters. `stream_minutes_today` only counts when
/// `day_date` is the current day; stale records read as zero.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserUsage {
    #[serde(default)]
    pub stream_minutes_today: i64,
    #[serde(default)]
    pub day_date: String,
    #[serde(default)]
    pub mix_uploads_this_week: i64,
    #[serde(default)]
    pub week_start_date: String,
}

impl UserUsage {
    /// Minutes streamed today, honoring the day rollover.
    #[must_use]
    pub fn minutes_for_day(&self, day: NaiveDate) -> i64 {
        if self.day_date == day.to_string() {
            self.stream_minutes_today
        } else {
            0
        }
    }
}

/// An approved event request grants extra daily hours on a specific date.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    pub user_id: UserId,
    /// ISO date the event falls on.
    pub event_date: String,
    pub hours_requested: i64,
    #[serde(default)]
    pub approved: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pro_requires_unexpired_subscription() {
        let now: DateTime<Utc> = "2025-01-10T10:00:00Z".parse().unwrap();

        let active = Subscription {
            tier: SubscriptionTier::Pro,
            expires_at: Some("2025-02-01T00:00:00Z".parse().unwrap()),
        };
        assert!(active.is_pro_active(now));

        let expired = Subscription {
            tier: SubscriptionTier::Pro,
            expires_at: Some("2025-01-01T00:00:00Z".parse().unwrap()),
        };
        assert!(!expired.is_pro_active(now));

        let no_expiry = Subscription {
            tier: SubscriptionTier::Pro,
            expires_at: None,
        };
        assert!(!no_expiry.is_pro_active(now));

        assert!(!Subscription::default().is_pro_active(now));
    }

    #[test]
    fn usage_resets_on_day_rollover() {
        let usage = UserUsage {
            stream_minutes_today: 50,
            day_date: "2025-01-10".to_string(),
            ..Default::default()
        };
        assert_eq!(usage.minutes_for_day("2025-01-10".parse().unwrap()), 50);
        assert_eq!(usage.minutes_for_day("2025-01-11".parse().unwrap()), 0);
    }

    #[test]
    fn allowance_bounds() {
        let ok = DjAllowance {
            weekly_slots: 5,
            max_hours_per_day: 4,
            reason: None,
        };
        assert!(ok.is_valid());

        let bad = DjAllowance {
            weekly_slots: 0,
            max_hours_per_day: 13,
            reason: None,
        };
        assert!(!bad.is_valid());
    }
}
