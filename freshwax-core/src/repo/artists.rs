use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;

use crate::models::{ArtistProfile, DjAllowance, EventRequest, Subscription, UserId, UserUsage};
use crate::store::{collections, DocumentStore, Filter, Query};
use crate::{Error, Result};

/// Read side for artist profiles, subscriptions, allowance overrides,
/// usage counters, and approved event requests.
#[derive(Clone)]
pub struct ArtistRepository {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for ArtistRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtistRepository").finish()
    }
}

impl ArtistRepository {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn profile(&self, dj_id: &UserId) -> Result<Option<ArtistProfile>> {
        let doc = self.store.get(collections::ARTISTS, dj_id.as_str()).await?;
        doc.map(|d| serde_json::from_value(d).map_err(Error::from))
            .transpose()
    }

    /// Profile of an approved, unblocked DJ; `Forbidden` otherwise.
    pub async fn require_approved(&self, dj_id: &UserId) -> Result<ArtistProfile> {
        let profile = self
            .profile(dj_id)
            .await?
            .ok_or_else(|| Error::Forbidden("No artist profile".to_string()))?;
        if !profile.approved {
            return Err(Error::Forbidden("Artist is not approved".to_string()));
        }
        if profile.is_blocked() {
            return Err(Error::Forbidden("Artist is suspended or banned".to_string()));
        }
        Ok(profile)
    }

    pub async fn subscription(&self, user_id: &UserId) -> Result<Subscription> {
        let doc = self.store.get(collections::USERS, user_id.as_str()).await?;
        let Some(doc) = doc else {
            return Ok(Subscription::default());
        };
        match doc.get("subscription") {
            Some(sub) => Ok(serde_json::from_value(sub.clone())?),
            None => Ok(Subscription::default()),
        }
    }

    pub async fn allowance(&self, dj_id: &UserId) -> Result<Option<DjAllowance>> {
        let doc = self
            .store
            .get(collections::ALLOWANCES, dj_id.as_str())
            .await?;
        doc.map(|d| serde_json::from_value(d).map_err(Error::from))
            .transpose()
    }

    pub async fn set_allowance(&self, dj_id: &UserId, allowance: &DjAllowance) -> Result<()> {
        let doc = serde_json::to_value(allowance)?;
        self.store
            .set(collections::ALLOWANCES, dj_id.as_str(), &doc)
            .await
    }

    pub async fn delete_allowance(&self, dj_id: &UserId) -> Result<()> {
        self.store
            .delete(collections::ALLOWANCES, dj_id.as_str())
            .await
    }

    pub async fn list_allowances(&self) -> Result<Vec<(UserId, DjAllowance)>> {
        let docs = self
            .store
            .query(collections::ALLOWANCES, &Query::new())
            .await?;
        docs.into_iter()
            .map(|doc| {
                let allowance = doc.parse::<DjAllowance>()?;
                Ok((UserId::from_string(doc.key), allowance))
            })
            .collect()
    }

    pub async fn usage(&self, user_id: &UserId) -> Result<UserUsage> {
        let doc = self
            .store
            .get(collections::USER_USAGE, user_id.as_str())
            .await?;
        match doc {
            Some(d) => Ok(serde_json::from_value(d)?),
            None => Ok(UserUsage::default()),
        }
    }

    /// Add streamed minutes to today's counter, resetting first if the
    /// stored day is stale.
    pub async fn record_stream_minutes(
        &self,
        user_id: &UserId,
        minutes: i64,
        today: NaiveDate,
    ) -> Result<()> {
        let mut usage = self.usage(user_id).await?;
        let today_str = today.to_string();
        if usage.day_date != today_str {
            usage.day_date = today_str;
            usage.stream_minutes_today = 0;
        }
        usage.stream_minutes_today += minutes;
        let doc = serde_json::to_value(&usage)?;
        self.store
            .set(collections::USER_USAGE, user_id.as_str(), &doc)
            .await
    }

    /// Extra daily minutes granted by approved event requests for a date.
    pub async fn approved_event_minutes(
        &self,
        user_id: &UserId,
        date: NaiveDate,
    ) -> Result<i64> {
        let query = Query::new()
            .filter(Filter::Eq("userId", json!(user_id)))
            .filter(Filter::Eq("eventDate", json!(date.to_string())))
            .filter(Filter::Eq("approved", json!(true)));
        let docs = self
            .store
            .query(collections::EVENT_REQUESTS, &query)
            .await?;
        let mut minutes = 0;
        for doc in docs {
            let request = doc.parse::<EventRequest>()?;
            minutes += request.hours_requested * 60;
        }
        Ok(minutes)
    }
}
