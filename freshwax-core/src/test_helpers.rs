//! In-process test harness: every service over the memory store, the
//! local event bus, and a manual clock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::bootstrap::Services;
use crate::clock::{Clock, ManualClock};
use crate::config::Config;
use crate::models::UserId;
use crate::pubsub::LocalBus;
use crate::service::RateLimiter;
use crate::store::{collections, DocumentStore, MemoryStore};

pub struct TestHarness {
    pub services: Services,
    pub store: Arc<MemoryStore>,
    pub bus: Arc<LocalBus>,
    pub clock: ManualClock,
    pub config: Config,
}

impl TestHarness {
    /// Build the full stack at a fixed instant.
    #[must_use]
    pub fn at(now: &str) -> Self {
        Self::with_config(now, Config::default())
    }

    #[must_use]
    pub fn with_config(now: &str, mut config: Config) -> Self {
        if config.ingest.signing_secret.is_empty() {
            config.ingest.signing_secret = "test-signing-secret".to_string();
        }
        if config.ingest.webhook_secret.is_empty() {
            config.ingest.webhook_secret = "test-webhook-secret".to_string();
        }

        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(LocalBus::default());
        let clock = ManualClock::new(now.parse().expect("valid RFC 3339 instant"));
        let services = Services::build(
            &config,
            store.clone(),
            bus.clone(),
            Arc::new(clock.clone()),
            RateLimiter::in_memory(),
        )
        .expect("services build");

        Self {
            services,
            store,
            bus,
            clock,
            config,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Seed an approved artist profile.
    pub async fn seed_artist(&self, dj_id: &str, name: &str) -> UserId {
        self.store
            .set(
                collections::ARTISTS,
                dj_id,
                &json!({ "artistName": name, "approved": true }),
            )
            .await
            .expect("seed artist");
        UserId::from_string(dj_id.to_string())
    }

    /// Seed an approved artist with an active Pro subscription.
    pub async fn seed_pro_artist(&self, dj_id: &str, name: &str) -> UserId {
        let id = self.seed_artist(dj_id, name).await;
        let expires = self.now() + chrono::Duration::days(30);
        self.store
            .set(
                collections::USERS,
                dj_id,
                &json!({ "subscription": { "tier": "pro", "expiresAt": expires } }),
            )
            .await
            .expect("seed subscription");
        id
    }
}
