//! Service composition
//!
//! Wires repositories and services over whichever store, publisher, and
//! clock the caller provides. The HTTP binary feeds this the configured
//! production adapters; tests feed it the in-memory ones.

use std::sync::Arc;

use crate::cache::ScheduleCache;
use crate::clock::Clock;
use crate::config::Config;
use crate::oembed::MetadataFetcher;
use crate::pubsub::EventPublisher;
use crate::repo::{
    ArtistRepository, CleanupRepository, LiveRepository, PlaylistRepository, ReactionRepository,
    SlotRepository,
};
use crate::service::{
    ChatCleanupService, LiveSessionService, PlaylistCoordinator, RateLimiter, ReactionService,
    SlotScheduler, StreamKeyService,
};
use crate::store::DocumentStore;
use crate::Result;

/// Every service the HTTP surface needs, fully wired.
#[derive(Clone, Debug)]
pub struct Services {
    pub scheduler: SlotScheduler,
    pub session: LiveSessionService,
    pub reactions: ReactionService,
    pub playlist: PlaylistCoordinator,
    pub credentials: StreamKeyService,
    pub cleanup: ChatCleanupService,
    pub rate_limiter: RateLimiter,
}

impl Services {
    pub fn build(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        rate_limiter: RateLimiter,
    ) -> Result<Self> {
        let slots = SlotRepository::new(store.clone());
        let artists = ArtistRepository::new(store.clone());
        let live = LiveRepository::new(store.clone());
        let reactions_repo = ReactionRepository::new(store.clone());
        let playlist_repo = PlaylistRepository::new(store.clone());
        let cleanup_repo = CleanupRepository::new(store);

        let credentials = StreamKeyService::new(
            config.ingest.clone(),
            slots.clone(),
            artists.clone(),
            clock.clone(),
        );
        let cache = ScheduleCache::new();

        let scheduler = SlotScheduler::new(
            slots.clone(),
            artists.clone(),
            live.clone(),
            reactions_repo.clone(),
            credentials.clone(),
            publisher.clone(),
            cache.clone(),
            clock.clone(),
            config.quota.clone(),
            config.features.clone(),
            config.ingest.clone(),
        );
        let session = LiveSessionService::new(
            slots.clone(),
            artists,
            live.clone(),
            reactions_repo.clone(),
            credentials.clone(),
            publisher.clone(),
            cache,
            clock.clone(),
            config.ingest.clone(),
        );
        let reactions = ReactionService::new(
            slots,
            reactions_repo,
            live,
            publisher.clone(),
            clock.clone(),
        );
        let playlist = PlaylistCoordinator::new(
            playlist_repo,
            MetadataFetcher::new(config.playlist.metadata_timeout_secs)?,
            publisher,
            clock.clone(),
            config.playlist.clone(),
        );
        let cleanup = ChatCleanupService::new(cleanup_repo, clock);

        Ok(Self {
            scheduler,
            session,
            reactions,
            playlist,
            credentials,
            cleanup,
            rate_limiter,
        })
    }
}
