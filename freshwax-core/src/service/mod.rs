//! Domain services: the five subsystems plus the cross-cutting rate
//! limiter and the cleanup job runner.

pub mod cleanup;
pub mod credentials;
pub mod playlist;
pub mod rate_limit;
pub mod reactions;
pub mod scheduler;
pub mod session;

pub use cleanup::ChatCleanupService;
pub use credentials::{
    extract_stream_key, KeyRejection, KeyValidation, StreamKeyService,
};
pub use playlist::PlaylistCoordinator;
pub use rate_limit::{RateLimiter, PRESENCE_RULE, REACTION_RULE};
pub use reactions::ReactionService;
pub use scheduler::{BookRequest, BookedSlot, GoLiveRequest, SlotScheduler, StreamKeyAccess};
pub use session::{IngestEvent, IngestEventKind, LiveSessionService};
