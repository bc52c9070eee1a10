//! Typed collection accessors over the document store.
//!
//! Repositories own serialization and the collection-name constants;
//! services never touch raw documents.

mod artists;
mod cleanup;
mod live;
mod playlist;
mod reactions;
mod slots;

pub use artists::ArtistRepository;
pub use cleanup::CleanupRepository;
pub use live::LiveRepository;
pub use playlist::PlaylistRepository;
pub use reactions::ReactionRepository;
pub use slots::SlotRepository;
