pub mod artist;
pub mod cleanup;
pub mod id;
pub mod live;
pub mod playlist;
pub mod reaction;
pub mod slot;

pub use artist::{ArtistProfile, DjAllowance, EventRequest, Subscription, SubscriptionTier, UserUsage};
pub use cleanup::{ChatCleanupJob, CleanupStatus};
pub use id::{generate_id, SessionId, SlotId, UserId};
pub use live::LiveStreamRecord;
pub use playlist::{
    GlobalPlaylist, PlayHistoryEntry, Platform, PlaylistItem, SYSTEM_USER, SYSTEM_USER_NAME,
};
pub use reaction::{
    EmojiReaction, ReactionRecord, ReactionType, Shoutout, StarReaction, ViewerSession,
};
pub use slot::{PublicSlot, RelaySource, Slot, SlotStatus, TakeoverRecord, ALLOWED_DURATIONS};
