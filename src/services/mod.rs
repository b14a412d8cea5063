// Service layer: multi-step tagging workflows built on the repositories

pub mod tag_sync;
pub mod tagging_lifecycle;

pub use tag_sync::{SyncOutcome, TagListSlot, TaggableSync};
pub use tagging_lifecycle::TaggingLifecycle;
