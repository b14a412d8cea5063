// Repository layer: SQLite-backed access to tags, taggings and taggable records

pub mod tag_repository;
pub mod taggable_repository;
pub mod tagging_repository;

pub use tag_repository::{SqliteTagRepository, TagRepository};
pub use taggable_repository::{SqliteTaggableRepository, TaggableRepository};
pub use tagging_repository::{SqliteTaggingRepository, TaggingRepository};
