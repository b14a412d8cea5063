//! Namespaced tagging for arbitrary records.
//!
//! Tags are either bare (`music`) or qualified (`music:cajun`). A bare tag
//! matches itself and every qualified child; a qualified tag matches only
//! itself. Records of any kind share one `tags`/`taggings` schema in SQLite.

pub mod config;
pub mod database;
pub mod errors;
pub mod query;
pub mod query_builder;
pub mod repositories;
pub mod services;
pub mod tag_list;
pub mod tag_name;
pub mod tag_validator;

pub use config::TaggingConfig;
pub use database::{initialize_schema, Tag, TagCount, Taggable, TaggableKind, Tagging};
pub use errors::{ErrorCategory, TaggingError, TaggingResult};
pub use query::{Predicate, QuerySpec};
pub use query_builder::{FindTaggedOptions, MatchMode, TagCountOptions, TagCountOrder, TagQueryBuilder};
pub use repositories::{
    SqliteTagRepository, SqliteTaggableRepository, SqliteTaggingRepository, TagRepository,
    TaggableRepository, TaggingRepository,
};
pub use services::{SyncOutcome, TagListSlot, TaggableSync, TaggingLifecycle};
pub use tag_list::TagList;
pub use tag_name::TagName;

/// Install the env_logger backend (filtered by `RUST_LOG`).
/// Later calls are ignored once a logger is set.
pub fn init_logging() {
    let _ = env_logger::builder().try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice() {
        init_logging();
        init_logging();
    }

    #[test]
    fn test_end_to_end_namespace_matching() {
        let (_db_file, conn) = database::test_support::create_test_db();
        let config = TaggingConfig::default();
        let sync = TaggableSync::new(&conn, &config);

        let cajun = database::test_support::create_post(&conn, "cajun");
        let rock = database::test_support::create_post(&conn, "rock");
        let mut slot = TagListSlot::new();
        sync.set_tag_list(&mut slot, "music:cajun");
        sync.save(&cajun, &slot).unwrap();
        sync.set_tag_list(&mut slot, "music:rock");
        sync.save(&rock, &slot).unwrap();

        let repo = SqliteTaggableRepository::new(&conn, &config);
        let post_kind = database::test_support::Post::KIND;
        let all = repo
            .find_tagged_ids(&post_kind, &TagList::from_names(["music"]), &FindTaggedOptions::default())
            .unwrap();
        assert_eq!(all, vec![cajun.id, rock.id]);
        assert_eq!(repo.count_for_tag("music", &post_kind).unwrap(), 2);
    }
}
