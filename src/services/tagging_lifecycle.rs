// Cleanup that follows the removal of a tagging

use log::{debug, info};
use rusqlite::Connection;

use crate::config::database::TAGS_TABLE;
use crate::config::TaggingConfig;
use crate::database::{in_transaction, TaggableKind};
use crate::errors::TaggingResult;
use crate::repositories::tagging_repository::{SqliteTaggingRepository, TaggingRepository};

/// Applies the "destroy unused tags" policy
pub struct TaggingLifecycle<'a> {
    config: &'a TaggingConfig,
}

impl<'a> TaggingLifecycle<'a> {
    pub fn new(config: &'a TaggingConfig) -> Self {
        Self { config }
    }

    /// Call after a tagging of `tag_id` was deleted, on the connection (or
    /// transaction) that deleted it. Deletes the tag when the policy is on and
    /// no taggings remain. Returns whether the tag was deleted.
    pub fn after_tagging_removed(&self, conn: &Connection, tag_id: i64) -> TaggingResult<bool> {
        if !self.config.destroy_unused {
            return Ok(false);
        }

        let remaining = SqliteTaggingRepository::new(conn).count_for_tag(tag_id)?;
        if remaining > 0 {
            debug!("Tag {tag_id} still has {remaining} tagging(s), keeping it");
            return Ok(false);
        }

        let deleted = conn.execute(&format!("DELETE FROM {TAGS_TABLE} WHERE id = ?1"), [tag_id])? > 0;
        if deleted {
            info!("Destroyed unused tag {tag_id}");
        }
        Ok(deleted)
    }

    /// Remove one tagging and run the cleanup in the same transaction.
    /// Returns whether a tagging was removed.
    pub fn remove_tagging(
        &self,
        conn: &Connection,
        kind: &TaggableKind,
        taggable_id: i64,
        tag_id: i64,
    ) -> TaggingResult<bool> {
        in_transaction(conn, |conn| {
            let removed = SqliteTaggingRepository::new(conn).remove(kind, taggable_id, tag_id)? > 0;
            if removed {
                self.after_tagging_removed(conn, tag_id)?;
            }
            Ok(removed)
        })
    }
}
