// Reconciles a taggable record's desired tag list with its stored taggings

use anyhow::anyhow;
use log::{debug, warn};
use rusqlite::{params, Connection};

use crate::config::TaggingConfig;
use crate::database::{in_transaction, TagCount, Taggable, TaggableKind};
use crate::errors::{TaggingError, TaggingResult};
use crate::query_builder::TagCountOptions;
use crate::repositories::tag_repository::{SqliteTagRepository, TagRepository};
use crate::repositories::taggable_repository::{SqliteTaggableRepository, TaggableRepository};
use crate::repositories::tagging_repository::{SqliteTaggingRepository, TaggingRepository};
use crate::services::tagging_lifecycle::TaggingLifecycle;
use crate::tag_list::TagList;
use crate::tag_name::canonicalize;
use crate::tag_validator::validate_identifier;

/// Per-instance tag list state held by the host record.
///
/// Empty until the tag list is read or assigned; only a loaded slot is
/// synced on save.
#[derive(Debug, Clone, Default)]
pub struct TagListSlot {
    tag_list: Option<TagList>,
}

impl TagListSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, tag_list: TagList) {
        self.tag_list = Some(tag_list);
    }

    pub fn get(&self) -> Option<&TagList> {
        self.tag_list.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.tag_list.is_some()
    }

    /// Forget the loaded list, as after reloading the record
    pub fn reload(&mut self) {
        self.tag_list = None;
    }
}

/// Result of one save
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The tag list was never read or assigned
    Skipped,
    Committed {
        added: Vec<String>,
        removed: Vec<String>,
    },
}

pub struct TaggableSync<'a> {
    conn: &'a Connection,
    config: &'a TaggingConfig,
}

impl<'a> TaggableSync<'a> {
    pub fn new(conn: &'a Connection, config: &'a TaggingConfig) -> Self {
        Self { conn, config }
    }

    /// The record's tag list, loading it into `slot` on first access.
    ///
    /// A populated cached column wins over the taggings table.
    pub fn tag_list<'s, T: Taggable>(
        &self,
        record: &T,
        slot: &'s mut TagListSlot,
    ) -> TaggingResult<&'s TagList> {
        let tag_list = match slot.tag_list.take() {
            Some(tag_list) => tag_list,
            None => self.load_tag_list(record)?,
        };
        Ok(slot.tag_list.insert(tag_list))
    }

    /// Assign a delimited tag list, e.g. `music:cajun, "rock, roll"`
    pub fn set_tag_list(&self, slot: &mut TagListSlot, raw: &str) {
        slot.set(TagList::parse(raw, &self.config.delimiter));
    }

    fn load_tag_list<T: Taggable>(&self, record: &T) -> TaggingResult<TagList> {
        if T::KIND.caches_tag_list {
            if let Some(cached) = record.cached_tag_list() {
                debug!("Using cached tag list for {} {}", T::KIND.type_name, record.taggable_id());
                return Ok(TagList::parse(cached, &self.config.delimiter));
            }
        }

        let separator = &self.config.namespace_separator;
        let tags = SqliteTaggingRepository::new(self.conn).tags_for(&T::KIND, record.taggable_id())?;
        Ok(tags.iter().map(|tag| tag.name(separator)).collect())
    }

    /// Persist the slot's tag list for `record`.
    ///
    /// Skipped when the slot was never loaded. Otherwise obsolete taggings are
    /// removed, missing tags are found or created and attached, and the cached
    /// column is rewritten, all in one transaction. On a connection that is
    /// already inside a transaction the work joins it through a savepoint.
    pub fn save<T: Taggable>(&self, record: &T, slot: &TagListSlot) -> TaggingResult<SyncOutcome> {
        let Some(desired) = slot.get() else {
            debug!(
                "Tag list of {} {} untouched, skipping sync",
                T::KIND.type_name,
                record.taggable_id()
            );
            return Ok(SyncOutcome::Skipped);
        };

        in_transaction(self.conn, |conn| self.sync_tags(conn, &T::KIND, record.taggable_id(), desired))
            .map_err(|err| {
                warn!(
                    "Tag sync for {} {} rolled back: {}",
                    T::KIND.type_name,
                    record.taggable_id(),
                    err
                );
                TaggingError::transaction_failed("Tag sync", err)
            })
    }

    fn sync_tags(
        &self,
        conn: &Connection,
        kind: &TaggableKind,
        taggable_id: i64,
        desired: &TagList,
    ) -> TaggingResult<SyncOutcome> {
        let separator = &self.config.namespace_separator;
        let desired = desired.map_names(|name| canonicalize(name, separator));

        let tags = SqliteTagRepository::new(conn, self.config);
        let taggings = SqliteTaggingRepository::new(conn);
        let lifecycle = TaggingLifecycle::new(self.config);

        let current = taggings.tags_for(kind, taggable_id)?;
        let current_names: TagList = current.iter().map(|tag| tag.name(separator)).collect();
        let to_add = &desired - &current_names;
        debug!(
            "Diffed tags of {} {}: {} to add, {} to keep",
            kind.type_name,
            taggable_id,
            to_add.len(),
            current_names.len()
        );

        let mut removed = Vec::new();
        for tag in current.iter().filter(|tag| !desired.contains(&tag.name(separator))) {
            let Some(tag_id) = tag.id else { continue };
            taggings.remove(kind, taggable_id, tag_id)?;
            lifecycle.after_tagging_removed(conn, tag_id)?;
            removed.push(tag.name(separator));
        }

        let mut added = Vec::new();
        for name in to_add.iter() {
            let tag = tags.find_or_create_by_name(name)?;
            let tag_id = tag
                .id
                .ok_or_else(|| anyhow!("Tag \"{name}\" was stored without an id"))?;
            taggings.add(kind, taggable_id, tag_id)?;
            added.push(name.to_string());
        }

        if kind.caches_tag_list {
            self.write_cached_tag_list(conn, kind, taggable_id, &desired)?;
        }

        debug!(
            "Persisted tags of {} {}: +{} -{}",
            kind.type_name,
            taggable_id,
            added.len(),
            removed.len()
        );
        Ok(SyncOutcome::Committed { added, removed })
    }

    fn write_cached_tag_list(
        &self,
        conn: &Connection,
        kind: &TaggableKind,
        taggable_id: i64,
        tag_list: &TagList,
    ) -> TaggingResult<()> {
        let column = &self.config.cached_tag_list_column;
        validate_identifier("table", kind.table)?;
        validate_identifier("primary_key", kind.primary_key)?;
        validate_identifier("cached_tag_list_column", column)?;

        conn.execute(
            &format!(
                "UPDATE {} SET {column} = ?1 WHERE {} = ?2",
                kind.table, kind.primary_key
            ),
            params![tag_list.to_delimited(&self.config.delimiter), taggable_id],
        )?;
        Ok(())
    }

    /// Drop every tagging of a destroyed record, running the unused-tag
    /// cleanup for each detached tag. Returns the number of tags detached.
    pub fn destroy_taggings<T: Taggable>(&self, record: &T) -> TaggingResult<usize> {
        in_transaction(self.conn, |conn| self.remove_taggings(conn, &T::KIND, record.taggable_id()))
            .map_err(|err| TaggingError::transaction_failed("Tagging cleanup", err))
    }

    fn remove_taggings(
        &self,
        conn: &Connection,
        kind: &TaggableKind,
        taggable_id: i64,
    ) -> TaggingResult<usize> {
        let lifecycle = TaggingLifecycle::new(self.config);

        let tag_ids = SqliteTaggingRepository::new(conn).remove_all_for(kind, taggable_id)?;
        for tag_id in &tag_ids {
            lifecycle.after_tagging_removed(conn, *tag_id)?;
        }

        debug!(
            "Removed {} tagging(s) of {} {}",
            tag_ids.len(),
            kind.type_name,
            taggable_id
        );
        Ok(tag_ids.len())
    }

    /// Frequency of this record's tags across all records of its kind
    pub fn tag_counts<T: Taggable>(
        &self,
        record: &T,
        slot: &mut TagListSlot,
        options: &TagCountOptions,
    ) -> TaggingResult<Vec<TagCount>> {
        let tag_list = self.tag_list(record, slot)?;
        SqliteTaggableRepository::new(self.conn, self.config).tag_counts_for(&T::KIND, tag_list, options)
    }
}
