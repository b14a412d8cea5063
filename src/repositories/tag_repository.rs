// TagRepository - lookup, creation, renaming and merging of tags

use anyhow::anyhow;
use chrono::Utc;
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::database::{TAGGINGS_TABLE, TAGS_TABLE};
use crate::config::{tags, TaggingConfig};
use crate::database::{in_transaction, timestamp_value, Tag};
use crate::errors::{is_unique_violation, TaggingError, TaggingResult};
use crate::query::{like_literal, text, Predicate, QuerySpec};
use crate::tag_name::TagName;
use crate::tag_validator::validate_tag_name;

const TAG_COLUMNS: &str = "id, namespace, short_name, created_at";

/// Operations on tags
pub trait TagRepository {
    fn create(&self, name: &str) -> TaggingResult<Tag>;
    fn find_by_id(&self, id: i64) -> TaggingResult<Option<Tag>>;
    fn find_by_name(&self, name: &str) -> TaggingResult<Option<Tag>>;
    fn find_all_by_name(&self, name: &str) -> TaggingResult<Vec<Tag>>;
    fn find_all(&self) -> TaggingResult<Vec<Tag>>;
    fn find_or_create_by_name(&self, name: &str) -> TaggingResult<Tag>;
    fn namespaces(&self) -> TaggingResult<Vec<String>>;
    fn rename(&self, tag_id: i64, new_name: &str) -> TaggingResult<Tag>;
    fn delete(&self, tag_id: i64) -> TaggingResult<bool>;
    fn merge(&self, source: &Tag, target_name: &str) -> TaggingResult<Tag>;
}

/// SQLite implementation of TagRepository
pub struct SqliteTagRepository<'a> {
    conn: &'a Connection,
    config: &'a TaggingConfig,
}

impl<'a> SqliteTagRepository<'a> {
    pub fn new(conn: &'a Connection, config: &'a TaggingConfig) -> Self {
        Self { conn, config }
    }

    fn parse(&self, name: &str) -> TagName {
        TagName::parse(name, &self.config.namespace_separator)
    }

    /// Exact-name lookup, ignoring case. A bare name only matches the
    /// namespace-only row, never its qualified children.
    fn find_where_name(&self, name: &TagName) -> TaggingResult<Vec<Tag>> {
        let condition = match &name.short_name {
            Some(short_name) => Predicate::new(
                "namespace LIKE ? ESCAPE '\\' AND short_name LIKE ? ESCAPE '\\'",
                vec![text(like_literal(&name.namespace)), text(like_literal(short_name))],
            ),
            None => Predicate::new(
                "namespace LIKE ? ESCAPE '\\' AND short_name IS NULL",
                vec![text(like_literal(&name.namespace))],
            ),
        };

        let mut spec = QuerySpec::new(TAG_COLUMNS, TAGS_TABLE).filter(condition);
        spec.order_by = Some("id ASC".to_string());
        Ok(spec.query_map(self.conn, Tag::from_row)?)
    }

    fn insert(&self, name: &TagName) -> rusqlite::Result<Tag> {
        let created_at = Utc::now();
        self.conn.execute(
            &format!("INSERT INTO {TAGS_TABLE} (namespace, short_name, created_at) VALUES (?1, ?2, ?3)"),
            params![name.namespace, name.short_name, timestamp_value(&created_at)],
        )?;

        Ok(Tag {
            id: Some(self.conn.last_insert_rowid()),
            namespace: name.namespace.clone(),
            short_name: name.short_name.clone(),
            created_at: Some(created_at),
        })
    }

    fn taken(&self) -> TaggingError {
        TaggingError::validation("name", "is taken.")
    }

    fn repoint_taggings(conn: &Connection, source_id: i64, target_id: i64) -> TaggingResult<()> {
        let mut stmt = conn.prepare(&format!(
            "SELECT id FROM {TAGGINGS_TABLE} WHERE tag_id = ?1 ORDER BY id ASC"
        ))?;
        let id_iter = stmt.query_map([source_id], |row| row.get::<_, i64>(0))?;

        let mut tagging_ids = Vec::new();
        for id in id_iter {
            tagging_ids.push(id?);
        }

        let mut repointed = 0;
        let mut dropped = 0;
        for tagging_id in tagging_ids {
            let updated = conn.execute(
                &format!("UPDATE {TAGGINGS_TABLE} SET tag_id = ?1 WHERE id = ?2"),
                params![target_id, tagging_id],
            );
            match updated {
                Ok(_) => repointed += 1,
                // the record already carries the target tag
                Err(err) if is_unique_violation(&err) => {
                    conn.execute(
                        &format!("DELETE FROM {TAGGINGS_TABLE} WHERE id = ?1"),
                        [tagging_id],
                    )?;
                    dropped += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        debug!("Repointed {repointed} tagging(s), dropped {dropped} duplicate(s)");
        Ok(())
    }

    fn merge_in_transaction(&self, source: &Tag, target_name: &str) -> TaggingResult<Option<Tag>> {
        let source_id = source
            .id
            .ok_or_else(|| TaggingError::validation("id", "source tag has not been saved"))?;

        in_transaction(self.conn, |conn| {
            let repo = SqliteTagRepository::new(conn, self.config);

            let target = match repo.find_by_name(target_name)? {
                Some(target) if target.id != Some(source_id) => target,
                _ => return Ok(None),
            };
            let target_id = target
                .id
                .ok_or_else(|| anyhow!("Stored tag is missing its id"))?;

            Self::repoint_taggings(conn, source_id, target_id)?;
            conn.execute(&format!("DELETE FROM {TAGS_TABLE} WHERE id = ?1"), [source_id])?;

            Ok(Some(target))
        })
    }
}

impl<'a> TagRepository for SqliteTagRepository<'a> {
    /// Create a tag, rejecting blank or already-taken names
    fn create(&self, name: &str) -> TaggingResult<Tag> {
        let parsed = self.parse(name);
        validate_tag_name(&parsed)?;

        if !self.find_where_name(&parsed)?.is_empty() {
            return Err(self.taken());
        }

        self.insert(&parsed).map_err(|err| {
            if is_unique_violation(&err) {
                self.taken()
            } else {
                err.into()
            }
        })
    }

    fn find_by_id(&self, id: i64) -> TaggingResult<Option<Tag>> {
        let tag = self
            .conn
            .query_row(
                &format!("SELECT {TAG_COLUMNS} FROM {TAGS_TABLE} WHERE id = ?1"),
                [id],
                Tag::from_row,
            )
            .optional()?;
        Ok(tag)
    }

    fn find_by_name(&self, name: &str) -> TaggingResult<Option<Tag>> {
        Ok(self.find_all_by_name(name)?.into_iter().next())
    }

    fn find_all_by_name(&self, name: &str) -> TaggingResult<Vec<Tag>> {
        self.find_where_name(&self.parse(name))
    }

    fn find_all(&self) -> TaggingResult<Vec<Tag>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TAG_COLUMNS} FROM {TAGS_TABLE}
             ORDER BY namespace ASC, short_name ASC"
        ))?;

        let tag_iter = stmt.query_map([], Tag::from_row)?;

        let mut tags = Vec::new();
        for tag in tag_iter {
            tags.push(tag?);
        }
        Ok(tags)
    }

    /// Return the tag named `name`, creating it when unseen.
    ///
    /// A concurrent writer may create the same name between our lookup and
    /// insert; the unique index rejects our insert and we re-fetch theirs.
    fn find_or_create_by_name(&self, name: &str) -> TaggingResult<Tag> {
        let parsed = self.parse(name);
        validate_tag_name(&parsed)?;

        for attempt in 1..=tags::MAX_CREATE_ATTEMPTS {
            if let Some(existing) = self.find_where_name(&parsed)?.into_iter().next() {
                return Ok(existing);
            }

            match self.insert(&parsed) {
                Ok(tag) => {
                    debug!("Created tag {}", tag.name(&self.config.namespace_separator));
                    return Ok(tag);
                }
                Err(err) if is_unique_violation(&err) => {
                    warn!("Tag \"{name}\" was created concurrently (attempt {attempt}), re-fetching");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(anyhow!(
            "Tag \"{name}\" could not be found or created after {} attempts",
            tags::MAX_CREATE_ATTEMPTS
        )
        .into())
    }

    /// Distinct namespaces, ascending
    fn namespaces(&self) -> TaggingResult<Vec<String>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT namespace FROM {TAGS_TABLE}
             WHERE namespace IS NOT NULL ORDER BY namespace ASC"
        ))?;

        let namespace_iter = stmt.query_map([], |row| row.get(0))?;

        let mut namespaces = Vec::new();
        for namespace in namespace_iter {
            namespaces.push(namespace?);
        }
        Ok(namespaces)
    }

    fn rename(&self, tag_id: i64, new_name: &str) -> TaggingResult<Tag> {
        let parsed = self.parse(new_name);
        validate_tag_name(&parsed)?;

        let clash = self
            .find_where_name(&parsed)?
            .into_iter()
            .any(|existing| existing.id != Some(tag_id));
        if clash {
            return Err(self.taken());
        }

        let updated = self
            .conn
            .execute(
                &format!("UPDATE {TAGS_TABLE} SET namespace = ?1, short_name = ?2 WHERE id = ?3"),
                params![parsed.namespace, parsed.short_name, tag_id],
            )
            .map_err(|err| {
                if is_unique_violation(&err) {
                    self.taken()
                } else {
                    TaggingError::from(err)
                }
            })?;

        if updated == 0 {
            return Err(TaggingError::Database(rusqlite::Error::QueryReturnedNoRows));
        }

        self.find_by_id(tag_id)?
            .ok_or_else(|| anyhow!("Failed to retrieve renamed tag").into())
    }

    /// Delete a tag together with its taggings
    fn delete(&self, tag_id: i64) -> TaggingResult<bool> {
        in_transaction(self.conn, |conn| {
            conn.execute(
                &format!("DELETE FROM {TAGGINGS_TABLE} WHERE tag_id = ?1"),
                [tag_id],
            )?;
            let deleted = conn.execute(&format!("DELETE FROM {TAGS_TABLE} WHERE id = ?1"), [tag_id])?;
            Ok(deleted > 0)
        })
    }

    /// Fold `source` into the tag named `target_name`.
    ///
    /// All of source's taggings move to the target (a record that already
    /// has the target keeps a single tagging), then source is deleted, in
    /// one transaction. When no distinct target exists, source is returned
    /// unchanged.
    fn merge(&self, source: &Tag, target_name: &str) -> TaggingResult<Tag> {
        let merged = self
            .merge_in_transaction(source, target_name)
            .map_err(|err| TaggingError::transaction_failed("Tag merge", err))?;

        let separator = &self.config.namespace_separator;
        match merged {
            Some(target) => {
                info!(
                    "Merged tag \"{}\" into \"{}\"",
                    source.name(separator),
                    target.name(separator)
                );
                Ok(target)
            }
            None => {
                debug!("Merge of \"{}\" had no distinct target", source.name(separator));
                Ok(source.clone())
            }
        }
    }
}
