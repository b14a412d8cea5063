// TaggableRepository - runs tagged-with and tag frequency queries

use rusqlite::{Connection, Row};

use crate::config::TaggingConfig;
use crate::database::{TagCount, TaggableKind};
use crate::errors::TaggingResult;
use crate::query_builder::{FindTaggedOptions, TagCountOptions, TagQueryBuilder};
use crate::tag_list::TagList;

/// Read-side queries over taggable records
pub trait TaggableRepository {
    fn find_tagged_ids(
        &self,
        kind: &TaggableKind,
        tags: &TagList,
        options: &FindTaggedOptions,
    ) -> TaggingResult<Vec<i64>>;
    fn tag_counts(&self, kind: &TaggableKind, options: &TagCountOptions) -> TaggingResult<Vec<TagCount>>;
    fn count_for_tag(&self, name: &str, kind: &TaggableKind) -> TaggingResult<i64>;
    fn tag_counts_for(
        &self,
        kind: &TaggableKind,
        tags: &TagList,
        options: &TagCountOptions,
    ) -> TaggingResult<Vec<TagCount>>;
}

/// SQLite implementation of TaggableRepository
pub struct SqliteTaggableRepository<'a> {
    conn: &'a Connection,
    config: &'a TaggingConfig,
}

impl<'a> SqliteTaggableRepository<'a> {
    pub fn new(conn: &'a Connection, config: &'a TaggingConfig) -> Self {
        Self { conn, config }
    }

    fn builder(&self) -> TagQueryBuilder<'a> {
        TagQueryBuilder::new(self.config)
    }

    /// Records of `kind` tagged with `tags`, each row mapped by `map_row`.
    /// Empty `tags` yields no records.
    pub fn find_tagged_with<T, F>(
        &self,
        kind: &TaggableKind,
        tags: &TagList,
        options: &FindTaggedOptions,
        map_row: F,
    ) -> TaggingResult<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let spec = self.builder().find_tagged_with(kind, tags, options)?;
        Ok(spec.query_map(self.conn, map_row)?)
    }
}

impl<'a> TaggableRepository for SqliteTaggableRepository<'a> {
    fn find_tagged_ids(
        &self,
        kind: &TaggableKind,
        tags: &TagList,
        options: &FindTaggedOptions,
    ) -> TaggingResult<Vec<i64>> {
        let mut ids: Vec<i64> = self.find_tagged_with(kind, tags, options, |row| row.get(kind.primary_key))?;
        ids.sort_unstable();
        Ok(ids)
    }

    fn tag_counts(&self, kind: &TaggableKind, options: &TagCountOptions) -> TaggingResult<Vec<TagCount>> {
        let spec = self.builder().tag_counts(kind, options);
        Ok(spec.query_map(self.conn, TagCount::from_row)?)
    }

    /// Taggings matched by `name` (a bare name includes its children); 0 when none
    fn count_for_tag(&self, name: &str, kind: &TaggableKind) -> TaggingResult<i64> {
        let spec = self.builder().count_for_tag(name, kind);
        let counts = spec.query_map(self.conn, TagCount::from_row)?;
        Ok(counts.iter().map(|row| row.count).sum())
    }

    fn tag_counts_for(
        &self,
        kind: &TaggableKind,
        tags: &TagList,
        options: &TagCountOptions,
    ) -> TaggingResult<Vec<TagCount>> {
        let spec = self.builder().tag_counts_for_list(kind, tags, options);
        Ok(spec.query_map(self.conn, TagCount::from_row)?)
    }
}
