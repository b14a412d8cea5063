// TaggingRepository - rows linking tags to taggable records

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::config::database::{TAGGINGS_TABLE, TAGS_TABLE};
use crate::database::{timestamp_value, Tag, TaggableKind, Tagging};
use crate::errors::TaggingResult;

/// Operations on taggings
pub trait TaggingRepository {
    fn add(&self, kind: &TaggableKind, taggable_id: i64, tag_id: i64) -> TaggingResult<Tagging>;
    fn add_at(
        &self,
        kind: &TaggableKind,
        taggable_id: i64,
        tag_id: i64,
        created_at: DateTime<Utc>,
    ) -> TaggingResult<Tagging>;
    fn remove(&self, kind: &TaggableKind, taggable_id: i64, tag_id: i64) -> TaggingResult<usize>;
    fn remove_all_for(&self, kind: &TaggableKind, taggable_id: i64) -> TaggingResult<Vec<i64>>;
    fn tags_for(&self, kind: &TaggableKind, taggable_id: i64) -> TaggingResult<Vec<Tag>>;
    fn taggings_for_tag(&self, tag_id: i64) -> TaggingResult<Vec<Tagging>>;
    fn count_for_tag(&self, tag_id: i64) -> TaggingResult<i64>;
}

/// SQLite implementation of TaggingRepository
pub struct SqliteTaggingRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteTaggingRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl<'a> TaggingRepository for SqliteTaggingRepository<'a> {
    fn add(&self, kind: &TaggableKind, taggable_id: i64, tag_id: i64) -> TaggingResult<Tagging> {
        self.add_at(kind, taggable_id, tag_id, Utc::now())
    }

    /// Insert a tagging; a duplicate (tag, record) pair is an error
    fn add_at(
        &self,
        kind: &TaggableKind,
        taggable_id: i64,
        tag_id: i64,
        created_at: DateTime<Utc>,
    ) -> TaggingResult<Tagging> {
        self.conn.execute(
            &format!(
                "INSERT INTO {TAGGINGS_TABLE} (tag_id, taggable_id, taggable_type, created_at)
                 VALUES (?1, ?2, ?3, ?4)"
            ),
            params![tag_id, taggable_id, kind.type_name, timestamp_value(&created_at)],
        )?;

        Ok(Tagging {
            id: Some(self.conn.last_insert_rowid()),
            tag_id,
            taggable_id,
            taggable_type: kind.type_name.to_string(),
            created_at: Some(created_at),
        })
    }

    fn remove(&self, kind: &TaggableKind, taggable_id: i64, tag_id: i64) -> TaggingResult<usize> {
        let affected_rows = self.conn.execute(
            &format!(
                "DELETE FROM {TAGGINGS_TABLE}
                 WHERE tag_id = ?1 AND taggable_id = ?2 AND taggable_type = ?3"
            ),
            params![tag_id, taggable_id, kind.type_name],
        )?;
        Ok(affected_rows)
    }

    /// Remove every tagging of one record, returning the tag ids that were detached
    fn remove_all_for(&self, kind: &TaggableKind, taggable_id: i64) -> TaggingResult<Vec<i64>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT tag_id FROM {TAGGINGS_TABLE}
             WHERE taggable_id = ?1 AND taggable_type = ?2"
        ))?;
        let tag_id_iter = stmt.query_map(params![taggable_id, kind.type_name], |row| row.get(0))?;

        let mut tag_ids = Vec::new();
        for tag_id in tag_id_iter {
            tag_ids.push(tag_id?);
        }

        self.conn.execute(
            &format!("DELETE FROM {TAGGINGS_TABLE} WHERE taggable_id = ?1 AND taggable_type = ?2"),
            params![taggable_id, kind.type_name],
        )?;

        Ok(tag_ids)
    }

    /// Distinct tags of one record, in the order they were attached
    fn tags_for(&self, kind: &TaggableKind, taggable_id: i64) -> TaggingResult<Vec<Tag>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT t.id, t.namespace, t.short_name, t.created_at
             FROM {TAGS_TABLE} t
             INNER JOIN {TAGGINGS_TABLE} tg ON t.id = tg.tag_id
             WHERE tg.taggable_id = ?1 AND tg.taggable_type = ?2
             GROUP BY t.id
             ORDER BY MIN(tg.id) ASC"
        ))?;

        let tag_iter = stmt.query_map(params![taggable_id, kind.type_name], Tag::from_row)?;

        let mut tags = Vec::new();
        for tag in tag_iter {
            tags.push(tag?);
        }
        Ok(tags)
    }

    fn taggings_for_tag(&self, tag_id: i64) -> TaggingResult<Vec<Tagging>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, tag_id, taggable_id, taggable_type, created_at
             FROM {TAGGINGS_TABLE} WHERE tag_id = ?1 ORDER BY id ASC"
        ))?;

        let tagging_iter = stmt.query_map([tag_id], Tagging::from_row)?;

        let mut taggings = Vec::new();
        for tagging in tagging_iter {
            taggings.push(tagging?);
        }
        Ok(taggings)
    }

    fn count_for_tag(&self, tag_id: i64) -> TaggingResult<i64> {
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {TAGGINGS_TABLE} WHERE tag_id = ?1"),
            [tag_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::{create_photo, create_post, create_test_db, Photo, Post};
    use crate::database::Taggable;
    use crate::errors::{is_unique_violation, TaggingError};

    fn create_test_tag(conn: &Connection, namespace: &str, short_name: Option<&str>) -> i64 {
        conn.execute(
            "INSERT INTO tags (namespace, short_name) VALUES (?1, ?2)",
            params![namespace, short_name],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn test_add_and_remove_tagging() {
        let (_db_file, conn) = create_test_db();
        let repo = SqliteTaggingRepository::new(&conn);

        let post = create_post(&conn, "first");
        let tag_id = create_test_tag(&conn, "music", Some("cajun"));

        let tagging = repo
            .add(&Post::KIND, post.id, tag_id)
            .expect("Failed to add tagging");
        assert_eq!(tagging.taggable_type, "Post");
        assert_eq!(repo.count_for_tag(tag_id).unwrap(), 1);

        let tags = repo.tags_for(&Post::KIND, post.id).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name(":"), "music:cajun");

        let removed = repo.remove(&Post::KIND, post.id, tag_id).unwrap();
        assert_eq!(removed, 1);
        assert!(repo.tags_for(&Post::KIND, post.id).unwrap().is_empty());
        assert_eq!(repo.count_for_tag(tag_id).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_tagging_is_rejected() {
        let (_db_file, conn) = create_test_db();
        let repo = SqliteTaggingRepository::new(&conn);

        let post = create_post(&conn, "first");
        let tag_id = create_test_tag(&conn, "music", None);

        repo.add(&Post::KIND, post.id, tag_id).unwrap();
        let err = repo.add(&Post::KIND, post.id, tag_id).unwrap_err();
        match err {
            TaggingError::Database(db_err) => assert!(is_unique_violation(&db_err)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_taggings_are_partitioned_by_type() {
        let (_db_file, conn) = create_test_db();
        let repo = SqliteTaggingRepository::new(&conn);

        let post = create_post(&conn, "post");
        let photo = create_photo(&conn, "photo");
        assert_eq!(post.id, photo.id);

        let tag_id = create_test_tag(&conn, "sky", None);
        repo.add(&Post::KIND, post.id, tag_id).unwrap();
        repo.add(&Photo::KIND, photo.id, tag_id).unwrap();

        assert_eq!(repo.count_for_tag(tag_id).unwrap(), 2);
        assert_eq!(repo.remove(&Photo::KIND, photo.id, tag_id).unwrap(), 1);
        assert_eq!(repo.tags_for(&Post::KIND, post.id).unwrap().len(), 1);
        assert!(repo.tags_for(&Photo::KIND, photo.id).unwrap().is_empty());
    }

    #[test]
    fn test_tags_for_keeps_attach_order() {
        let (_db_file, conn) = create_test_db();
        let repo = SqliteTaggingRepository::new(&conn);

        let post = create_post(&conn, "post");
        let zebra = create_test_tag(&conn, "zebra", None);
        let apple = create_test_tag(&conn, "apple", None);
        repo.add(&Post::KIND, post.id, zebra).unwrap();
        repo.add(&Post::KIND, post.id, apple).unwrap();

        let names: Vec<String> = repo
            .tags_for(&Post::KIND, post.id)
            .unwrap()
            .iter()
            .map(|tag| tag.name(":"))
            .collect();
        assert_eq!(names, vec!["zebra", "apple"]);
    }

    #[test]
    fn test_remove_all_for() {
        let (_db_file, conn) = create_test_db();
        let repo = SqliteTaggingRepository::new(&conn);

        let post = create_post(&conn, "post");
        let other = create_post(&conn, "other");
        let a = create_test_tag(&conn, "a", None);
        let b = create_test_tag(&conn, "b", None);
        repo.add(&Post::KIND, post.id, a).unwrap();
        repo.add(&Post::KIND, post.id, b).unwrap();
        repo.add(&Post::KIND, other.id, a).unwrap();

        let mut removed = repo.remove_all_for(&Post::KIND, post.id).unwrap();
        removed.sort();
        assert_eq!(removed, vec![a, b]);
        assert!(repo.tags_for(&Post::KIND, post.id).unwrap().is_empty());
        assert_eq!(repo.taggings_for_tag(a).unwrap().len(), 1);
    }
}
