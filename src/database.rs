use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::types::Value;
use rusqlite::{Connection, Result, Row, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::config::database::{SAVEPOINT_NAME, TAGGINGS_TABLE, TAGS_TABLE, TIMESTAMP_FORMAT};
use crate::errors::TaggingResult;
use crate::tag_name::format_name;

/// A stored tag: a namespace with an optional short name
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Tag {
    pub id: Option<i64>,
    pub namespace: String,
    pub short_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Tag {
    /// Full name in namespace notation ("music:cajun", or "music" alone)
    pub fn name(&self, separator: &str) -> String {
        format_name(&self.namespace, self.short_name.as_deref(), separator)
    }

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Tag {
            id: Some(row.get(0)?),
            namespace: row.get(1)?,
            short_name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

/// Two tags are equal when they denote the same name
impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.short_name == other.short_name
    }
}

impl Eq for Tag {}

/// Join row linking one tag to one taggable record
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Tagging {
    pub id: Option<i64>,
    pub tag_id: i64,
    pub taggable_id: i64,
    pub taggable_type: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Tagging {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Tagging {
            id: Some(row.get(0)?),
            tag_id: row.get(1)?,
            taggable_id: row.get(2)?,
            taggable_type: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

/// One row of a tag frequency query
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TagCount {
    pub id: i64,
    pub namespace: String,
    pub short_name: Option<String>,
    pub count: i64,
}

impl TagCount {
    pub fn name(&self, separator: &str) -> String {
        format_name(&self.namespace, self.short_name.as_deref(), separator)
    }

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(TagCount {
            id: row.get(0)?,
            namespace: row.get(1)?,
            short_name: row.get(2)?,
            count: row.get(3)?,
        })
    }
}

/// Describes one kind of taggable record.
///
/// `type_name` is the discriminator stored in `taggings.taggable_type`;
/// `table` and `primary_key` are used to join the host table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggableKind {
    pub type_name: &'static str,
    pub table: &'static str,
    pub primary_key: &'static str,
    /// The host table has a cached tag list column
    pub caches_tag_list: bool,
}

impl TaggableKind {
    pub const fn new(type_name: &'static str, table: &'static str) -> Self {
        Self {
            type_name,
            table,
            primary_key: "id",
            caches_tag_list: false,
        }
    }

    pub const fn with_cached_tag_list(mut self) -> Self {
        self.caches_tag_list = true;
        self
    }
}

/// Identity contract for records that can carry tags
pub trait Taggable {
    const KIND: TaggableKind;

    fn taggable_id(&self) -> i64;

    /// Current value of the cached tag list column, if the host loaded one
    fn cached_tag_list(&self) -> Option<&str> {
        None
    }
}

/// Timestamp in the stored text layout
pub fn timestamp_value(at: &DateTime<Utc>) -> Value {
    Value::Text(at.format(TIMESTAMP_FORMAT).to_string())
}

/// Run `work` as one atomic unit on `conn`.
///
/// On a connection in autocommit mode this is an IMMEDIATE transaction, so
/// concurrent writers wait on the busy handler instead of failing mid-way.
/// Inside a caller's transaction it is a savepoint: an error rolls back only
/// this unit and leaves the outer transaction usable.
pub fn in_transaction<T, F>(conn: &Connection, work: F) -> TaggingResult<T>
where
    F: FnOnce(&Connection) -> TaggingResult<T>,
{
    if conn.is_autocommit() {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let value = work(&tx)?;
        tx.commit()?;
        return Ok(value);
    }

    conn.execute_batch(&format!("SAVEPOINT {SAVEPOINT_NAME}"))?;
    match work(conn) {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {SAVEPOINT_NAME}"))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = conn.execute_batch(&format!(
                "ROLLBACK TO {SAVEPOINT_NAME}; RELEASE {SAVEPOINT_NAME}"
            )) {
                warn!("Failed to roll back savepoint {SAVEPOINT_NAME}: {rollback_err}");
            }
            Err(err)
        }
    }
}

/// Create the tags and taggings tables and their indexes
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {TAGS_TABLE} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            namespace TEXT NOT NULL CHECK (trim(namespace) <> ''),
            short_name TEXT CHECK (short_name IS NULL OR short_name <> ''),
            created_at TEXT
        );

        CREATE UNIQUE INDEX IF NOT EXISTS index_tags_on_namespace_and_short_name
            ON {TAGS_TABLE} (namespace COLLATE NOCASE, IFNULL(short_name, '') COLLATE NOCASE);

        CREATE INDEX IF NOT EXISTS index_tags_on_namespace
            ON {TAGS_TABLE} (namespace);

        CREATE TABLE IF NOT EXISTS {TAGGINGS_TABLE} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tag_id INTEGER NOT NULL,
            taggable_id INTEGER NOT NULL,
            taggable_type TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY (tag_id) REFERENCES {TAGS_TABLE} (id) ON DELETE CASCADE,
            UNIQUE (tag_id, taggable_id, taggable_type)
        );

        CREATE INDEX IF NOT EXISTS index_taggings_on_tag_id
            ON {TAGGINGS_TABLE} (tag_id);

        CREATE INDEX IF NOT EXISTS index_taggings_on_taggable_id_and_taggable_type
            ON {TAGGINGS_TABLE} (taggable_id, taggable_type);

        PRAGMA foreign_keys = ON;"
    ))
}
