// Builds tag-matching predicates, tagged-with queries and tag frequency queries

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::types::Value;

use crate::config::database::{TAGGINGS_TABLE, TAGS_TABLE};
use crate::config::TaggingConfig;
use crate::database::{timestamp_value, TaggableKind};
use crate::errors::{TaggingError, TaggingResult};
use crate::query::{like_literal, text, Predicate, QuerySpec};
use crate::tag_list::TagList;
use crate::tag_name::TagName;

/// How requested tags are matched against a record's tags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// Records carrying at least one of the tags
    #[default]
    Any,
    /// Records carrying every one of the tags (qualified names only)
    All,
    /// Records carrying none of the tags
    Exclude,
}

#[derive(Debug, Clone, Default)]
pub struct FindTaggedOptions {
    pub mode: MatchMode,
    /// Extra caller conditions, ANDed into the final filter
    pub conditions: Option<Predicate>,
}

impl FindTaggedOptions {
    pub fn mode(mode: MatchMode) -> Self {
        Self {
            mode,
            conditions: None,
        }
    }
}

/// Whitelisted orderings for tag frequency rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCountOrder {
    CountDesc,
    CountAsc,
    NameAsc,
    NewestTagging,
}

impl TagCountOrder {
    fn sql(&self) -> String {
        match self {
            TagCountOrder::CountDesc => {
                format!("count DESC, {TAGS_TABLE}.namespace ASC, {TAGS_TABLE}.short_name ASC")
            }
            TagCountOrder::CountAsc => {
                format!("count ASC, {TAGS_TABLE}.namespace ASC, {TAGS_TABLE}.short_name ASC")
            }
            TagCountOrder::NameAsc => {
                format!("{TAGS_TABLE}.namespace ASC, {TAGS_TABLE}.short_name ASC")
            }
            TagCountOrder::NewestTagging => format!("MAX({TAGGINGS_TABLE}.created_at) DESC"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TagCountOptions {
    /// Only count taggings created at or after this time
    pub start_at: Option<DateTime<Utc>>,
    /// Only count taggings created at or before this time
    pub end_at: Option<DateTime<Utc>>,
    pub at_least: Option<i64>,
    pub at_most: Option<i64>,
    pub conditions: Option<Predicate>,
    pub order: Option<TagCountOrder>,
    pub limit: Option<i64>,
}

pub struct TagQueryBuilder<'a> {
    config: &'a TaggingConfig,
}

impl<'a> TagQueryBuilder<'a> {
    pub fn new(config: &'a TaggingConfig) -> Self {
        Self { config }
    }

    /// Predicate over `table_alias` matching any of `tags`.
    ///
    /// A qualified name matches its exact row; a bare name matches every row
    /// in its namespace, which covers the namespace-only row and all children.
    /// Comparison is case-insensitive.
    pub fn match_predicate(&self, tags: &TagList, table_alias: &str) -> Predicate {
        let clauses = tags.iter().map(|raw| {
            let name = TagName::parse(raw, &self.config.namespace_separator);
            match name.short_name {
                Some(short_name) => Predicate::new(
                    format!(
                        "({table_alias}.namespace LIKE ? ESCAPE '\\' AND {table_alias}.short_name LIKE ? ESCAPE '\\')"
                    ),
                    vec![text(like_literal(&name.namespace)), text(like_literal(&short_name))],
                ),
                None => Predicate::new(
                    format!("{table_alias}.namespace LIKE ? ESCAPE '\\'"),
                    vec![text(like_literal(&name.namespace))],
                ),
            }
        });

        Predicate::or_all(clauses).unwrap_or_else(|| Predicate::raw("(1 = 0)"))
    }

    /// Query selecting records of `kind` tagged with `tags`.
    ///
    /// Returns the no-op spec when `tags` is empty. Match-all rejects bare
    /// names, since one bare name can match many rows and the count would lie.
    pub fn find_tagged_with(
        &self,
        kind: &TaggableKind,
        tags: &TagList,
        options: &FindTaggedOptions,
    ) -> TaggingResult<QuerySpec> {
        if tags.is_empty() {
            return Ok(QuerySpec::none());
        }

        let spec = match options.mode {
            MatchMode::Any => self.match_any(kind, tags),
            MatchMode::Exclude => self.exclude(kind, tags),
            MatchMode::All => self.match_all(kind, tags)?,
        }
        .filter_opt(options.conditions.clone());

        debug!(
            "Built {:?} tagged-with query for {} over {} tag(s)",
            options.mode,
            kind.type_name,
            tags.len()
        );
        Ok(spec)
    }

    fn match_any(&self, kind: &TaggableKind, tags: &TagList) -> QuerySpec {
        let table = kind.table;
        let pk = kind.primary_key;
        let taggings_alias = format!("{table}_taggings");
        let tags_alias = format!("{table}_tags");

        QuerySpec::new(format!("DISTINCT {table}.*"), table)
            .join(Predicate::new(
                format!(
                    "INNER JOIN {TAGGINGS_TABLE} {taggings_alias} ON {taggings_alias}.taggable_id = {table}.{pk} AND {taggings_alias}.taggable_type = ?"
                ),
                vec![text(kind.type_name)],
            ))
            .join(Predicate::raw(format!(
                "INNER JOIN {TAGS_TABLE} {tags_alias} ON {tags_alias}.id = {taggings_alias}.tag_id"
            )))
            .filter(self.match_predicate(tags, &tags_alias))
    }

    fn exclude(&self, kind: &TaggableKind, tags: &TagList) -> QuerySpec {
        let table = kind.table;
        let pk = kind.primary_key;
        let matched = self.match_predicate(tags, TAGS_TABLE);

        let mut params = matched.params().to_vec();
        params.push(text(kind.type_name));

        QuerySpec::new(format!("{table}.*"), table).filter(Predicate::new(
            format!(
                "{table}.{pk} NOT IN (SELECT {TAGGINGS_TABLE}.taggable_id FROM {TAGGINGS_TABLE} \
                 INNER JOIN {TAGS_TABLE} ON {TAGGINGS_TABLE}.tag_id = {TAGS_TABLE}.id \
                 WHERE {} AND {TAGGINGS_TABLE}.taggable_type = ?)",
                matched.sql()
            ),
            params,
        ))
    }

    fn match_all(&self, kind: &TaggableKind, tags: &TagList) -> TaggingResult<QuerySpec> {
        let names: Vec<TagName> = tags
            .iter()
            .map(|raw| TagName::parse(raw, &self.config.namespace_separator))
            .collect();

        if let Some(bare) = names.iter().find(|name| name.is_bare()) {
            return Err(TaggingError::unsupported(format!(
                "match-all cannot be combined with the bare namespace tag \"{}\"",
                bare.namespace
            )));
        }

        let required = names.iter().map(TagName::folded).collect::<HashSet<_>>().len();

        let table = kind.table;
        let pk = kind.primary_key;
        let taggings_alias = format!("{table}_taggings");
        let tags_alias = format!("{table}_tags");
        let matched = self.match_predicate(tags, &tags_alias);

        let mut params = vec![text(kind.type_name)];
        params.extend_from_slice(matched.params());
        params.push(Value::Integer(required as i64));

        Ok(QuerySpec::new(format!("{table}.*"), table).filter(Predicate::new(
            format!(
                "(SELECT COUNT(DISTINCT {tags_alias}.id) FROM {TAGGINGS_TABLE} {taggings_alias} \
                 INNER JOIN {TAGS_TABLE} {tags_alias} ON {tags_alias}.id = {taggings_alias}.tag_id \
                 WHERE {taggings_alias}.taggable_id = {table}.{pk} \
                 AND {taggings_alias}.taggable_type = ? AND {}) = ?",
                matched.sql()
            ),
            params,
        )))
    }

    /// Tag frequency query for records of `kind`: one row per tag with
    /// (id, namespace, short_name, count)
    pub fn tag_counts(&self, kind: &TaggableKind, options: &TagCountOptions) -> QuerySpec {
        let table = kind.table;
        let pk = kind.primary_key;

        let mut spec = QuerySpec::new(
            format!("{TAGS_TABLE}.id, {TAGS_TABLE}.namespace, {TAGS_TABLE}.short_name, COUNT(*) AS count"),
            TAGS_TABLE,
        )
        .join(Predicate::raw(format!(
            "INNER JOIN {TAGGINGS_TABLE} ON {TAGS_TABLE}.id = {TAGGINGS_TABLE}.tag_id"
        )))
        .join(Predicate::raw(format!(
            "INNER JOIN {table} ON {table}.{pk} = {TAGGINGS_TABLE}.taggable_id"
        )))
        .filter(Predicate::new(
            format!("{TAGGINGS_TABLE}.taggable_type = ?"),
            vec![text(kind.type_name)],
        ))
        .filter_opt(options.conditions.clone())
        .filter_opt(options.start_at.as_ref().map(|at| {
            Predicate::new(
                format!("{TAGGINGS_TABLE}.created_at >= ?"),
                vec![timestamp_value(at)],
            )
        }))
        .filter_opt(options.end_at.as_ref().map(|at| {
            Predicate::new(
                format!("{TAGGINGS_TABLE}.created_at <= ?"),
                vec![timestamp_value(at)],
            )
        }));

        spec.group_by = vec![
            format!("{TAGS_TABLE}.id"),
            format!("{TAGS_TABLE}.namespace"),
            format!("{TAGS_TABLE}.short_name"),
        ];

        spec.having.push(Predicate::raw("COUNT(*) > 0"));
        if let Some(at_least) = options.at_least {
            spec.having
                .push(Predicate::new("COUNT(*) >= ?", vec![Value::Integer(at_least)]));
        }
        if let Some(at_most) = options.at_most {
            spec.having
                .push(Predicate::new("COUNT(*) <= ?", vec![Value::Integer(at_most)]));
        }

        spec.order_by = options.order.map(|order| order.sql());
        spec.limit = options.limit;
        spec
    }

    /// Frequency rows restricted to the tags matched by `name`
    pub fn count_for_tag(&self, name: &str, kind: &TaggableKind) -> QuerySpec {
        let options = TagCountOptions {
            conditions: Some(self.match_predicate(&TagList::from_names([name]), TAGS_TABLE)),
            ..TagCountOptions::default()
        };
        self.tag_counts(kind, &options)
    }

    /// Frequency rows for the tags in one record's list, counted across all
    /// records of `kind`. `options.conditions` is replaced by the list's predicate.
    pub fn tag_counts_for_list(
        &self,
        kind: &TaggableKind,
        tags: &TagList,
        options: &TagCountOptions,
    ) -> QuerySpec {
        if tags.is_empty() {
            return QuerySpec::none();
        }

        let options = TagCountOptions {
            conditions: Some(self.match_predicate(tags, TAGS_TABLE)),
            ..options.clone()
        };
        self.tag_counts(kind, &options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST: TaggableKind = TaggableKind::new("Post", "posts");

    #[test]
    fn test_match_predicate_bare_and_qualified() {
        let config = TaggingConfig::default();
        let builder = TagQueryBuilder::new(&config);

        let predicate = builder.match_predicate(&TagList::from_names(["music", "food:cajun"]), "t");
        assert_eq!(
            predicate.sql(),
            "(t.namespace LIKE ? ESCAPE '\\' OR (t.namespace LIKE ? ESCAPE '\\' AND t.short_name LIKE ? ESCAPE '\\'))"
        );
        assert_eq!(
            predicate.params(),
            &[text("music"), text("food"), text("cajun")]
        );
    }

    #[test]
    fn test_match_predicate_escapes_wildcards() {
        let config = TaggingConfig::default();
        let builder = TagQueryBuilder::new(&config);

        let predicate = builder.match_predicate(&TagList::from_names(["100%"]), "t");
        assert_eq!(predicate.params(), &[text("100\\%")]);
    }

    #[test]
    fn test_match_predicate_uses_configured_separator() {
        let config = TaggingConfig::default().with_separator(" > ");
        let builder = TagQueryBuilder::new(&config);

        let predicate = builder.match_predicate(&TagList::from_names(["food>cajun"]), "t");
        assert_eq!(predicate.params(), &[text("food"), text("cajun")]);
    }

    #[test]
    fn test_find_tagged_with_empty_tags_is_noop() {
        let config = TaggingConfig::default();
        let builder = TagQueryBuilder::new(&config);

        for mode in [MatchMode::Any, MatchMode::All, MatchMode::Exclude] {
            let spec = builder
                .find_tagged_with(&POST, &TagList::new(), &FindTaggedOptions::mode(mode))
                .unwrap();
            assert!(spec.is_none());
        }
    }

    #[test]
    fn test_find_tagged_with_any_shape() {
        let config = TaggingConfig::default();
        let builder = TagQueryBuilder::new(&config);

        let spec = builder
            .find_tagged_with(&POST, &TagList::from_names(["music"]), &FindTaggedOptions::default())
            .unwrap();
        let (sql, params) = spec.to_sql();
        assert!(sql.starts_with("SELECT DISTINCT posts.* FROM posts INNER JOIN taggings posts_taggings"));
        assert!(sql.contains("posts_taggings.taggable_type = ?"));
        assert_eq!(params, vec![text("Post"), text("music")]);
    }

    #[test]
    fn test_find_tagged_with_exclude_params_follow_placeholders() {
        let config = TaggingConfig::default();
        let builder = TagQueryBuilder::new(&config);

        let options = FindTaggedOptions {
            mode: MatchMode::Exclude,
            conditions: Some(Predicate::new("posts.title <> ?", vec![text("draft")])),
        };
        let spec = builder
            .find_tagged_with(&POST, &TagList::from_names(["music:rock"]), &options)
            .unwrap();
        let (sql, params) = spec.to_sql();
        assert!(sql.contains("posts.id NOT IN (SELECT taggings.taggable_id"));
        assert!(sql.ends_with("AND posts.title <> ?"));
        assert_eq!(
            params,
            vec![text("music"), text("rock"), text("Post"), text("draft")]
        );
    }

    #[test]
    fn test_find_tagged_with_match_all_rejects_bare_tags() {
        let config = TaggingConfig::default();
        let builder = TagQueryBuilder::new(&config);

        let result = builder.find_tagged_with(
            &POST,
            &TagList::from_names(["music:rock", "food"]),
            &FindTaggedOptions::mode(MatchMode::All),
        );
        assert!(matches!(result, Err(TaggingError::UnsupportedOperation(_))));
    }

    #[test]
    fn test_find_tagged_with_match_all_counts_distinct_identities() {
        let config = TaggingConfig::default();
        let builder = TagQueryBuilder::new(&config);

        let spec = builder
            .find_tagged_with(
                &POST,
                &TagList::from_names(["music:rock", "music : rock", "food:cajun"]),
                &FindTaggedOptions::mode(MatchMode::All),
            )
            .unwrap();
        let (_sql, params) = spec.to_sql();
        assert_eq!(params.last(), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_tag_counts_shape() {
        let config = TaggingConfig::default();
        let builder = TagQueryBuilder::new(&config);

        let options = TagCountOptions {
            at_least: Some(2),
            at_most: Some(10),
            order: Some(TagCountOrder::CountDesc),
            limit: Some(5),
            ..TagCountOptions::default()
        };
        let (sql, params) = builder.tag_counts(&POST, &options).to_sql();
        assert!(sql.contains("GROUP BY tags.id, tags.namespace, tags.short_name"));
        assert!(sql.contains("HAVING COUNT(*) > 0 AND COUNT(*) >= ? AND COUNT(*) <= ?"));
        assert!(sql.contains("ORDER BY count DESC"));
        assert_eq!(
            params,
            vec![text("Post"), Value::Integer(2), Value::Integer(10), Value::Integer(5)]
        );
    }

    #[test]
    fn test_tag_counts_for_empty_list_is_noop() {
        let config = TaggingConfig::default();
        let builder = TagQueryBuilder::new(&config);
        assert!(builder
            .tag_counts_for_list(&POST, &TagList::new(), &TagCountOptions::default())
            .is_none());
    }
}
