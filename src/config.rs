// Configuration for namespaced tagging
// Constants are grouped by concern; runtime settings live in TaggingConfig

use serde::{Deserialize, Serialize};

use crate::errors::TaggingResult;

/// Tag-related configuration constants
pub mod tags {
    /// Separator between namespace and short name ("music:cajun")
    pub const DEFAULT_NAMESPACE_SEPARATOR: &str = ":";

    /// Delimiter used when a tag list is stored as one string
    pub const DEFAULT_DELIMITER: &str = ", ";

    /// Column on a taggable table holding the serialized tag list
    pub const DEFAULT_CACHED_TAG_LIST_COLUMN: &str = "cached_tag_list";

    /// Attempts made by find-or-create before giving up on a racing store
    pub const MAX_CREATE_ATTEMPTS: usize = 3;
}

/// Database schema constants
pub mod database {
    /// Tags table name
    pub const TAGS_TABLE: &str = "tags";

    /// Taggings junction table name
    pub const TAGGINGS_TABLE: &str = "taggings";

    /// Text layout of every stored timestamp (UTC, fixed width so text order is time order)
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

    /// Savepoint wrapping a unit of work that runs inside a caller's transaction
    pub const SAVEPOINT_NAME: &str = "tagging_unit";
}

/// Runtime settings shared by every component.
///
/// Passed by reference into each repository and service; changing the
/// separator only affects later parse/format calls, never stored rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    pub namespace_separator: String,
    pub delimiter: String,
    pub cached_tag_list_column: String,
    pub destroy_unused: bool,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            namespace_separator: tags::DEFAULT_NAMESPACE_SEPARATOR.to_string(),
            delimiter: tags::DEFAULT_DELIMITER.to_string(),
            cached_tag_list_column: tags::DEFAULT_CACHED_TAG_LIST_COLUMN.to_string(),
            destroy_unused: false,
        }
    }
}

impl TaggingConfig {
    /// Load settings from a JSON document; missing fields keep their defaults.
    pub fn from_json(raw: &str) -> TaggingResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.namespace_separator = separator.into();
        self
    }

    pub fn with_destroy_unused(mut self, destroy_unused: bool) -> Self {
        self.destroy_unused = destroy_unused;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TaggingConfig::default();
        assert_eq!(config.namespace_separator, ":");
        assert_eq!(config.delimiter, ", ");
        assert_eq!(config.cached_tag_list_column, "cached_tag_list");
        assert!(!config.destroy_unused);
    }

    #[test]
    fn test_from_json_partial() {
        let config = TaggingConfig::from_json(r#"{"namespace_separator": " > ", "destroy_unused": true}"#)
            .expect("Failed to parse config");
        assert_eq!(config.namespace_separator, " > ");
        assert!(config.destroy_unused);
        assert_eq!(config.delimiter, ", ");
    }

    #[test]
    fn test_from_json_invalid() {
        let result = TaggingConfig::from_json("{not json");
        assert!(result.is_err());
    }
}
