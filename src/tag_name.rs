// Namespace-aware tag name parsing and formatting

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A tag name split into namespace and optional short name.
///
/// "music:cajun" is namespace "music", short name "cajun". "music" alone is
/// a bare name: namespace "music" with no short name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagName {
    pub namespace: String,
    pub short_name: Option<String>,
}

impl TagName {
    pub fn new(namespace: impl Into<String>, short_name: Option<String>) -> Self {
        let short_name = short_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self {
            namespace: namespace.into().trim().to_string(),
            short_name,
        }
    }

    /// Split `raw` on the first occurrence of `separator`.
    ///
    /// Whitespace around the separator is optional, so " > " also splits
    /// "food>cajun". Never fails: anything that does not split cleanly is
    /// returned whole as a bare namespace.
    pub fn parse(raw: &str, separator: &str) -> Self {
        let trimmed = raw.trim();

        if let Some(found) = separator_regex(separator).and_then(|re| re.find(trimmed)) {
            let namespace = trimmed[..found.start()].trim();
            let short_name = trimmed[found.end()..].trim();
            if !namespace.is_empty() && !short_name.is_empty() {
                return Self {
                    namespace: namespace.to_string(),
                    short_name: Some(short_name.to_string()),
                };
            }
        }

        Self {
            namespace: trimmed.to_string(),
            short_name: None,
        }
    }

    /// Join the non-blank parts with `separator`
    pub fn format(&self, separator: &str) -> String {
        format_name(&self.namespace, self.short_name.as_deref(), separator)
    }

    /// A bare name carries no short name and matches a whole namespace
    pub fn is_bare(&self) -> bool {
        self.short_name.is_none()
    }

    /// (namespace, short name) folded the way the store compares them (ASCII case)
    pub fn folded(&self) -> (String, Option<String>) {
        (
            self.namespace.to_ascii_lowercase(),
            self.short_name.as_ref().map(|s| s.to_ascii_lowercase()),
        )
    }
}

/// Join namespace and short name, skipping blank parts
pub fn format_name(namespace: &str, short_name: Option<&str>, separator: &str) -> String {
    [Some(namespace), short_name]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Re-render a raw name in canonical form ("music : rock" -> "music:rock")
pub fn canonicalize(raw: &str, separator: &str) -> String {
    TagName::parse(raw, separator).format(separator)
}

fn separator_regex(separator: &str) -> Option<Regex> {
    if separator.is_empty() {
        return None;
    }

    let core = separator.trim();
    let pattern = if core.is_empty() {
        // whitespace-only separator: any run of whitespace splits
        r"\s+".to_string()
    } else {
        format!(r"\s*{}\s*", regex::escape(core))
    };

    Regex::new(&pattern).ok()
}
