// Ordered, case-insensitively de-duplicated list of tag names

use std::fmt;
use std::ops::Sub;

use serde::{Deserialize, Serialize};

use crate::config::tags;

/// Tag names pending for one taggable record.
///
/// Entries are trimmed and blank ones dropped. Comparison ignores ASCII case
/// only, the same folding the store applies, and the first spelling seen is
/// the one kept for storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TagList {
    names: Vec<String>,
}

impl TagList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from individual names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::new();
        for name in names {
            list.add(name.as_ref());
        }
        list
    }

    /// Parse a delimited string such as `music, "rock, roll", 'jazz'`.
    ///
    /// Entries wrapped in double or single quotes may contain the delimiter.
    pub fn parse(raw: &str, delimiter: &str) -> Self {
        Self::from_names(split_entries(raw, delimiter))
    }

    /// Add a name unless it is blank or already present (ignoring case).
    /// Returns whether the list changed.
    pub fn add(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.names.push(name.to_string());
        true
    }

    /// Remove a name, ignoring case. Returns whether the list changed.
    pub fn remove(&mut self, name: &str) -> bool {
        let needle = name.trim();
        let before = self.names.len();
        self.names.retain(|existing| !existing.eq_ignore_ascii_case(needle));
        self.names.len() != before
    }

    pub fn contains(&self, name: &str) -> bool {
        let needle = name.trim();
        self.names.iter().any(|existing| existing.eq_ignore_ascii_case(needle))
    }

    /// Names in `self` missing from `other`, in `self`'s order
    pub fn difference(&self, other: &TagList) -> TagList {
        TagList {
            names: self
                .names
                .iter()
                .filter(|name| !other.contains(name))
                .cloned()
                .collect(),
        }
    }

    /// Join with `delimiter`, quoting entries that contain it
    pub fn to_delimited(&self, delimiter: &str) -> String {
        let sep = effective_separator(delimiter);
        self.names
            .iter()
            .map(|name| {
                if !sep.is_empty() && name.contains(sep) {
                    let quote = if name.contains('"') { '\'' } else { '"' };
                    format!("{quote}{name}{quote}")
                } else {
                    name.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(delimiter)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Apply `f` to every entry, re-normalizing the result
    pub fn map_names(&self, f: impl Fn(&str) -> String) -> TagList {
        TagList::from_names(self.names.iter().map(|name| f(name)))
    }
}

impl<S: AsRef<str>> FromIterator<S> for TagList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_names(iter)
    }
}

impl From<Vec<String>> for TagList {
    fn from(names: Vec<String>) -> Self {
        Self::from_names(names)
    }
}

impl From<TagList> for Vec<String> {
    fn from(list: TagList) -> Self {
        list.names
    }
}

impl Sub for &TagList {
    type Output = TagList;

    fn sub(self, other: &TagList) -> TagList {
        self.difference(other)
    }
}

impl fmt::Display for TagList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_delimited(tags::DEFAULT_DELIMITER))
    }
}

fn effective_separator(delimiter: &str) -> &str {
    let core = delimiter.trim();
    if core.is_empty() {
        delimiter
    } else {
        core
    }
}

fn split_entries(raw: &str, delimiter: &str) -> Vec<String> {
    let sep = effective_separator(delimiter);
    if sep.is_empty() {
        return vec![raw.to_string()];
    }

    let mut entries = Vec::new();
    let mut rest = raw;
    loop {
        let trimmed = rest.trim_start();
        if let Some(quote) = trimmed.chars().next().filter(|c| *c == '"' || *c == '\'') {
            if let Some(close) = trimmed[1..].find(quote) {
                entries.push(trimmed[1..1 + close].to_string());
                // text after the closing quote is scanned as a following entry
                rest = &trimmed[close + 2..];
                continue;
            }
        }

        match rest.find(sep) {
            Some(i) => {
                entries.push(rest[..i].to_string());
                rest = &rest[i + sep.len()..];
            }
            None => {
                entries.push(rest.to_string());
                break;
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drops_blank_entries() {
        let list = TagList::parse("music,  , rock,,jazz ", ", ");
        assert_eq!(list.names(), &["music", "rock", "jazz"]);
    }

    #[test]
    fn test_parse_empty_string() {
        assert!(TagList::parse("", ", ").is_empty());
        assert!(TagList::parse("   ", ", ").is_empty());
    }

    #[test]
    fn test_dedup_keeps_first_spelling() {
        let list = TagList::from_names(["Music", "music", " MUSIC ", "rock"]);
        assert_eq!(list.names(), &["Music", "rock"]);
    }

    #[test]
    fn test_parse_quoted_entries() {
        let list = TagList::parse(r#"music, "rock, roll", 'blues, delta', jazz"#, ", ");
        assert_eq!(list.names(), &["music", "rock, roll", "blues, delta", "jazz"]);
    }

    #[test]
    fn test_parse_keeps_text_after_closing_quote() {
        let list = TagList::parse(r#""rock, roll"x, jazz"#, ", ");
        assert_eq!(list.names(), &["rock, roll", "x", "jazz"]);

        let list = TagList::parse(r#""rock, roll" , jazz"#, ", ");
        assert_eq!(list.names(), &["rock, roll", "jazz"]);
    }

    #[test]
    fn test_contains_ignores_case() {
        let list = TagList::from_names(["Music:Cajun"]);
        assert!(list.contains("music:cajun"));
        assert!(list.contains(" MUSIC:CAJUN "));
        assert!(!list.contains("music"));
    }

    #[test]
    fn test_case_folding_is_ascii_only() {
        let list = TagList::from_names(["Über", "über", "MUSIC", "music"]);
        assert_eq!(list.names(), &["Über", "über", "MUSIC"]);
        assert!(list.contains("über"));
        assert!(!list.contains("ÜBER"));

        let mut list = list;
        assert!(!list.remove("ÜBER"));
        assert!(list.remove("Music"));
        assert_eq!(list.names(), &["Über", "über"]);
    }

    #[test]
    fn test_difference() {
        let a = TagList::from_names(["music", "Rock", "jazz"]);
        let b = TagList::from_names(["rock"]);
        assert_eq!((&a - &b).names(), &["music", "jazz"]);
        assert!(a.difference(&a).is_empty());
        assert_eq!(a.difference(&TagList::new()), a);
    }

    #[test]
    fn test_add_and_remove() {
        let mut list = TagList::new();
        assert!(list.add("music"));
        assert!(!list.add("MUSIC"));
        assert!(!list.add("  "));
        assert!(list.remove("Music"));
        assert!(!list.remove("music"));
        assert!(list.is_empty());
    }

    #[test]
    fn test_serialize_quotes_entries_containing_delimiter() {
        let list = TagList::from_names(["music", "rock, roll"]);
        assert_eq!(list.to_delimited(", "), r#"music, "rock, roll""#);
        assert_eq!(list.to_string(), r#"music, "rock, roll""#);

        let with_quote = TagList::from_names([r#"say "hi", now"#]);
        assert_eq!(with_quote.to_delimited(", "), r#"'say "hi", now'"#);
    }

    #[test]
    fn test_serialize_round_trip() {
        let list = TagList::from_names(["music:cajun", "rock, roll", "jazz", "food > gumbo"]);
        for delimiter in [", ", ",", " | ", ";"] {
            let restored = TagList::parse(&list.to_delimited(delimiter), delimiter);
            assert_eq!(restored, list, "delimiter {delimiter:?}");
        }
    }

    #[test]
    fn test_serde_as_string_array() {
        let list = TagList::from_names(["music", "rock"]);
        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(json, r#"["music","rock"]"#);

        let restored: TagList = serde_json::from_str(r#"["a", " A ", "", "b"]"#).unwrap();
        assert_eq!(restored.names(), &["a", "b"]);
    }

    #[test]
    fn test_map_names() {
        let list = TagList::from_names(["music : rock", "music:rock", "jazz"]);
        let mapped = list.map_names(|name| name.replace(" : ", ":"));
        assert_eq!(mapped.names(), &["music:rock", "jazz"]);
    }
}
