// Validation for tag names and configured SQL identifiers

use crate::errors::{TaggingError, TaggingResult};
use crate::tag_name::TagName;

/// A tag needs a non-blank namespace
pub fn validate_tag_name(name: &TagName) -> TaggingResult<()> {
    if name.namespace.trim().is_empty() {
        return Err(TaggingError::validation("name", "cannot be blank."));
    }
    Ok(())
}

/// Table and column names are interpolated into SQL, so only plain identifiers pass
pub fn validate_identifier(field: &str, identifier: &str) -> TaggingResult<()> {
    let mut chars = identifier.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        return Err(TaggingError::validation(
            field,
            format!("\"{identifier}\" is not a valid SQL identifier"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tag_name() {
        assert!(validate_tag_name(&TagName::parse("music", ":")).is_ok());
        assert!(validate_tag_name(&TagName::parse("music:cajun", ":")).is_ok());

        let err = validate_tag_name(&TagName::parse("   ", ":")).unwrap_err();
        assert!(err.to_string().contains("cannot be blank"));
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("column", "cached_tag_list").is_ok());
        assert!(validate_identifier("column", "_col2").is_ok());
        assert!(validate_identifier("column", "").is_err());
        assert!(validate_identifier("column", "2col").is_err());
        assert!(validate_identifier("column", "col; DROP TABLE tags").is_err());
    }
}
