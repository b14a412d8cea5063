use rusqlite::ffi;
use thiserror::Error;

/// Error type shared by every tagging component
#[derive(Error, Debug)]
pub enum TaggingError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A multi-statement unit of work failed and was rolled back
    #[error("{operation} rolled back: {source}")]
    TransactionFailed {
        operation: String,
        #[source]
        source: Box<TaggingError>,
    },
}

impl TaggingError {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation(message.into())
    }

    /// Wrap a failure that happened inside a transaction
    pub fn transaction_failed(operation: impl Into<String>, source: TaggingError) -> Self {
        Self::TransactionFailed {
            operation: operation.into(),
            source: Box::new(source),
        }
    }
}

/// Result type used across the crate
pub type TaggingResult<T> = Result<T, TaggingError>;

/// Error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller error (fixable by changing the request)
    UserError,
    /// Storage or system error (retryable)
    SystemError,
    /// Configuration error
    ConfigError,
    /// Unrecoverable error
    FatalError,
}

impl TaggingError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            TaggingError::Validation { .. } => ErrorCategory::UserError,
            TaggingError::UnsupportedOperation(_) => ErrorCategory::UserError,
            TaggingError::Database(_) => ErrorCategory::SystemError,
            TaggingError::Internal(_) => ErrorCategory::SystemError,
            TaggingError::Serialization(_) => ErrorCategory::ConfigError,
            TaggingError::TransactionFailed { source, .. } => source.category(),
        }
    }

    /// Message suitable for showing to an end user
    pub fn user_message(&self) -> String {
        match self {
            TaggingError::Database(_) => {
                "A database error occurred. Please try again.".to_string()
            }
            TaggingError::Serialization(_) => "The tagging configuration is invalid.".to_string(),
            TaggingError::Internal(err) => format!("Internal error: {err}"),
            TaggingError::Validation { field, message } => format!("{field} {message}"),
            TaggingError::UnsupportedOperation(msg) => msg.clone(),
            TaggingError::TransactionFailed { source, .. } => source.user_message(),
        }
    }

    /// Whether a caller may retry the whole unit of work
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::SystemError)
    }
}

/// True when the store rejected a write because of a unique index
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            failure.code == rusqlite::ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_categories() {
        assert_eq!(
            TaggingError::validation("name", "cannot be blank.").category(),
            ErrorCategory::UserError
        );
        assert_eq!(
            TaggingError::unsupported("match_all").category(),
            ErrorCategory::UserError
        );
        let wrapped = TaggingError::transaction_failed(
            "merge",
            TaggingError::Database(rusqlite::Error::QueryReturnedNoRows),
        );
        assert_eq!(wrapped.category(), ErrorCategory::SystemError);
        assert!(wrapped.is_retryable());
    }

    #[test]
    fn test_user_message() {
        let err = TaggingError::validation("name", "is taken.");
        assert_eq!(err.user_message(), "name is taken.");
        assert_eq!(err.to_string(), "Validation error: name - is taken.");
    }

    #[test]
    fn test_is_unique_violation() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (v TEXT UNIQUE)", []).unwrap();
        conn.execute("INSERT INTO t (v) VALUES ('a')", []).unwrap();

        let err = conn
            .execute("INSERT INTO t (v) VALUES ('a')", [])
            .expect_err("duplicate insert should fail");
        assert!(is_unique_violation(&err));
        assert!(!is_unique_violation(&rusqlite::Error::QueryReturnedNoRows));
    }
}
