//! Error types for mend.

use thiserror::Error;

/// Result type alias using mend's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for mend operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The document source could not be read from or written to
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// A document carries a field of the wrong shape
    #[error("Malformed document {id}: field `{field}` {reason}")]
    MalformedDocument {
        id: String,
        field: String,
        reason: String,
    },

    /// A patch targeted a document that no longer exists
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a [`Error::MalformedDocument`] for the given document and field.
    pub fn malformed(id: &str, field: &str, reason: impl Into<String>) -> Self {
        Error::MalformedDocument {
            id: id.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error came from the document source rather than the data.
    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            Error::Database(_)
                | Error::SourceUnavailable(_)
                | Error::DocumentNotFound(_)
                | Error::Io(_)
        )
    }

    /// Id of the document that triggered this error, when known.
    pub fn document_id(&self) -> Option<&str> {
        match self {
            Error::MalformedDocument { id, .. } => Some(id),
            Error::DocumentNotFound(id) => Some(id),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_source_unavailable() {
        let err = Error::SourceUnavailable("quota exceeded".to_string());
        assert_eq!(err.to_string(), "Source unavailable: quota exceeded");
    }

    #[test]
    fn test_error_display_malformed_document() {
        let err = Error::malformed("m7", "createdAt", "is not a timestamp");
        assert_eq!(
            err.to_string(),
            "Malformed document m7: field `createdAt` is not a timestamp"
        );
    }

    #[test]
    fn test_error_display_document_not_found() {
        let err = Error::DocumentNotFound("m42".to_string());
        assert_eq!(err.to_string(), "Document not found: m42");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("batch size must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: batch size must be positive"
        );
    }

    #[test]
    fn test_source_failure_classification() {
        assert!(Error::SourceUnavailable("down".into()).is_source_failure());
        assert!(Error::DocumentNotFound("m1".into()).is_source_failure());
        assert!(!Error::malformed("m1", "isActive", "is not a boolean").is_source_failure());
        assert!(!Error::Config("bad".into()).is_source_failure());
    }

    #[test]
    fn test_document_id_extraction() {
        assert_eq!(
            Error::malformed("m3", "lastMessageAt", "is not a timestamp").document_id(),
            Some("m3")
        );
        assert_eq!(Error::DocumentNotFound("m9".into()).document_id(), Some("m9"));
        assert_eq!(Error::Config("x".into()).document_id(), None);
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => {
                assert!(!msg.is_empty());
            }
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
