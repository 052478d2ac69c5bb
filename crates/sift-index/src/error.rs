//! Error types for sift-index.

use crate::store::StoreError;

/// Errors that can occur during repository indexing.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A candidate file could not be read while hashing or chunking.
    #[error("failed to read {path}: {source}")]
    FileUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// IO error outside of per-file reads (repository root, blocking task).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The index store rejected or failed an operation. Fatal for a run.
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    /// `SQLite` database error.
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// Schema migration failure.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Filesystem walk error.
    #[error("walk error: {0}")]
    Walk(#[from] ignore::Error),

    /// An ignore pattern could not be compiled.
    #[error("invalid ignore pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

impl IndexError {
    /// Whether the error is scoped to a single file and the run may continue.
    #[must_use]
    pub fn is_per_file(&self) -> bool {
        matches!(self, Self::FileUnreadable { .. })
    }
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_unreadable_is_per_file() {
        let err = IndexError::FileUnreadable {
            path: "src/lib.rs".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.is_per_file());
        assert_eq!(err.to_string(), "failed to read src/lib.rs: denied");
    }

    #[test]
    fn store_error_is_fatal() {
        let err = IndexError::from(StoreError::Unavailable("down".into()));
        assert!(!err.is_per_file());
        assert!(err.to_string().contains("store unavailable"));
    }
}
