//! Error types shared by every Ledgerline crate.

use thiserror::Error;

/// Result type alias for core and repository operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Local database failures, already stripped of driver-specific types.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Pool error: {0}")]
    PoolError(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Writer unavailable: {0}")]
    WriterUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// True for failures of the local store itself (as opposed to bad input).
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_errors_are_storage_failures() {
        let err: Error = DatabaseError::QueryFailed("disk I/O error".to_string()).into();
        assert!(err.is_storage_failure());
        assert!(!Error::validation("amount must be positive").is_storage_failure());
    }
}
