//! Error types for the sync crate.

use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Retry policy class for API failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Errors that can occur while talking to the remote ledger or replaying
/// queued mutations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from the remote ledger
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The remote did not answer within the probe or request bound
    #[error("Remote unreachable: {0}")]
    Unreachable(String),

    /// Invalid request (missing required data, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication error (missing or invalid token)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Local store failure
    #[error("Local storage error: {0}")]
    Storage(#[from] ledgerline_core::Error),
}

impl SyncError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Transport-level failure: the remote could not be reached at all, as
    /// opposed to a remote that answered with a rejection.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::Http(err) => {
                err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
            }
            Self::Api { status, .. } => matches!(*status, 502..=504),
            _ => false,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> ApiRetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                401 | 403 => ApiRetryClass::ReauthRequired,
                408 | 409 | 423 | 425 | 429 => ApiRetryClass::Retryable,
                500..=599 => ApiRetryClass::Retryable,
                _ => ApiRetryClass::Permanent,
            },
            Self::Http(_) | Self::Unreachable(_) => ApiRetryClass::Retryable,
            Self::Json(_) => ApiRetryClass::Permanent,
            Self::InvalidRequest(_) => ApiRetryClass::Permanent,
            Self::Auth(_) => ApiRetryClass::ReauthRequired,
            Self::Storage(_) => ApiRetryClass::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_only_404() {
        assert!(SyncError::api(404, "gone").is_not_found());
        assert!(!SyncError::api(410, "gone").is_not_found());
        assert!(!SyncError::unreachable("timeout").is_not_found());
    }

    #[test]
    fn gateway_errors_count_as_connectivity() {
        assert!(SyncError::api(503, "maintenance").is_connectivity());
        assert!(SyncError::unreachable("probe timed out").is_connectivity());
        assert!(!SyncError::api(500, "boom").is_connectivity());
        assert!(!SyncError::api(404, "missing").is_connectivity());
    }

    #[test]
    fn retry_class_for_auth_error_is_reauth() {
        let err = SyncError::api(401, "unauthorized");
        assert_eq!(err.retry_class(), ApiRetryClass::ReauthRequired);
        assert_eq!(
            SyncError::api(422, "bad amount").retry_class(),
            ApiRetryClass::Permanent
        );
    }
}
