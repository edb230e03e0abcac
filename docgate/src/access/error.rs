//! Error types for the access session core.

use thiserror::Error;

/// Access session error type.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The submitted email is not syntactically valid.
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    /// A gate submission is already waiting on the store.
    #[error("An access request is already being processed")]
    SubmissionInProgress,

    /// The store rejected or failed the operation.
    #[error("{0}")]
    Store(String),

    /// The store could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// Requester address could not be determined.
    #[error("IP lookup failed: {0}")]
    IpLookup(String),

    /// Client-local persistence failed.
    #[error("Local storage error: {0}")]
    LocalStorage(String),
}

impl AccessError {
    /// Returns true if this error came from the external store (insert,
    /// document lookup or link signing), as opposed to local or auxiliary
    /// failures.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, AccessError::Store(_) | AccessError::Network(_))
    }
}

/// Result type alias for the access core.
pub type Result<T, E = AccessError> = std::result::Result<T, E>;
