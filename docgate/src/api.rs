//! JSON bodies shared by the viewer API and its HTTP client.

use serde::{Deserialize, Serialize};

/// `POST /api/storage/sign` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRequest {
    pub path: String,
    /// Requested validity in seconds
    pub expires_in: u64,
}

/// `POST /api/storage/sign` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignResponse {
    pub signed_url: String,
}

/// Error body returned by every API route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
