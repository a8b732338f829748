/// Unified error types for the dispatch service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the dispatch service
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Persistence failures (store unavailable, transaction conflict)
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Missing, invalid or expired credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Actor lacks the role or ownership the operation requires
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Malformed or missing input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not legal in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Conflict errors (e.g., duplicate username)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),
}

impl DispatchError {
    /// True when the underlying store reported a busy or locked database,
    /// i.e. a concurrent writer held the row we tried to update.
    pub fn is_transaction_conflict(&self) -> bool {
        match self {
            DispatchError::Storage(sqlx::Error::Database(db_err)) => {
                let message = db_err.message();
                message.contains("database is locked") || message.contains("database is busy")
            }
            DispatchError::Storage(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert DispatchError to HTTP response
impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            DispatchError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            DispatchError::Authorization(_) => {
                (StatusCode::FORBIDDEN, "Forbidden", self.to_string())
            }
            DispatchError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "InvalidRequest", self.to_string())
            }
            DispatchError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            DispatchError::InvalidState(_) => {
                (StatusCode::CONFLICT, "InvalidState", self.to_string())
            }
            DispatchError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            DispatchError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                "Rate limit exceeded".to_string(),
            ),
            DispatchError::Storage(_) | DispatchError::Internal(_) | DispatchError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
            DispatchError::Jwt(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                self.to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;
