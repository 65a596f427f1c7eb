//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::password::PasswordError;
use crate::store::StoreError;
use crate::token::TokenError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing or malformed authorization header")]
    MissingAuthorization,

    #[error("Incorrect username or password")]
    WrongCredentials,

    #[error("Session is blocked or expired")]
    SessionInvalid,

    #[error("Resource does not belong to the authenticated user")]
    Forbidden,

    // Store errors carry their own taxonomy
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Token(#[from] TokenError),

    // Server errors (5xx)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Mismatch => Self::WrongCredentials,
            PasswordError::Hash(e) => Self::Internal(e.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),

            // 401 Unauthorized
            AppError::MissingAuthorization => (StatusCode::UNAUTHORIZED, "missing_authorization"),
            AppError::WrongCredentials => (StatusCode::UNAUTHORIZED, "wrong_credentials"),
            AppError::SessionInvalid => (StatusCode::UNAUTHORIZED, "session_invalid"),
            AppError::Token(TokenError::Expired) => (StatusCode::UNAUTHORIZED, "token_expired"),
            AppError::Token(_) => (StatusCode::UNAUTHORIZED, "token_invalid"),

            // 403 Forbidden
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),

            // Store errors map per kind
            AppError::Store(store_err) => match store_err {
                StoreError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
                StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                StoreError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
                StoreError::Database(e) => {
                    tracing::error!("Database error: {:?}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            },

            // 500 Internal Server Error
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
