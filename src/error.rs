//! Error types and HTTP error response handling.
//!
//! Every handler returns `Result<T, AppError>`. Errors are converted into a
//! JSON body of the form `{"error": "...", "timestamp": "..."}` with a status
//! code matching the failure.

use std::collections::HashMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;

/// Application-wide error type.
///
/// # Status Code Mapping
///
/// - `InvalidRequest`, `Validation` → 400 Bad Request
/// - `Unauthorized` → 401 Unauthorized
/// - `Forbidden` → 403 Forbidden
/// - `NotFound` → 404 Not Found
/// - `MethodNotAllowed` → 405 Method Not Allowed
/// - `Conflict` → 409 Conflict
/// - `Upstream` → 502 Bad Gateway
/// - `Database`, `Export`, `Internal` → 500 (details are logged, never returned)
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Bearer token is missing, malformed, expired, or belongs to an inactive user.
    #[error("Authentication required")]
    Unauthorized,

    /// Authenticated user lacks the permission for this action.
    #[error("{0}")]
    Forbidden(String),

    /// Requested resource does not exist or is not visible to the caller.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Request body or parameters are invalid.
    #[error("{0}")]
    InvalidRequest(String),

    /// Field-level validation failures from `validator`.
    #[error("One or more fields are invalid")]
    Validation(#[from] validator::ValidationErrors),

    /// Unique constraint or state conflict.
    #[error("{0}")]
    Conflict(String),

    /// The external analytics API failed or returned unusable data.
    #[error("Analytics source error: {0}")]
    Upstream(String),

    /// Report file generation failed.
    #[error("Export failed: {0}")]
    Export(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Export(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Map a unique-violation database error to `Conflict`, leaving others untouched.
    pub fn on_unique_violation(err: sqlx::Error, message: &str) -> AppError {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return AppError::Conflict(message.to_string());
            }
        }
        AppError::Database(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Server-side failures are logged with full detail and hidden from the client
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            match self {
                AppError::Upstream(_) => "The analytics source is unavailable".to_string(),
                AppError::Export(ref msg) => format!("Export failed: {}", msg),
                _ => "An internal error occurred".to_string(),
            }
        } else {
            self.to_string()
        };

        let mut body = json!({
            "error": message,
            "timestamp": Utc::now(),
        });

        if let AppError::Validation(ref errors) = self {
            let details: HashMap<String, Vec<String>> = errors
                .field_errors()
                .iter()
                .map(|(field, field_errors)| {
                    let messages = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    (field.to_string(), messages)
                })
                .collect();
            body["details"] = json!(details);
        }

        (status, Json(body)).into_response()
    }
}
