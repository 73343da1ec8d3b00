//! Session HTTP handlers.
//!
//! - POST /api/v1/auth/login - Exchange email and password for a token
//! - POST /api/v1/auth/logout - Record the end of a session
//! - GET /api/v1/auth/me - Current user

use axum::{Extension, Json, extract::State, http::StatusCode};
use serde_json::json;
use validator::Validate;

use crate::{
    db::DbPool,
    error::AppError,
    extract::ApiJson,
    handlers::audit_entry,
    middleware::{auth::AuthContext, client::ClientInfo},
    models::{
        audit_log::{AuditAction, NewAuditLog},
        user::{LoginRequest, LoginResponse, UserResponse},
    },
    services::{audit_service, auth_service, user_service},
    state::AppState,
};

/// Log in.
///
/// # Endpoint
///
/// `POST /api/v1/auth/login` (public)
///
/// # Request Body
///
/// ```json
/// { "email": "ana@example.com", "password": "..." }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: token, expiry and the user
/// - **Error (400)**: malformed body or invalid email
/// - **Error (401)**: wrong credentials or inactive account
///
/// ```json
/// {
///   "token": "eyJhbGciOiJIUzI1NiJ9...",
///   "expires_at": "2025-06-01T16:00:00Z",
///   "user": { "id": "...", "email": "ana@example.com", "role": "analyst", ... }
/// }
/// ```
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    request.validate()?;

    let response = auth_service::login(
        &state.pool,
        &request.email,
        &request.password,
        &state.config.jwt_secret,
        state.config.jwt_expiry_hours,
    )
    .await
    .inspect_err(|e| {
        if matches!(e, AppError::Unauthorized) {
            tracing::info!(email = %request.email, "failed login attempt");
        }
    })?;

    audit_service::record_quietly(
        &state.pool,
        NewAuditLog::new(Some(response.user.id), AuditAction::Login, "session")
            .resource(response.user.id)
            .client(client.ip_address, client.user_agent),
    )
    .await;

    Ok(Json(response))
}

/// Log out.
///
/// Tokens are stateless, so this only records the event. A failed audit
/// write is logged and the logout still succeeds.
///
/// # Response
///
/// - **Success (204 No Content)**
pub async fn logout(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
) -> StatusCode {
    audit_service::record_quietly(
        &pool,
        audit_entry(&auth, &client, AuditAction::Logout, "session")
            .resource(auth.user_id)
            .details(json!({ "email": auth.email })),
    )
    .await;

    StatusCode::NO_CONTENT
}

/// Current user.
///
/// `GET /api/v1/auth/me`
pub async fn me(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UserResponse>, AppError> {
    let user = user_service::get_user(&pool, auth.user_id).await?;
    Ok(Json(user.into()))
}
