//! User management HTTP handlers.
//!
//! - GET /api/v1/users - List users (admin)
//! - POST /api/v1/users - Create a user (admin)
//! - GET /api/v1/users/{id} - Get a user (admin, or the user themselves)
//! - PUT /api/v1/users/{id} - Update a user (admin)
//! - DELETE /api/v1/users/{id} - Delete a user (admin)

use axum::{Extension, Json, extract::State, http::StatusCode};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    error::AppError,
    extract::{ApiJson, ApiPath, ApiQuery},
    handlers::audit_entry,
    middleware::{auth::AuthContext, client::ClientInfo},
    models::{
        audit_log::AuditAction,
        pagination::Page,
        user::{CreateUserRequest, Permission, UpdateUserRequest, UserListQuery, UserResponse},
    },
    services::{audit_service, user_service},
};

/// List users.
///
/// # Query Parameters
///
/// - `role`, `status`: exact match
/// - `search`: substring of name or email
/// - `page`, `per_page`: paging (default 1 and 50, `per_page` at most 500)
pub async fn list_users(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> Result<Json<Page<UserResponse>>, AppError> {
    auth.require(Permission::ManageUsers)?;
    Ok(Json(user_service::list_users(&pool, &query).await?))
}

/// Get a user. Any user may read their own record.
pub async fn get_user(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    if id != auth.user_id {
        auth.require(Permission::ManageUsers)?;
    }
    let user = user_service::get_user(&pool, id).await?;
    Ok(Json(user.into()))
}

/// Create a user.
///
/// # Request Body
///
/// ```json
/// {
///   "email": "sam@example.com",
///   "full_name": "Sam Ortiz",
///   "role": "analyst",
///   "password": "optional, at least 8 characters"
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the user. Without a `password` in the
///   request, `initial_password` holds a generated one. It is shown only here.
/// - **Error (400)**: validation failure
/// - **Error (409)**: email already registered
pub async fn create_user(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiJson(request): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    auth.require(Permission::ManageUsers)?;
    request.validate()?;

    let user = user_service::create_user(&pool, request).await?;

    audit_service::record_quietly(
        &pool,
        audit_entry(&auth, &client, AuditAction::Create, "user")
            .resource(user.id)
            .details(json!({ "email": user.email, "role": user.role })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Update a user.
///
/// Absent fields are unchanged. Admins cannot change their own role or
/// deactivate themselves (400).
pub async fn update_user(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    auth.require(Permission::ManageUsers)?;
    request.validate()?;

    let details = json!({
        "full_name": request.full_name,
        "role": request.role,
        "status": request.status,
        "password_changed": request.password.is_some(),
    });
    let user = user_service::update_user(&pool, auth.user_id, id, request).await?;

    audit_service::record_quietly(
        &pool,
        audit_entry(&auth, &client, AuditAction::Update, "user")
            .resource(id)
            .details(details),
    )
    .await;

    Ok(Json(user))
}

/// Delete a user. Deleting yourself is rejected (400).
pub async fn delete_user(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require(Permission::ManageUsers)?;
    user_service::delete_user(&pool, auth.user_id, id).await?;

    audit_service::record_quietly(
        &pool,
        audit_entry(&auth, &client, AuditAction::Delete, "user").resource(id),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
