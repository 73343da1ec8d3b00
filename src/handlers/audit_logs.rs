//! Audit log HTTP handlers.
//!
//! - GET /api/v1/audit-logs - Search entries (admin, manager)
//! - POST /api/v1/audit-logs - Record an entry for the caller
//! - GET /api/v1/audit-logs/{id} - Get an entry (admin, manager)
//! - DELETE /api/v1/audit-logs/{id} - Delete an entry (admin)
//!
//! Entries are never updated.

use axum::{Extension, Json, extract::State, http::StatusCode};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    error::AppError,
    extract::{ApiJson, ApiPath, ApiQuery},
    middleware::{auth::AuthContext, client::ClientInfo},
    models::{
        audit_log::{AuditLog, AuditLogQuery, CreateAuditLogRequest, NewAuditLog},
        pagination::Page,
        user::Permission,
    },
    services::audit_service,
};

/// Search audit entries, newest first.
///
/// # Query Parameters
///
/// - `user_id`, `action`, `resource_type`: exact match
/// - `date_from`, `date_to`: inclusive calendar dates
/// - `page`, `per_page`
pub async fn list_audit_logs(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<AuditLogQuery>,
) -> Result<Json<Page<AuditLog>>, AppError> {
    auth.require(Permission::ViewAuditLogs)?;
    Ok(Json(audit_service::list_logs(&pool, &query).await?))
}

pub async fn get_audit_log(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<AuditLog>, AppError> {
    auth.require(Permission::ViewAuditLogs)?;
    Ok(Json(audit_service::get_log(&pool, id).await?))
}

/// Record a client-side event, such as viewing a dashboard.
///
/// The entry is attributed to the caller; the client address and user agent
/// come from the request.
///
/// # Request Body
///
/// ```json
/// { "action": "view", "resource_type": "dashboard", "details": { "tab": "breakdown" } }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the stored entry
pub async fn create_audit_log(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiJson(request): ApiJson<CreateAuditLogRequest>,
) -> Result<(StatusCode, Json<AuditLog>), AppError> {
    request.validate()?;

    let mut entry = NewAuditLog::new(Some(auth.user_id), request.action, &request.resource_type)
        .client(client.ip_address, client.user_agent);
    if let Some(resource_id) = request.resource_id {
        entry = entry.resource(resource_id);
    }
    if let Some(details) = request.details {
        entry = entry.details(details);
    }

    let log = audit_service::record(&pool, entry).await?;
    Ok((StatusCode::CREATED, Json(log)))
}

pub async fn delete_audit_log(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require(Permission::ManageUsers)?;
    audit_service::delete_log(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
