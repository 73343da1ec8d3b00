//! Export HTTP handlers.
//!
//! - POST /api/v1/exports - Generate an export
//! - GET /api/v1/exports - List the caller's exports (every export for admins)
//! - GET /api/v1/exports/{id} - Job status and progress
//! - GET /api/v1/exports/{id}/download - File bytes
//! - DELETE /api/v1/exports/{id} - Delete an export

use axum::{
    Extension, Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    extract::{ApiJson, ApiPath, ApiQuery},
    handlers::audit_entry,
    middleware::{auth::AuthContext, client::ClientInfo},
    models::{
        audit_log::AuditAction,
        export::{ExportJob, ExportListQuery, ExportRequest},
        pagination::Page,
        user::Permission,
    },
    services::{audit_service, export_service},
    state::AppState,
};

/// Generate an export.
///
/// # Endpoint
///
/// `POST /api/v1/exports`
///
/// # Request Body
///
/// ```json
/// {
///   "format": "csv",
///   "report_type": "transactions",
///   "filters": { "date_from": "2025-01-01", "insurance_companies": ["Acme Life"] },
///   "source": "database"
/// }
/// ```
///
/// Or with a template, whose settings replace the ones above:
///
/// ```json
/// { "format": "pdf", "template_id": "..." }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the completed job
/// - **Error (400)**: invalid filters, missing report type, or more rows
///   than the export limit
/// - **Error (404)**: unknown template
/// - **Error (500)**: the file could not be produced; the job is kept with
///   status `failed`
pub async fn create_export(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiJson(request): ApiJson<ExportRequest>,
) -> Result<(StatusCode, Json<ExportJob>), AppError> {
    auth.require(Permission::RunExports)?;

    let job = export_service::create_export(&state, auth.user_id, request).await?;

    audit_service::record_quietly(
        &state.pool,
        audit_entry(&auth, &client, AuditAction::Export, "export")
            .resource(job.id)
            .details(json!({
                "format": job.format,
                "report_type": job.report_type,
                "row_count": job.row_count,
            })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn list_exports(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<ExportListQuery>,
) -> Result<Json<Page<ExportJob>>, AppError> {
    auth.require(Permission::RunExports)?;
    Ok(Json(
        export_service::list_jobs(&pool, auth.user_id, auth.is_admin(), &query).await?,
    ))
}

/// Job status. Poll this while an export is running.
pub async fn get_export(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ExportJob>, AppError> {
    auth.require(Permission::RunExports)?;
    Ok(Json(
        export_service::get_job(&pool, id, auth.user_id, auth.is_admin()).await?,
    ))
}

/// Download a completed export.
///
/// # Response
///
/// - **Success (200 OK)**: the file, with `Content-Type` for its format and
///   `Content-Disposition: attachment`
/// - **Error (404)**: no such export, or another user's
/// - **Error (409)**: the export has not completed
pub async fn download_export(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(Permission::RunExports)?;

    let file = export_service::download(&pool, id, auth.user_id, auth.is_admin()).await?;
    let disposition = format!("attachment; filename=\"{}\"", file.file_name);

    Ok((
        [
            (header::CONTENT_TYPE, file.format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.file_data,
    ))
}

pub async fn delete_export(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require(Permission::RunExports)?;
    export_service::delete_job(&pool, id, auth.user_id, auth.is_admin()).await?;

    audit_service::record_quietly(
        &pool,
        audit_entry(&auth, &client, AuditAction::Delete, "export").resource(id),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
