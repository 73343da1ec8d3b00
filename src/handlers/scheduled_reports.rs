//! Scheduled report HTTP handlers.
//!
//! - GET /api/v1/scheduled-reports - List schedules
//! - POST /api/v1/scheduled-reports - Create a schedule
//! - GET /api/v1/scheduled-reports/{id} - Get a schedule
//! - PUT /api/v1/scheduled-reports/{id} - Update a schedule
//! - DELETE /api/v1/scheduled-reports/{id} - Delete a schedule
//! - POST /api/v1/scheduled-reports/{id}/run - Run a schedule immediately
//!
//! Schedules are stored with their cron expression and next run time.
//! Nothing in this service fires them on its own; `run` is the only trigger.

use axum::{Extension, Json, extract::State, http::StatusCode};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    error::AppError,
    extract::{ApiJson, ApiPath},
    handlers::audit_entry,
    middleware::{auth::AuthContext, client::ClientInfo},
    models::{
        audit_log::AuditAction,
        export::ExportJob,
        schedule::{CreateScheduleRequest, ScheduledReport, UpdateScheduleRequest},
        user::Permission,
    },
    services::{audit_service, schedule_service},
    state::AppState,
};

/// Response to a manual run.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub schedule: ScheduledReport,
    pub export: ExportJob,
}

pub async fn list_schedules(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ScheduledReport>>, AppError> {
    auth.require(Permission::ManageSchedules)?;
    Ok(Json(schedule_service::list_schedules(&pool).await?))
}

pub async fn get_schedule(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ScheduledReport>, AppError> {
    auth.require(Permission::ManageSchedules)?;
    Ok(Json(schedule_service::get_schedule(&pool, id).await?))
}

/// Create a schedule.
///
/// # Request Body
///
/// ```json
/// {
///   "name": "Monday carrier report",
///   "template_id": "...",
///   "frequency": "weekly",
///   "hour": 7,
///   "minute": 30,
///   "recipients": ["finance@example.com"],
///   "format": "pdf"
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the schedule, with `cron_expression` and
///   `next_run_at` filled in
/// - **Error (400)**: validation failure or an invalid recipient
/// - **Error (404)**: unknown template
pub async fn create_schedule(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiJson(request): ApiJson<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduledReport>), AppError> {
    auth.require(Permission::ManageSchedules)?;
    request.validate()?;

    let schedule = schedule_service::create_schedule(&pool, auth.user_id, request).await?;

    audit_service::record_quietly(
        &pool,
        audit_entry(&auth, &client, AuditAction::Create, "scheduled_report")
            .resource(schedule.id)
            .details(json!({
                "name": schedule.name,
                "frequency": schedule.frequency,
                "template_id": schedule.template_id,
            })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(schedule)))
}

/// Update a schedule. Absent fields are unchanged; the cron expression and
/// next run are recomputed.
pub async fn update_schedule(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateScheduleRequest>,
) -> Result<Json<ScheduledReport>, AppError> {
    auth.require(Permission::ManageSchedules)?;
    request.validate()?;

    let schedule = schedule_service::update_schedule(&pool, id, request).await?;

    audit_service::record_quietly(
        &pool,
        audit_entry(&auth, &client, AuditAction::Update, "scheduled_report")
            .resource(id)
            .details(json!({ "status": schedule.status })),
    )
    .await;

    Ok(Json(schedule))
}

pub async fn delete_schedule(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require(Permission::ManageSchedules)?;
    schedule_service::delete_schedule(&pool, id).await?;

    audit_service::record_quietly(
        &pool,
        audit_entry(&auth, &client, AuditAction::Delete, "scheduled_report").resource(id),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Run a schedule now.
///
/// Produces an export job owned by the caller from the schedule's template
/// and format. The schedule's `last_run_at` and `next_run_at` move forward
/// even when the export fails; the failure is then returned.
///
/// # Response (200 OK)
///
/// ```json
/// { "schedule": { ... }, "export": { "status": "completed", ... } }
/// ```
pub async fn run_schedule(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<RunResponse>, AppError> {
    auth.require(Permission::ManageSchedules)?;

    let (schedule, export) = schedule_service::run_now(&state, id, auth.user_id).await?;

    audit_service::record_quietly(
        &state.pool,
        audit_entry(&auth, &client, AuditAction::Export, "scheduled_report")
            .resource(id)
            .details(json!({ "export_id": export.id, "format": export.format })),
    )
    .await;

    Ok(Json(RunResponse { schedule, export }))
}
