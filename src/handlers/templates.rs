//! Report template HTTP handlers.
//!
//! - GET /api/v1/templates?report_type=summary - List templates
//! - POST /api/v1/templates - Create a template
//! - GET /api/v1/templates/{id} - Get a template
//! - PUT /api/v1/templates/{id} - Update a template
//! - DELETE /api/v1/templates/{id} - Delete a template

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
        template::{CreateTemplateRequest, ReportTemplate, TemplateListQuery, UpdateTemplateRequest},
        user::Permission,
    },
    services::{audit_service, template_service},
};

pub async fn list_templates(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<TemplateListQuery>,
) -> Result<Json<Vec<ReportTemplate>>, AppError> {
    auth.require(Permission::ViewReports)?;
    Ok(Json(
        template_service::list_templates(&pool, query.report_type).await?,
    ))
}

pub async fn get_template(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ReportTemplate>, AppError> {
    auth.require(Permission::ViewReports)?;
    Ok(Json(template_service::get_template(&pool, id).await?))
}

/// Create a template.
///
/// # Request Body
///
/// ```json
/// {
///   "name": "Quarterly by carrier",
///   "report_type": "breakdown",
///   "dimension": "insurance_company",
///   "filters": { "date_from": "2025-01-01" },
///   "columns": ["label", "total_combined_revenue", "final_net_profit"],
///   "is_default": true
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the template. When `is_default` is set,
///   any other default of the same report type is cleared.
/// - **Error (400)**: validation failure, or a breakdown without a dimension
/// - **Error (409)**: name already taken
pub async fn create_template(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiJson(request): ApiJson<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<ReportTemplate>), AppError> {
    auth.require(Permission::ManageTemplates)?;
    request.validate()?;

    let template = template_service::create_template(&pool, auth.user_id, request).await?;

    audit_service::record_quietly(
        &pool,
        audit_entry(&auth, &client, AuditAction::Create, "report_template")
            .resource(template.id)
            .details(json!({
                "name": template.name,
                "report_type": template.report_type,
            })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(template)))
}

/// Update a template. Absent fields are unchanged.
pub async fn update_template(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateTemplateRequest>,
) -> Result<Json<ReportTemplate>, AppError> {
    auth.require(Permission::ManageTemplates)?;
    request.validate()?;

    let template = template_service::update_template(&pool, id, request).await?;

    audit_service::record_quietly(
        &pool,
        audit_entry(&auth, &client, AuditAction::Update, "report_template")
            .resource(id)
            .details(json!({ "name": template.name })),
    )
    .await;

    Ok(Json(template))
}

/// Delete a template.
///
/// Schedules that use the template are deleted with it.
pub async fn delete_template(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require(Permission::ManageTemplates)?;
    template_service::delete_template(&pool, id).await?;

    audit_service::record_quietly(
        &pool,
        audit_entry(&auth, &client, AuditAction::Delete, "report_template").resource(id),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
