//! Report template storage.
//!
//! At most one template per report type is the default. Marking a template
//! as default clears the flag on the others inside the same transaction.

use sqlx::types::Json;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        revenue::Dimension,
        template::{CreateTemplateRequest, ReportTemplate, ReportType, UpdateTemplateRequest},
    },
    services::{report_writer::check_columns, revenue_query::validate_filter},
};

const DUPLICATE_NAME: &str = "A template with this name already exists";

/// A breakdown template must say what to break down by.
pub fn check_dimension(report_type: ReportType, dimension: Option<Dimension>) -> Result<(), AppError> {
    if report_type == ReportType::Breakdown && dimension.is_none() {
        return Err(AppError::InvalidRequest(
            "breakdown templates require a dimension".to_string(),
        ));
    }
    Ok(())
}

/// Trim a template or schedule name, rejecting one that is only whitespace.
pub fn trimmed_name(name: &str) -> Result<&str, AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidRequest("name must not be blank".to_string()));
    }
    Ok(trimmed)
}

pub async fn list_templates(
    pool: &DbPool,
    report_type: Option<ReportType>,
) -> Result<Vec<ReportTemplate>, AppError> {
    let templates = sqlx::query_as::<_, ReportTemplate>(
        r#"
        SELECT * FROM report_templates
        WHERE ($1::report_type IS NULL OR report_type = $1)
        ORDER BY is_default DESC, name
        "#,
    )
    .bind(report_type)
    .fetch_all(pool)
    .await?;
    Ok(templates)
}

pub async fn get_template(pool: &DbPool, id: Uuid) -> Result<ReportTemplate, AppError> {
    sqlx::query_as::<_, ReportTemplate>("SELECT * FROM report_templates WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Template"))
}

pub async fn create_template(
    pool: &DbPool,
    created_by: Uuid,
    request: CreateTemplateRequest,
) -> Result<ReportTemplate, AppError> {
    let name = trimmed_name(&request.name)?;
    check_dimension(request.report_type, request.dimension)?;
    check_columns(request.report_type, &request.columns)?;
    validate_filter(&request.filters)?;

    let mut tx = pool.begin().await?;

    if request.is_default {
        sqlx::query("UPDATE report_templates SET is_default = false WHERE report_type = $1")
            .bind(request.report_type)
            .execute(&mut *tx)
            .await?;
    }

    let template = sqlx::query_as::<_, ReportTemplate>(
        r#"
        INSERT INTO report_templates (
            name, description, report_type, filters, columns,
            granularity, dimension, is_default, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(&request.description)
    .bind(request.report_type)
    .bind(Json(&request.filters))
    .bind(&request.columns)
    .bind(request.granularity)
    .bind(request.dimension)
    .bind(request.is_default)
    .bind(created_by)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| AppError::on_unique_violation(e, DUPLICATE_NAME))?;

    tx.commit().await?;

    Ok(template)
}

/// Apply a partial update.
///
/// The merged template is validated as a whole, so switching an existing
/// template to `breakdown` still requires a dimension.
pub async fn update_template(
    pool: &DbPool,
    id: Uuid,
    request: UpdateTemplateRequest,
) -> Result<ReportTemplate, AppError> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, ReportTemplate>(
        "SELECT * FROM report_templates WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Template"))?;

    let name = match request.name.as_deref() {
        Some(name) => trimmed_name(name)?,
        None => current.name.as_str(),
    };
    let report_type = request.report_type.unwrap_or(current.report_type);
    let dimension = request.dimension.or(current.dimension);
    let columns = request.columns.unwrap_or(current.columns);
    let filters = request.filters.unwrap_or(current.filters.0);
    let is_default = request.is_default.unwrap_or(current.is_default);

    check_dimension(report_type, dimension)?;
    check_columns(report_type, &columns)?;
    validate_filter(&filters)?;

    if is_default {
        sqlx::query(
            "UPDATE report_templates SET is_default = false WHERE report_type = $1 AND id <> $2",
        )
        .bind(report_type)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    }

    let template = sqlx::query_as::<_, ReportTemplate>(
        r#"
        UPDATE report_templates
        SET name = $1,
            description = $2,
            report_type = $3,
            filters = $4,
            columns = $5,
            granularity = $6,
            dimension = $7,
            is_default = $8,
            updated_at = NOW()
        WHERE id = $9
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(request.description.or(current.description))
    .bind(report_type)
    .bind(Json(&filters))
    .bind(&columns)
    .bind(request.granularity.or(current.granularity))
    .bind(dimension)
    .bind(is_default)
    .bind(id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| AppError::on_unique_violation(e, DUPLICATE_NAME))?;

    tx.commit().await?;

    Ok(template)
}

pub async fn delete_template(pool: &DbPool, id: Uuid) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM report_templates WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Template"));
    }
    Ok(())
}
