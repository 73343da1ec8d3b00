//! Export jobs.
//!
//! An export runs inside the request that creates it. The job row is written
//! first and then moved through a fixed sequence of stages, each persisted
//! so clients polling `GET /api/v1/exports/{id}` see progress:
//!
//! | status     | progress |
//! |------------|----------|
//! | preparing  | 10       |
//! | fetching   | 30       |
//! | processing | 60       |
//! | writing    | 85       |
//! | completed  | 100      |
//!
//! Any error after the job exists marks it `failed` with the message and
//! the progress it had reached.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        export::{
            EXPORT_STAGES, ExportFile, ExportFormat, ExportJob, ExportListQuery, ExportRequest,
            ExportStatus,
        },
        pagination::{Page, Pagination},
        revenue::{DataSource, Dimension, Granularity, RevenueFilter},
        template::ReportType,
    },
    services::{
        revenue_calc,
        revenue_query::validate_filter,
        revenue_service,
        report_writer::{self, ReportData, ReportTable},
        template_service,
    },
    state::AppState,
};

const JOB_COLUMNS: &str = "id, user_id, format, report_type, parameters, status, progress, \
    file_name, checksum, byte_size, row_count, error_message, created_at, completed_at";

/// Export parameters after a template, if any, has been applied.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedExport {
    pub format: ExportFormat,
    pub report_type: ReportType,
    pub filters: RevenueFilter,
    pub granularity: Granularity,
    pub dimension: Dimension,
    pub columns: Vec<String>,
    pub template_id: Option<Uuid>,
    pub source: DataSource,
}

/// Merge a request with its template. Template settings win.
pub async fn resolve_request(
    pool: &DbPool,
    request: ExportRequest,
) -> Result<ResolvedExport, AppError> {
    let resolved = match request.template_id {
        Some(template_id) => {
            let template = template_service::get_template(pool, template_id).await?;
            ResolvedExport {
                format: request.format,
                report_type: template.report_type,
                filters: template.filters.0,
                granularity: template
                    .granularity
                    .or(request.granularity)
                    .unwrap_or_default(),
                dimension: template.dimension.or(request.dimension).unwrap_or_default(),
                columns: template.columns,
                template_id: Some(template_id),
                source: request.source,
            }
        }
        None => ResolvedExport {
            format: request.format,
            report_type: request.report_type.ok_or_else(|| {
                AppError::InvalidRequest(
                    "report_type is required when no template_id is given".to_string(),
                )
            })?,
            filters: request.filters.unwrap_or_default(),
            granularity: request.granularity.unwrap_or_default(),
            dimension: request.dimension.unwrap_or_default(),
            columns: Vec::new(),
            template_id: None,
            source: request.source,
        },
    };

    validate_filter(&resolved.filters)?;
    Ok(resolved)
}

/// `revenue_<report_type>_<YYYYMMDD_HHMMSS>.<ext>`
pub fn export_file_name(
    report_type: ReportType,
    format: ExportFormat,
    generated_at: DateTime<Utc>,
) -> String {
    format!(
        "revenue_{}_{}.{}",
        report_type.as_str(),
        generated_at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Hex-encoded SHA-256 of the file contents.
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Reject exports larger than the configured limit.
pub fn check_row_limit(rows: i64, max_rows: i64) -> Result<(), AppError> {
    if rows > max_rows {
        return Err(AppError::InvalidRequest(format!(
            "Export would contain {} rows; the limit is {}. Narrow the filters and try again.",
            rows, max_rows
        )));
    }
    Ok(())
}

/// Move a job from `current` to the following stage and return that stage.
async fn advance(pool: &DbPool, job_id: Uuid, current: ExportStatus) -> Result<ExportStatus, AppError> {
    let status = current
        .next()
        .ok_or_else(|| anyhow::anyhow!("export {} is already {:?}", job_id, current))?;
    sqlx::query("UPDATE export_jobs SET status = $1, progress = COALESCE($2, progress) WHERE id = $3")
        .bind(status)
        .bind(status.progress())
        .bind(job_id)
        .execute(pool)
        .await?;
    tracing::debug!(%job_id, ?status, "export stage");
    Ok(status)
}

async fn mark_failed(pool: &DbPool, job_id: Uuid, message: &str) {
    let result = sqlx::query(
        r#"
        UPDATE export_jobs
        SET status = 'failed', error_message = $1, completed_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(message)
    .bind(job_id)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::error!(%job_id, error = %e, "failed to mark export as failed");
    }
}

/// Create an export job and run it to completion.
///
/// # Errors
///
/// - `NotFound`: the template does not exist
/// - `InvalidRequest`: bad filters, unknown columns, or too many rows
/// - `Export`: the file could not be written (for PDF, usually a missing font)
///
/// Errors raised after the job row exists also leave the job `failed`.
pub async fn create_export(
    state: &AppState,
    user_id: Uuid,
    request: ExportRequest,
) -> Result<ExportJob, AppError> {
    let resolved = resolve_request(&state.pool, request).await?;
    let parameters = serde_json::to_value(&resolved)
        .map_err(|e| anyhow::anyhow!("failed to serialize export parameters: {}", e))?;

    let job_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO export_jobs (user_id, format, report_type, parameters, status, progress)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(resolved.format)
    .bind(resolved.report_type)
    .bind(&parameters)
    .bind(EXPORT_STAGES[0])
    .bind(EXPORT_STAGES[0].progress())
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(%job_id, %user_id, report_type = resolved.report_type.as_str(), "export started");

    if let Err(e) = run_export(state, job_id, &resolved).await {
        tracing::warn!(%job_id, error = %e, "export failed");
        mark_failed(&state.pool, job_id, &e.to_string()).await;
        return Err(e);
    }

    tracing::info!(%job_id, "export completed");
    fetch_job(&state.pool, job_id).await
}

async fn run_export(state: &AppState, job_id: Uuid, resolved: &ResolvedExport) -> Result<(), AppError> {
    let pool = &state.pool;
    let max_rows = state.config.export_max_rows;
    let source = state.revenue_source(resolved.source);

    let stage = advance(pool, job_id, EXPORT_STAGES[0]).await?;
    if resolved.source == DataSource::Database {
        let count = revenue_service::count_records(source, &resolved.filters).await?;
        check_row_limit(count, max_rows)?;
    }
    let transactions = revenue_service::load_transactions(source, &resolved.filters).await?;
    check_row_limit(transactions.len() as i64, max_rows)?;

    let stage = advance(pool, job_id, stage).await?;
    let data = match resolved.report_type {
        ReportType::Summary => ReportData::Summary(revenue_calc::summarize(&transactions)),
        ReportType::Timeseries => {
            ReportData::Timeseries(revenue_calc::timeseries(&transactions, resolved.granularity))
        }
        ReportType::Breakdown => {
            ReportData::Breakdown(revenue_calc::breakdown(&transactions, resolved.dimension))
        }
        ReportType::Transactions => ReportData::Transactions(transactions),
    };
    let table = ReportTable::from_data(&data).select_columns(&resolved.columns)?;
    let row_count = table.rows.len() as i64;

    let stage = advance(pool, job_id, stage).await?;
    let generated_at = Utc::now();
    let bytes = report_writer::write(
        resolved.format,
        table,
        &state.config.pdf_font_dir,
        &state.config.pdf_font_name,
        generated_at,
    )
    .await?;

    let file_name = export_file_name(resolved.report_type, resolved.format, generated_at);
    let completed = stage
        .next()
        .filter(|s| s.is_terminal())
        .ok_or_else(|| anyhow::anyhow!("export {} cannot complete from {:?}", job_id, stage))?;
    sqlx::query(
        r#"
        UPDATE export_jobs
        SET status = $1,
            progress = $2,
            file_name = $3,
            file_data = $4,
            checksum = $5,
            byte_size = $6,
            row_count = $7,
            completed_at = NOW()
        WHERE id = $8
        "#,
    )
    .bind(completed)
    .bind(completed.progress())
    .bind(&file_name)
    .bind(&bytes)
    .bind(checksum(&bytes))
    .bind(bytes.len() as i64)
    .bind(row_count)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

async fn fetch_job(pool: &DbPool, id: Uuid) -> Result<ExportJob, AppError> {
    let sql = format!("SELECT {} FROM export_jobs WHERE id = $1", JOB_COLUMNS);
    sqlx::query_as::<_, ExportJob>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Export"))
}

/// A job visible to the caller. Other users' jobs look like missing ones.
pub async fn get_job(
    pool: &DbPool,
    id: Uuid,
    user_id: Uuid,
    is_admin: bool,
) -> Result<ExportJob, AppError> {
    let job = fetch_job(pool, id).await?;
    if !is_admin && job.user_id != Some(user_id) {
        return Err(AppError::NotFound("Export"));
    }
    Ok(job)
}

/// The caller's jobs, newest first. Admins see every job.
pub async fn list_jobs(
    pool: &DbPool,
    user_id: Uuid,
    is_admin: bool,
    query: &ExportListQuery,
) -> Result<Page<ExportJob>, AppError> {
    let pagination = Pagination::new(query.page, query.per_page);

    let push_filters = |builder: &mut QueryBuilder<'static, Postgres>| {
        builder.push(" WHERE 1 = 1");
        if !is_admin {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        }
    };

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM export_jobs");
    push_filters(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut select = QueryBuilder::new(format!("SELECT {} FROM export_jobs", JOB_COLUMNS));
    push_filters(&mut select);
    select
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let jobs = select.build_query_as::<ExportJob>().fetch_all(pool).await?;

    Ok(Page::new(jobs, pagination, total))
}

/// File bytes of a completed job.
///
/// # Errors
///
/// - `NotFound`: no such job, or not the caller's
/// - `Conflict`: the job has not completed
pub async fn download(
    pool: &DbPool,
    id: Uuid,
    user_id: Uuid,
    is_admin: bool,
) -> Result<ExportFile, AppError> {
    let job = get_job(pool, id, user_id, is_admin).await?;
    if job.status != ExportStatus::Completed {
        return Err(AppError::Conflict(format!(
            "Export is not ready (status: {:?})",
            job.status
        )));
    }

    sqlx::query_as::<_, ExportFile>(
        "SELECT file_name, format, file_data FROM export_jobs WHERE id = $1 AND file_data IS NOT NULL",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Export file"))
}

pub async fn delete_job(
    pool: &DbPool,
    id: Uuid,
    user_id: Uuid,
    is_admin: bool,
) -> Result<(), AppError> {
    get_job(pool, id, user_id, is_admin).await?;
    sqlx::query("DELETE FROM export_jobs WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
