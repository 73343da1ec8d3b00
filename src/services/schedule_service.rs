//! Scheduled report definitions and on-demand runs.

use chrono::{DateTime, Days, NaiveTime, Utc};
use uuid::Uuid;
use validator::ValidateEmail;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        export::{ExportJob, ExportRequest},
        schedule::{
            CreateScheduleRequest, Frequency, ScheduleStatus, ScheduledReport, UpdateScheduleRequest,
        },
    },
    services::{export_service, template_service},
    state::AppState,
};

/// Longest gap between two runs of any frequency, in days, plus slack.
const SEARCH_DAYS: u64 = 400;

/// First run strictly after `after`, at `hour:minute` UTC.
pub fn next_run_after(
    frequency: Frequency,
    hour: i16,
    minute: i16,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(u32::try_from(hour).ok()?, u32::try_from(minute).ok()?, 0)?;
    let start = after.date_naive();

    (0..=SEARCH_DAYS)
        .filter_map(|offset| start.checked_add_days(Days::new(offset)))
        .filter(|date| frequency.runs_on(*date))
        .map(|date| date.and_time(time).and_utc())
        .find(|candidate| *candidate > after)
}

/// `next_run_at` for a schedule in `status`. Paused schedules have none.
pub fn next_run_for(
    status: ScheduleStatus,
    frequency: Frequency,
    hour: i16,
    minute: i16,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match status {
        ScheduleStatus::Active => next_run_after(frequency, hour, minute, now),
        ScheduleStatus::Paused => None,
    }
}

/// Trim recipients and reject anything that is not an email address.
pub fn normalize_recipients(recipients: &[String]) -> Result<Vec<String>, AppError> {
    let cleaned: Vec<String> = recipients
        .iter()
        .map(|r| r.trim().to_lowercase())
        .filter(|r| !r.is_empty())
        .collect();

    if cleaned.is_empty() {
        return Err(AppError::InvalidRequest(
            "at least one recipient is required".to_string(),
        ));
    }
    if let Some(bad) = cleaned.iter().find(|r| !r.validate_email()) {
        return Err(AppError::InvalidRequest(format!(
            "'{}' is not a valid email address",
            bad
        )));
    }

    let mut unique = Vec::with_capacity(cleaned.len());
    for r in cleaned {
        if !unique.contains(&r) {
            unique.push(r);
        }
    }
    Ok(unique)
}

pub async fn list_schedules(pool: &DbPool) -> Result<Vec<ScheduledReport>, AppError> {
    let schedules = sqlx::query_as::<_, ScheduledReport>(
        "SELECT * FROM scheduled_reports ORDER BY name, created_at",
    )
    .fetch_all(pool)
    .await?;
    Ok(schedules)
}

pub async fn get_schedule(pool: &DbPool, id: Uuid) -> Result<ScheduledReport, AppError> {
    sqlx::query_as::<_, ScheduledReport>("SELECT * FROM scheduled_reports WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Scheduled report"))
}

pub async fn create_schedule(
    pool: &DbPool,
    created_by: Uuid,
    request: CreateScheduleRequest,
) -> Result<ScheduledReport, AppError> {
    let name = template_service::trimmed_name(&request.name)?;
    let recipients = normalize_recipients(&request.recipients)?;
    template_service::get_template(pool, request.template_id).await?;

    let cron = request.frequency.cron_expression(request.hour, request.minute);
    let next_run_at = next_run_for(
        request.status,
        request.frequency,
        request.hour,
        request.minute,
        Utc::now(),
    );

    let schedule = sqlx::query_as::<_, ScheduledReport>(
        r#"
        INSERT INTO scheduled_reports (
            name, template_id, frequency, hour, minute, cron_expression,
            recipients, format, status, next_run_at, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(request.template_id)
    .bind(request.frequency)
    .bind(request.hour)
    .bind(request.minute)
    .bind(&cron)
    .bind(&recipients)
    .bind(request.format)
    .bind(request.status)
    .bind(next_run_at)
    .bind(created_by)
    .fetch_one(pool)
    .await?;

    Ok(schedule)
}

/// Apply a partial update and recompute the cron expression and next run.
pub async fn update_schedule(
    pool: &DbPool,
    id: Uuid,
    request: UpdateScheduleRequest,
) -> Result<ScheduledReport, AppError> {
    let current = get_schedule(pool, id).await?;

    let name = match request.name.as_deref() {
        Some(name) => template_service::trimmed_name(name)?,
        None => current.name.as_str(),
    };
    let recipients = match &request.recipients {
        Some(list) => normalize_recipients(list)?,
        None => current.recipients,
    };
    if let Some(template_id) = request.template_id {
        template_service::get_template(pool, template_id).await?;
    }

    let frequency = request.frequency.unwrap_or(current.frequency);
    let hour = request.hour.unwrap_or(current.hour);
    let minute = request.minute.unwrap_or(current.minute);
    let status = request.status.unwrap_or(current.status);
    let cron = frequency.cron_expression(hour, minute);
    let next_run_at = next_run_for(status, frequency, hour, minute, Utc::now());

    let schedule = sqlx::query_as::<_, ScheduledReport>(
        r#"
        UPDATE scheduled_reports
        SET name = $1,
            template_id = $2,
            frequency = $3,
            hour = $4,
            minute = $5,
            cron_expression = $6,
            recipients = $7,
            format = $8,
            status = $9,
            next_run_at = $10,
            updated_at = NOW()
        WHERE id = $11
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(request.template_id.unwrap_or(current.template_id))
    .bind(frequency)
    .bind(hour)
    .bind(minute)
    .bind(&cron)
    .bind(&recipients)
    .bind(request.format.unwrap_or(current.format))
    .bind(status)
    .bind(next_run_at)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Scheduled report"))?;

    Ok(schedule)
}

pub async fn delete_schedule(pool: &DbPool, id: Uuid) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM scheduled_reports WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Scheduled report"));
    }
    Ok(())
}

/// Run a schedule now as an export owned by `user_id`.
///
/// `last_run_at` and `next_run_at` are updated whether or not the export
/// succeeds; a failed export is still a run.
pub async fn run_now(
    state: &AppState,
    id: Uuid,
    user_id: Uuid,
) -> Result<(ScheduledReport, ExportJob), AppError> {
    let schedule = get_schedule(&state.pool, id).await?;

    let request = ExportRequest {
        format: schedule.format,
        template_id: Some(schedule.template_id),
        ..Default::default()
    };
    let result = export_service::create_export(state, user_id, request).await;

    let now = Utc::now();
    let next_run_at = next_run_for(
        schedule.status,
        schedule.frequency,
        schedule.hour,
        schedule.minute,
        now,
    );
    let schedule = sqlx::query_as::<_, ScheduledReport>(
        r#"
        UPDATE scheduled_reports
        SET last_run_at = $1, next_run_at = $2, updated_at = NOW()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(now)
    .bind(next_run_at)
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    Ok((schedule, result?))
}
