//! Audit trail storage.

use chrono::Days;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        audit_log::{AuditLog, AuditLogQuery, NewAuditLog},
        pagination::{Page, Pagination},
    },
};

/// Insert an audit entry.
pub async fn record(pool: &DbPool, entry: NewAuditLog) -> Result<AuditLog, AppError> {
    let log = sqlx::query_as::<_, AuditLog>(
        r#"
        INSERT INTO audit_logs (user_id, action, resource_type, resource_id, details, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.action)
    .bind(&entry.resource_type)
    .bind(&entry.resource_id)
    .bind(&entry.details)
    .bind(&entry.ip_address)
    .bind(&entry.user_agent)
    .fetch_one(pool)
    .await?;

    Ok(log)
}

/// Insert an audit entry, logging instead of failing.
///
/// Used by handlers whose own work has already succeeded.
pub async fn record_quietly(pool: &DbPool, entry: NewAuditLog) {
    let action = entry.action;
    let resource_type = entry.resource_type.clone();
    if let Err(e) = record(pool, entry).await {
        tracing::warn!(
            error = %e,
            ?action,
            resource_type = %resource_type,
            "failed to write audit log"
        );
    }
}

fn push_filters(builder: &mut QueryBuilder<'static, Postgres>, query: &AuditLogQuery) {
    builder.push(" WHERE 1 = 1");
    if let Some(user_id) = query.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(action) = query.action {
        builder.push(" AND action = ").push_bind(action);
    }
    if let Some(resource_type) = &query.resource_type {
        builder
            .push(" AND resource_type = ")
            .push_bind(resource_type.clone());
    }
    if let Some(from) = query.date_from {
        builder
            .push(" AND created_at >= ")
            .push_bind(from.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()));
    }
    // Inclusive end date: everything before the following midnight
    if let Some(to) = query.date_to.and_then(|d| d.checked_add_days(Days::new(1))) {
        builder
            .push(" AND created_at < ")
            .push_bind(to.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()));
    }
}

/// List entries newest first.
pub async fn list_logs(pool: &DbPool, query: &AuditLogQuery) -> Result<Page<AuditLog>, AppError> {
    if let (Some(from), Some(to)) = (query.date_from, query.date_to) {
        if from > to {
            return Err(AppError::InvalidRequest(
                "date_from must not be after date_to".to_string(),
            ));
        }
    }
    let pagination = Pagination::new(query.page, query.per_page);

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM audit_logs");
    push_filters(&mut count, query);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut select = QueryBuilder::new("SELECT * FROM audit_logs");
    push_filters(&mut select, query);
    select
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let items = select.build_query_as::<AuditLog>().fetch_all(pool).await?;

    Ok(Page::new(items, pagination, total))
}

pub async fn get_log(pool: &DbPool, id: Uuid) -> Result<AuditLog, AppError> {
    sqlx::query_as::<_, AuditLog>("SELECT * FROM audit_logs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Audit log"))
}

pub async fn delete_log(pool: &DbPool, id: Uuid) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM audit_logs WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Audit log"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audit_log::AuditAction;
    use chrono::NaiveDate;

    #[test]
    fn test_filters_bind_every_value() {
        let query = AuditLogQuery {
            user_id: Some(Uuid::new_v4()),
            action: Some(AuditAction::Export),
            resource_type: Some("export".to_string()),
            date_from: NaiveDate::from_ymd_opt(2025, 1, 1),
            date_to: NaiveDate::from_ymd_opt(2025, 1, 31),
            ..Default::default()
        };
        let mut builder = QueryBuilder::new("SELECT * FROM audit_logs");
        push_filters(&mut builder, &query);
        let sql = builder.sql();

        assert!(sql.contains("user_id = $1"));
        assert!(sql.contains("action = $2"));
        assert!(sql.contains("resource_type = $3"));
        assert!(sql.contains("created_at >= $4"));
        assert!(sql.contains("created_at < $5"));
    }

    #[test]
    fn test_no_filters() {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM audit_logs");
        push_filters(&mut builder, &AuditLogQuery::default());
        assert_eq!(builder.sql(), "SELECT COUNT(*) FROM audit_logs WHERE 1 = 1");
    }
}
