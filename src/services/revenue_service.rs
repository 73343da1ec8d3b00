//! Revenue reports over either data source.
//!
//! Records are read from Postgres or Zoho, then run through the same
//! arithmetic in `revenue_calc`. Commission rules always come from Postgres.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        pagination::{Page, Pagination},
        revenue::{
            BreakdownRow, DataSource, Dimension, Granularity, RevenueFilter, RevenueMasterRecord,
            RevenueSummary, RevenueTransaction, TimeseriesPoint,
        },
    },
    services::{
        commission_service,
        revenue_calc::{self, CommissionBook},
        revenue_query,
        zoho_client::ZohoClient,
    },
};

/// Where to read records from for one request.
#[derive(Clone, Copy)]
pub struct RevenueSource<'a> {
    pub pool: &'a DbPool,
    pub zoho: Option<&'a ZohoClient>,
    pub source: DataSource,
}

impl<'a> RevenueSource<'a> {
    /// The configured Zoho client, or 400 when `source=zoho` is not available.
    fn zoho(&self) -> Result<&'a ZohoClient, AppError> {
        self.zoho.ok_or_else(|| {
            AppError::InvalidRequest("The Zoho Analytics source is not configured".to_string())
        })
    }
}

/// Load every commission rule and employee name.
pub async fn load_commission_book(pool: &DbPool) -> Result<CommissionBook, AppError> {
    let rules = commission_service::list_rules(pool).await?;
    let names: HashMap<Uuid, String> =
        sqlx::query_as::<_, (Uuid, String)>("SELECT id, full_name FROM employees")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();
    Ok(CommissionBook::new(rules, names))
}

/// Number of records matching `filter`.
pub async fn count_records(
    source: RevenueSource<'_>,
    filter: &RevenueFilter,
) -> Result<i64, AppError> {
    revenue_query::validate_filter(filter)?;
    match source.source {
        DataSource::Database => {
            let count: i64 = revenue_query::build_count_query(filter)
                .build_query_scalar()
                .fetch_one(source.pool)
                .await?;
            Ok(count)
        }
        DataSource::Zoho => {
            let records = source.zoho()?.fetch_records(filter).await?;
            Ok(records.len() as i64)
        }
    }
}

/// Every record matching `filter`, newest first.
pub async fn fetch_records(
    source: RevenueSource<'_>,
    filter: &RevenueFilter,
) -> Result<Vec<RevenueMasterRecord>, AppError> {
    revenue_query::validate_filter(filter)?;
    match source.source {
        DataSource::Database => {
            let records = revenue_query::build_records_query(filter, None)
                .build_query_as::<RevenueMasterRecord>()
                .fetch_all(source.pool)
                .await?;
            Ok(records)
        }
        DataSource::Zoho => source.zoho()?.fetch_records(filter).await,
    }
}

/// Every matching record with its derived figures.
pub async fn load_transactions(
    source: RevenueSource<'_>,
    filter: &RevenueFilter,
) -> Result<Vec<RevenueTransaction>, AppError> {
    let records = fetch_records(source, filter).await?;
    let book = load_commission_book(source.pool).await?;
    Ok(revenue_calc::compute_all(records, &book))
}

pub async fn summary(
    source: RevenueSource<'_>,
    filter: &RevenueFilter,
) -> Result<RevenueSummary, AppError> {
    let transactions = load_transactions(source, filter).await?;
    Ok(revenue_calc::summarize(&transactions))
}

pub async fn timeseries(
    source: RevenueSource<'_>,
    filter: &RevenueFilter,
    granularity: Granularity,
) -> Result<Vec<TimeseriesPoint>, AppError> {
    let transactions = load_transactions(source, filter).await?;
    Ok(revenue_calc::timeseries(&transactions, granularity))
}

pub async fn breakdown(
    source: RevenueSource<'_>,
    filter: &RevenueFilter,
    dimension: Dimension,
) -> Result<Vec<BreakdownRow>, AppError> {
    let transactions = load_transactions(source, filter).await?;
    Ok(revenue_calc::breakdown(&transactions, dimension))
}

/// One page of transactions, newest first.
///
/// Postgres pages in SQL. Zoho has no paging in its SQL export, so its
/// result is paged in memory.
pub async fn transactions_page(
    source: RevenueSource<'_>,
    filter: &RevenueFilter,
    pagination: Pagination,
) -> Result<Page<RevenueTransaction>, AppError> {
    revenue_query::validate_filter(filter)?;

    let (records, total) = match source.source {
        DataSource::Database => {
            let total: i64 = revenue_query::build_count_query(filter)
                .build_query_scalar()
                .fetch_one(source.pool)
                .await?;
            let records = revenue_query::build_records_query(filter, Some(pagination))
                .build_query_as::<RevenueMasterRecord>()
                .fetch_all(source.pool)
                .await?;
            (records, total)
        }
        DataSource::Zoho => {
            let all = source.zoho()?.fetch_records(filter).await?;
            let total = all.len() as i64;
            let records = all
                .into_iter()
                .skip(pagination.offset() as usize)
                .take(pagination.limit() as usize)
                .collect();
            (records, total)
        }
    };

    let book = load_commission_book(source.pool).await?;
    let items = revenue_calc::compute_all(records, &book);
    Ok(Page::new(items, pagination, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zoho_source_requires_configuration() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let source = RevenueSource {
            pool: &pool,
            zoho: None,
            source: DataSource::Zoho,
        };

        let err = fetch_records(source, &RevenueFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_invalid_filter_rejected_before_querying() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let source = RevenueSource {
            pool: &pool,
            zoho: None,
            source: DataSource::Database,
        };
        let filter = RevenueFilter {
            date_from: chrono::NaiveDate::from_ymd_opt(2025, 2, 1),
            date_to: chrono::NaiveDate::from_ymd_opt(2025, 1, 1),
            ..Default::default()
        };

        let err = summary(source, &filter).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }
}
