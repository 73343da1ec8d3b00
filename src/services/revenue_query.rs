//! SQL for reading `revenue_master_view`.
//!
//! Filters are always pushed as bound parameters; the only text spliced into
//! the statement is fixed column names.

use sqlx::{Postgres, QueryBuilder};

use crate::{error::AppError, models::pagination::Pagination, models::revenue::RevenueFilter};

/// Columns selected from the view, in `RevenueMasterRecord` order.
pub const RECORD_COLUMNS: &str = "transaction_id, disbursement_date, insurance_company, \
    client_name, policy_number, status, disbursement_amount, fee_percentage, flat_fee, \
    additional_revenue, vendor_name, vendor_cost_percentage, vendor_flat_cost, employee_ids, \
    referral_partner_id, referral_partner_name, referral_percentage, referral_flat_fee";

/// Reject filters whose bounds are inverted.
pub fn validate_filter(filter: &RevenueFilter) -> Result<(), AppError> {
    if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
        if from > to {
            return Err(AppError::InvalidRequest(
                "date_from must not be after date_to".to_string(),
            ));
        }
    }
    if let (Some(min), Some(max)) = (filter.min_amount, filter.max_amount) {
        if min > max {
            return Err(AppError::InvalidRequest(
                "min_amount must not be greater than max_amount".to_string(),
            ));
        }
    }
    Ok(())
}

/// Escape `LIKE` wildcards so user text matches literally.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Append ` WHERE ...` for `filter`.
///
/// Cancelled disbursements are left out unless `include_cancelled` is set or
/// the filter asks for `status = cancelled` explicitly.
pub fn push_filters(builder: &mut QueryBuilder<'static, Postgres>, filter: &RevenueFilter) {
    builder.push(" WHERE 1 = 1");

    if let Some(from) = filter.date_from {
        builder.push(" AND disbursement_date >= ").push_bind(from);
    }
    if let Some(to) = filter.date_to {
        builder.push(" AND disbursement_date <= ").push_bind(to);
    }

    if !filter.insurance_companies.is_empty() {
        let companies: Vec<String> = filter
            .insurance_companies
            .iter()
            .map(|c| c.to_lowercase())
            .collect();
        builder
            .push(" AND LOWER(insurance_company) = ANY(")
            .push_bind(companies)
            .push(")");
    }

    if let Some(employee_id) = filter.employee_id {
        builder
            .push(" AND ")
            .push_bind(employee_id)
            .push(" = ANY(employee_ids)");
    }
    if let Some(partner_id) = filter.referral_partner_id {
        builder
            .push(" AND referral_partner_id = ")
            .push_bind(partner_id);
    }
    if let Some(vendor) = &filter.vendor {
        builder
            .push(" AND LOWER(vendor_name) = ")
            .push_bind(vendor.to_lowercase());
    }

    match filter.status {
        Some(status) => {
            builder.push(" AND status = ").push_bind(status);
        }
        None if !filter.include_cancelled => {
            builder.push(" AND status <> 'cancelled'");
        }
        None => {}
    }

    if let Some(min) = filter.min_amount {
        builder.push(" AND disbursement_amount >= ").push_bind(min);
    }
    if let Some(max) = filter.max_amount {
        builder.push(" AND disbursement_amount <= ").push_bind(max);
    }

    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", escape_like(search));
        builder
            .push(" AND (client_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR policy_number ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

/// `SELECT` of matching records, newest first, optionally one page.
pub fn build_records_query(
    filter: &RevenueFilter,
    page: Option<Pagination>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {} FROM revenue_master_view", RECORD_COLUMNS));
    push_filters(&mut builder, filter);
    builder.push(" ORDER BY disbursement_date DESC, transaction_id DESC");

    if let Some(page) = page {
        builder
            .push(" LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
    }
    builder
}

/// `SELECT COUNT(*)` of matching records.
pub fn build_count_query(filter: &RevenueFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM revenue_master_view");
    push_filters(&mut builder, filter);
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::revenue::DisbursementStatus;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_default_filter_excludes_cancelled() {
        let builder = build_records_query(&RevenueFilter::default(), None);
        let sql = builder.sql();
        assert!(sql.contains("status <> 'cancelled'"));
        assert!(sql.ends_with("ORDER BY disbursement_date DESC, transaction_id DESC"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn test_include_cancelled_drops_status_clause() {
        let filter = RevenueFilter {
            include_cancelled: true,
            ..Default::default()
        };
        let builder = build_count_query(&filter);
        assert!(!builder.sql().contains("status"));
    }

    #[test]
    fn test_explicit_status_is_bound() {
        let filter = RevenueFilter {
            status: Some(DisbursementStatus::Cancelled),
            ..Default::default()
        };
        let builder = build_count_query(&filter);
        let sql = builder.sql();
        assert!(sql.contains("status = $1"));
        assert!(!sql.contains("<> 'cancelled'"));
    }

    #[test]
    fn test_all_filters_use_placeholders() {
        let filter = RevenueFilter {
            date_from: NaiveDate::from_ymd_opt(2025, 1, 1),
            date_to: NaiveDate::from_ymd_opt(2025, 12, 31),
            insurance_companies: vec!["Acme Life".to_string()],
            employee_id: Some(Uuid::new_v4()),
            referral_partner_id: Some(Uuid::new_v4()),
            vendor: Some("ClaimsCo".to_string()),
            status: None,
            min_amount: Some(dec!(10)),
            max_amount: Some(dec!(5000)),
            search: Some("O'Brien".to_string()),
            include_cancelled: false,
        };
        let builder = build_records_query(&filter, Some(Pagination::new(Some(2), Some(20))));
        let sql = builder.sql();

        assert!(sql.contains("disbursement_date >= $1"));
        assert!(sql.contains("disbursement_date <= $2"));
        assert!(sql.contains("LOWER(insurance_company) = ANY($3)"));
        assert!(sql.contains("$4 = ANY(employee_ids)"));
        assert!(sql.contains("referral_partner_id = $5"));
        assert!(sql.contains("LOWER(vendor_name) = $6"));
        assert!(sql.contains("disbursement_amount >= $7"));
        assert!(sql.contains("disbursement_amount <= $8"));
        assert!(sql.contains("client_name ILIKE $9 OR policy_number ILIKE $10"));
        assert!(sql.contains("LIMIT $11 OFFSET $12"));
        assert!(!sql.contains("O'Brien"));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let dates = RevenueFilter {
            date_from: NaiveDate::from_ymd_opt(2025, 2, 1),
            date_to: NaiveDate::from_ymd_opt(2025, 1, 1),
            ..Default::default()
        };
        assert!(matches!(
            validate_filter(&dates),
            Err(AppError::InvalidRequest(_))
        ));

        let amounts = RevenueFilter {
            min_amount: Some(dec!(100)),
            max_amount: Some(dec!(1)),
            ..Default::default()
        };
        assert!(validate_filter(&amounts).is_err());

        let same_day = RevenueFilter {
            date_from: NaiveDate::from_ymd_opt(2025, 1, 1),
            date_to: NaiveDate::from_ymd_opt(2025, 1, 1),
            ..Default::default()
        };
        assert!(validate_filter(&same_day).is_ok());
    }
}
