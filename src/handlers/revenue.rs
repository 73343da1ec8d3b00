//! Revenue report and commission rule HTTP handlers.
//!
//! - GET /api/v1/revenue/summary - Totals for the filtered records
//! - GET /api/v1/revenue/timeseries - Totals bucketed by period
//! - GET /api/v1/revenue/breakdown - Totals grouped by a dimension
//! - GET /api/v1/revenue/transactions - Paged records with computed figures
//! - GET/POST /api/v1/revenue/commission-rules, PUT/DELETE /api/v1/revenue/commission-rules/{id}
//!
//! Every revenue endpoint accepts the same filter query string (see
//! `RevenueQuery`) plus `source=database|zoho`.

use axum::{Extension, Json, extract::State, http::StatusCode};
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
        commission::{CommissionRule, CommissionRuleRequest},
        pagination::{Page, Pagination},
        revenue::{BreakdownRow, RevenueQuery, RevenueSummary, RevenueTransaction, TimeseriesPoint},
        user::Permission,
    },
    services::{audit_service, commission_service, revenue_service},
    state::AppState,
};

/// Revenue summary.
///
/// # Endpoint
///
/// `GET /api/v1/revenue/summary?date_from=2025-01-01&date_to=2025-03-31`
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "transaction_count": 42,
///   "total_disbursed": "1250000.00",
///   "gross_revenue": "31250.00",
///   "total_combined_revenue": "33100.00",
///   "vendor_costs": "2100.00",
///   "employee_commissions": "6200.00",
///   "referral_commissions": "1500.00",
///   "final_net_profit": "23300.00",
///   "profit_margin": "70.39",
///   "average_revenue_per_transaction": "788.10"
/// }
/// ```
pub async fn summary(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<RevenueQuery>,
) -> Result<Json<RevenueSummary>, AppError> {
    auth.require(Permission::ViewReports)?;

    let filter = query.filter();
    let source = state.revenue_source(query.source.unwrap_or_default());
    Ok(Json(revenue_service::summary(source, &filter).await?))
}

/// Revenue over time. `granularity` is one of day, week, month (default),
/// quarter or year. Periods without records are omitted.
pub async fn timeseries(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<RevenueQuery>,
) -> Result<Json<Vec<TimeseriesPoint>>, AppError> {
    auth.require(Permission::ViewReports)?;

    let filter = query.filter();
    let granularity = query.granularity.unwrap_or_default();
    let source = state.revenue_source(query.source.unwrap_or_default());
    Ok(Json(
        revenue_service::timeseries(source, &filter, granularity).await?,
    ))
}

/// Revenue grouped by `dimension` (insurance_company, employee,
/// referral_partner or vendor), largest first.
pub async fn breakdown(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<RevenueQuery>,
) -> Result<Json<Vec<BreakdownRow>>, AppError> {
    auth.require(Permission::ViewReports)?;

    let filter = query.filter();
    let dimension = query.dimension.unwrap_or_default();
    let source = state.revenue_source(query.source.unwrap_or_default());
    Ok(Json(
        revenue_service::breakdown(source, &filter, dimension).await?,
    ))
}

/// Individual transactions, newest disbursement first.
pub async fn transactions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<RevenueQuery>,
) -> Result<Json<Page<RevenueTransaction>>, AppError> {
    auth.require(Permission::ViewReports)?;

    let filter = query.filter();
    let pagination = Pagination::new(query.page, query.per_page);
    let source = state.revenue_source(query.source.unwrap_or_default());
    Ok(Json(
        revenue_service::transactions_page(source, &filter, pagination).await?,
    ))
}

pub async fn list_commission_rules(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<CommissionRule>>, AppError> {
    auth.require(Permission::ViewReports)?;
    Ok(Json(commission_service::list_rules(&pool).await?))
}

/// Create a commission rule.
///
/// # Request Body
///
/// ```json
/// {
///   "employee_id": "...",
///   "insurance_company": "Acme Life",
///   "priority": 10,
///   "percentage": "12.5",
///   "flat_amount": "0",
///   "effective_from": "2025-01-01"
/// }
/// ```
///
/// Omit `insurance_company` for a rule that applies to every company.
///
/// # Response
///
/// - **Success (201 Created)**: the rule
/// - **Error (400)**: out-of-range values or inverted dates
/// - **Error (404)**: unknown employee
pub async fn create_commission_rule(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiJson(request): ApiJson<CommissionRuleRequest>,
) -> Result<(StatusCode, Json<CommissionRule>), AppError> {
    auth.require(Permission::ManageUsers)?;

    let rule = commission_service::create_rule(&pool, request).await?;

    audit_service::record_quietly(
        &pool,
        audit_entry(&auth, &client, AuditAction::Create, "commission_rule")
            .resource(rule.id)
            .details(json!({
                "employee_id": rule.employee_id,
                "insurance_company": rule.insurance_company,
                "percentage": rule.percentage,
            })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(rule)))
}

/// Replace a commission rule.
pub async fn update_commission_rule(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<CommissionRuleRequest>,
) -> Result<Json<CommissionRule>, AppError> {
    auth.require(Permission::ManageUsers)?;

    let rule = commission_service::update_rule(&pool, id, request).await?;

    audit_service::record_quietly(
        &pool,
        audit_entry(&auth, &client, AuditAction::Update, "commission_rule")
            .resource(id)
            .details(json!({
                "percentage": rule.percentage,
                "flat_amount": rule.flat_amount,
                "is_active": rule.is_active,
            })),
    )
    .await;

    Ok(Json(rule))
}

pub async fn delete_commission_rule(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require(Permission::ManageUsers)?;
    commission_service::delete_rule(&pool, id).await?;

    audit_service::record_quietly(
        &pool,
        audit_entry(&auth, &client, AuditAction::Delete, "commission_rule").resource(id),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
