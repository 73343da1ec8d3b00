//! Revenue records, derived figures, filters and aggregate shapes.
//!
//! A `RevenueMasterRecord` is one row of `revenue_master_view`: a disbursement
//! joined with its fee, vendor, employee and referral-partner data. The
//! figures derived from it (`RevenueFigures`) are computed in
//! `services::revenue_calc`, never stored.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Maps to the `disbursement_status` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "disbursement_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DisbursementStatus {
    Pending,
    Completed,
    Cancelled,
}

impl DisbursementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DisbursementStatus::Pending => "pending",
            DisbursementStatus::Completed => "completed",
            DisbursementStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for DisbursementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(DisbursementStatus::Pending),
            "completed" => Ok(DisbursementStatus::Completed),
            "cancelled" | "canceled" => Ok(DisbursementStatus::Cancelled),
            other => Err(format!("unknown disbursement status '{}'", other)),
        }
    }
}

/// One row of `revenue_master_view`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RevenueMasterRecord {
    pub transaction_id: Uuid,
    pub disbursement_date: NaiveDate,
    pub insurance_company: String,
    pub client_name: String,
    pub policy_number: Option<String>,
    pub status: DisbursementStatus,

    /// Amount paid out to the insurance company
    pub disbursement_amount: Decimal,
    /// Percentage of the disbursement charged as a fee
    pub fee_percentage: Decimal,
    pub flat_fee: Decimal,
    /// Overrides, bonuses and other revenue outside the fee
    pub additional_revenue: Decimal,

    pub vendor_name: Option<String>,
    pub vendor_cost_percentage: Decimal,
    pub vendor_flat_cost: Decimal,

    /// Employees credited on the transaction
    pub employee_ids: Vec<Uuid>,

    pub referral_partner_id: Option<Uuid>,
    pub referral_partner_name: Option<String>,
    pub referral_percentage: Decimal,
    pub referral_flat_fee: Decimal,
}

/// Commission earned by one employee on one transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeCommission {
    pub employee_id: Uuid,
    pub employee_name: Option<String>,
    /// Rule that produced the amount; `None` when no rule matched
    pub rule_id: Option<Uuid>,
    pub amount: Decimal,
}

/// Figures derived from a single record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueFigures {
    pub gross_revenue: Decimal,
    pub total_combined_revenue: Decimal,
    pub vendor_cost: Decimal,
    pub commission_base: Decimal,
    pub employee_commission: Decimal,
    pub employee_commissions: Vec<EmployeeCommission>,
    pub referral_commission: Decimal,
    pub final_net_profit: Decimal,
}

/// A record together with its derived figures.
#[derive(Debug, Clone, Serialize)]
pub struct RevenueTransaction {
    #[serde(flatten)]
    pub record: RevenueMasterRecord,
    #[serde(flatten)]
    pub figures: RevenueFigures,
}

/// Running totals over a set of transactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RevenueTotals {
    pub transaction_count: i64,
    pub total_disbursed: Decimal,
    pub gross_revenue: Decimal,
    pub total_combined_revenue: Decimal,
    pub vendor_costs: Decimal,
    pub employee_commissions: Decimal,
    pub referral_commissions: Decimal,
    pub final_net_profit: Decimal,
}

impl RevenueTotals {
    pub fn add(&mut self, transaction: &RevenueTransaction) {
        let figures = &transaction.figures;
        self.transaction_count += 1;
        self.total_disbursed += transaction.record.disbursement_amount;
        self.gross_revenue += figures.gross_revenue;
        self.total_combined_revenue += figures.total_combined_revenue;
        self.vendor_costs += figures.vendor_cost;
        self.employee_commissions += figures.employee_commission;
        self.referral_commissions += figures.referral_commission;
        self.final_net_profit += figures.final_net_profit;
    }
}

/// Dashboard KPI cards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueSummary {
    #[serde(flatten)]
    pub totals: RevenueTotals,
    /// Final net profit as a percentage of total combined revenue
    pub profit_margin: Decimal,
    pub average_revenue_per_transaction: Decimal,
}

/// Time bucket size for the revenue chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "report_granularity", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    Week,
    #[default]
    Month,
    Quarter,
    Year,
}

impl Granularity {
    /// First day of the bucket containing `date`. Weeks start on Monday.
    pub fn bucket_start(self, date: NaiveDate) -> NaiveDate {
        let start = match self {
            Granularity::Day => Some(date),
            Granularity::Week => date
                .checked_sub_days(chrono::Days::new(u64::from(
                    date.weekday().num_days_from_monday(),
                ))),
            Granularity::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1),
            Granularity::Quarter => {
                NaiveDate::from_ymd_opt(date.year(), (date.month() - 1) / 3 * 3 + 1, 1)
            }
            Granularity::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1),
        };
        start.unwrap_or(date)
    }

    /// Human label for a bucket starting at `start`.
    pub fn label(self, start: NaiveDate) -> String {
        match self {
            Granularity::Day => start.format("%Y-%m-%d").to_string(),
            Granularity::Week => {
                let iso = start.iso_week();
                format!("{}-W{:02}", iso.year(), iso.week())
            }
            Granularity::Month => start.format("%Y-%m").to_string(),
            Granularity::Quarter => format!("{}-Q{}", start.year(), (start.month() - 1) / 3 + 1),
            Granularity::Year => start.year().to_string(),
        }
    }
}

/// One point of the revenue time series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeseriesPoint {
    pub period_start: NaiveDate,
    pub label: String,
    #[serde(flatten)]
    pub totals: RevenueTotals,
}

/// Grouping key for the breakdown table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "breakdown_dimension", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    #[default]
    InsuranceCompany,
    Employee,
    ReferralPartner,
    Vendor,
}

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::InsuranceCompany => "insurance_company",
            Dimension::Employee => "employee",
            Dimension::ReferralPartner => "referral_partner",
            Dimension::Vendor => "vendor",
        }
    }
}

/// One row of the breakdown table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownRow {
    pub key: String,
    pub label: String,
    pub transaction_count: i64,
    pub total_combined_revenue: Decimal,
    pub employee_commission: Decimal,
    pub referral_commission: Decimal,
    pub final_net_profit: Decimal,
}

/// Where revenue records are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    #[default]
    Database,
    Zoho,
}

/// Filters applied to `revenue_master_view`.
///
/// Stored as JSON inside report templates, so every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueFilter {
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub insurance_companies: Vec<String>,
    #[serde(default)]
    pub employee_id: Option<Uuid>,
    #[serde(default)]
    pub referral_partner_id: Option<Uuid>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub status: Option<DisbursementStatus>,
    #[serde(default)]
    pub min_amount: Option<Decimal>,
    #[serde(default)]
    pub max_amount: Option<Decimal>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub include_cancelled: bool,
}

/// Query string accepted by every `/api/v1/revenue/*` endpoint.
///
/// `insurance_company` is a comma-separated list.
#[derive(Debug, Default, Deserialize)]
pub struct RevenueQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub insurance_company: Option<String>,
    pub employee_id: Option<Uuid>,
    pub referral_partner_id: Option<Uuid>,
    pub vendor: Option<String>,
    pub status: Option<DisbursementStatus>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub search: Option<String>,
    pub include_cancelled: Option<bool>,
    pub source: Option<DataSource>,
    pub granularity: Option<Granularity>,
    pub dimension: Option<Dimension>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl RevenueQuery {
    pub fn filter(&self) -> RevenueFilter {
        let insurance_companies = self
            .insurance_company
            .as_deref()
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        RevenueFilter {
            date_from: self.date_from,
            date_to: self.date_to,
            insurance_companies,
            employee_id: self.employee_id,
            referral_partner_id: self.referral_partner_id,
            vendor: non_blank(self.vendor.as_deref()),
            status: self.status,
            min_amount: self.min_amount,
            max_amount: self.max_amount,
            search: non_blank(self.search.as_deref()),
            include_cancelled: self.include_cancelled.unwrap_or(false),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
