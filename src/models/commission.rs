//! Employee commission rules.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a row of `commission_rules` joined with the employee name.
///
/// A rule with no `insurance_company` applies to every company. When several
/// rules of one employee apply to a transaction, the company-specific one
/// wins, then the lowest `priority`, then the latest `effective_from`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct CommissionRule {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub employee_name: String,
    pub insurance_company: Option<String>,
    pub priority: i32,
    pub percentage: Decimal,
    pub flat_amount: Decimal,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommissionRule {
    /// Whether the rule is in force on `date` (both bounds inclusive).
    pub fn effective_on(&self, date: NaiveDate) -> bool {
        self.effective_from <= date && self.effective_to.is_none_or(|to| to >= date)
    }

    /// Whether the rule covers `company` (case-insensitive).
    pub fn covers_company(&self, company: &str) -> bool {
        self.insurance_company
            .as_deref()
            .is_none_or(|c| c.trim().eq_ignore_ascii_case(company.trim()))
    }
}

/// Request body for creating or replacing a commission rule.
#[derive(Debug, Clone, Deserialize)]
pub struct CommissionRuleRequest {
    pub employee_id: Uuid,
    pub insurance_company: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    pub percentage: Decimal,
    #[serde(default)]
    pub flat_amount: Decimal,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_priority() -> i32 {
    100
}

fn default_active() -> bool {
    true
}
