//! Revenue arithmetic: per-record figures, commission matching and aggregation.
//!
//! Everything here is pure and synchronous. Records come from the database
//! view or from Zoho; commission rules always come from the database and are
//! indexed in a `CommissionBook`.
//!
//! # Formulas
//!
//! ```text
//! gross_revenue          = disbursement_amount * fee_percentage / 100 + flat_fee
//! total_combined_revenue = gross_revenue + additional_revenue
//! vendor_cost            = total_combined_revenue * vendor_cost_percentage / 100 + vendor_flat_cost
//! commission_base        = max(total_combined_revenue - vendor_cost, 0)
//! employee_commission    = sum(commission_base * rule.percentage / 100 + rule.flat_amount)
//! referral_commission    = commission_base * referral_percentage / 100 + referral_flat_fee
//! final_net_profit       = total_combined_revenue - vendor_cost
//!                          - employee_commission - referral_commission
//! ```
//!
//! Each amount is rounded to cents before it feeds the next line, so the
//! profit identity holds exactly on the rounded values.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::models::{
    commission::CommissionRule,
    revenue::{
        BreakdownRow, Dimension, EmployeeCommission, Granularity, RevenueFigures,
        RevenueMasterRecord, RevenueSummary, RevenueTotals, RevenueTransaction, TimeseriesPoint,
    },
};

/// Key and label used for rows without a partner, vendor or employee.
pub const UNASSIGNED: &str = "unassigned";

/// Round to cents, halves away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn percent_of(amount: Decimal, percentage: Decimal) -> Decimal {
    amount * percentage / Decimal::ONE_HUNDRED
}

/// Commission rules grouped by employee, plus employee display names.
#[derive(Debug, Clone, Default)]
pub struct CommissionBook {
    rules: HashMap<Uuid, Vec<CommissionRule>>,
    names: HashMap<Uuid, String>,
}

impl CommissionBook {
    pub fn new(rules: Vec<CommissionRule>, names: HashMap<Uuid, String>) -> Self {
        let mut by_employee: HashMap<Uuid, Vec<CommissionRule>> = HashMap::new();
        for rule in rules {
            by_employee.entry(rule.employee_id).or_default().push(rule);
        }
        Self {
            rules: by_employee,
            names,
        }
    }

    /// Display name of an employee, from the employee table or any of their rules.
    pub fn employee_name(&self, employee_id: Uuid) -> Option<&str> {
        self.names.get(&employee_id).map(String::as_str).or_else(|| {
            self.rules
                .get(&employee_id)
                .and_then(|rules| rules.first())
                .map(|r| r.employee_name.as_str())
        })
    }

    /// Pick the rule that pays `employee_id` on a transaction with `company` dated `date`.
    ///
    /// Candidates are active rules in force on `date` that cover `company`.
    /// Company-specific rules beat generic ones; ties go to the lowest
    /// priority number, then to the most recent `effective_from`.
    pub fn match_rule(
        &self,
        employee_id: Uuid,
        company: &str,
        date: NaiveDate,
    ) -> Option<&CommissionRule> {
        self.rules
            .get(&employee_id)?
            .iter()
            .filter(|r| r.is_active && r.effective_on(date) && r.covers_company(company))
            .min_by(|a, b| {
                b.insurance_company
                    .is_some()
                    .cmp(&a.insurance_company.is_some())
                    .then(a.priority.cmp(&b.priority))
                    .then(b.effective_from.cmp(&a.effective_from))
            })
    }
}

/// Compute the derived figures of one record.
pub fn compute_figures(record: &RevenueMasterRecord, book: &CommissionBook) -> RevenueFigures {
    let gross_revenue =
        round_money(percent_of(record.disbursement_amount, record.fee_percentage) + record.flat_fee);
    let total_combined_revenue = round_money(gross_revenue + record.additional_revenue);

    let vendor_cost = if record.vendor_name.is_some() {
        round_money(
            percent_of(total_combined_revenue, record.vendor_cost_percentage)
                + record.vendor_flat_cost,
        )
    } else {
        Decimal::ZERO
    };

    let commission_base = (total_combined_revenue - vendor_cost).max(Decimal::ZERO);

    let mut employee_commissions: Vec<EmployeeCommission> = Vec::new();
    for &employee_id in &record.employee_ids {
        if employee_commissions.iter().any(|c| c.employee_id == employee_id) {
            continue;
        }
        let rule = book.match_rule(employee_id, &record.insurance_company, record.disbursement_date);
        let amount = rule
            .map(|r| round_money(percent_of(commission_base, r.percentage) + r.flat_amount))
            .unwrap_or(Decimal::ZERO);
        employee_commissions.push(EmployeeCommission {
            employee_id,
            employee_name: book.employee_name(employee_id).map(str::to_string),
            rule_id: rule.map(|r| r.id),
            amount,
        });
    }
    let employee_commission: Decimal = employee_commissions.iter().map(|c| c.amount).sum();

    let has_referral =
        record.referral_partner_id.is_some() || record.referral_partner_name.is_some();
    let referral_commission = if has_referral {
        round_money(percent_of(commission_base, record.referral_percentage) + record.referral_flat_fee)
    } else {
        Decimal::ZERO
    };

    let final_net_profit =
        total_combined_revenue - vendor_cost - employee_commission - referral_commission;

    RevenueFigures {
        gross_revenue,
        total_combined_revenue,
        vendor_cost,
        commission_base,
        employee_commission,
        employee_commissions,
        referral_commission,
        final_net_profit,
    }
}

/// Attach figures to every record.
pub fn compute_all(records: Vec<RevenueMasterRecord>, book: &CommissionBook) -> Vec<RevenueTransaction> {
    records
        .into_iter()
        .map(|record| {
            let figures = compute_figures(&record, book);
            RevenueTransaction { record, figures }
        })
        .collect()
}

/// KPI summary over all transactions.
pub fn summarize(transactions: &[RevenueTransaction]) -> RevenueSummary {
    let mut totals = RevenueTotals::default();
    for t in transactions {
        totals.add(t);
    }

    let profit_margin = if totals.total_combined_revenue.is_zero() {
        Decimal::ZERO
    } else {
        round_money(totals.final_net_profit / totals.total_combined_revenue * Decimal::ONE_HUNDRED)
    };
    let average_revenue_per_transaction = if totals.transaction_count == 0 {
        Decimal::ZERO
    } else {
        round_money(totals.total_combined_revenue / Decimal::from(totals.transaction_count))
    };

    RevenueSummary {
        totals,
        profit_margin,
        average_revenue_per_transaction,
    }
}

/// Totals per time bucket, ascending by bucket start. Empty buckets are omitted.
pub fn timeseries(transactions: &[RevenueTransaction], granularity: Granularity) -> Vec<TimeseriesPoint> {
    let mut buckets: BTreeMap<NaiveDate, RevenueTotals> = BTreeMap::new();
    for t in transactions {
        let start = granularity.bucket_start(t.record.disbursement_date);
        buckets.entry(start).or_default().add(t);
    }

    buckets
        .into_iter()
        .map(|(period_start, totals)| TimeseriesPoint {
            period_start,
            label: granularity.label(period_start),
            totals,
        })
        .collect()
}

struct BreakdownAccumulator {
    label: String,
    row: BreakdownRow,
}

impl BreakdownAccumulator {
    fn new(key: String, label: String) -> Self {
        Self {
            row: BreakdownRow {
                key,
                label: label.clone(),
                transaction_count: 0,
                total_combined_revenue: Decimal::ZERO,
                employee_commission: Decimal::ZERO,
                referral_commission: Decimal::ZERO,
                final_net_profit: Decimal::ZERO,
            },
            label,
        }
    }

    fn add(&mut self, figures: &RevenueFigures, employee_commission: Decimal) {
        self.row.transaction_count += 1;
        self.row.total_combined_revenue += figures.total_combined_revenue;
        self.row.employee_commission += employee_commission;
        self.row.referral_commission += figures.referral_commission;
        self.row.final_net_profit += figures.final_net_profit;
    }
}

/// Totals grouped by `dimension`, sorted by combined revenue descending.
///
/// For the employee dimension a transaction counts toward every employee on
/// it, and `employee_commission` is that employee's own share.
pub fn breakdown(transactions: &[RevenueTransaction], dimension: Dimension) -> Vec<BreakdownRow> {
    let mut groups: HashMap<String, BreakdownAccumulator> = HashMap::new();

    let mut add = |key: String, label: String, figures: &RevenueFigures, commission: Decimal| {
        groups
            .entry(key.clone())
            .or_insert_with(|| BreakdownAccumulator::new(key, label))
            .add(figures, commission);
    };

    for t in transactions {
        let record = &t.record;
        let figures = &t.figures;
        match dimension {
            Dimension::InsuranceCompany => add(
                record.insurance_company.clone(),
                record.insurance_company.clone(),
                figures,
                figures.employee_commission,
            ),
            Dimension::Vendor => {
                let name = record.vendor_name.clone();
                add(
                    name.clone().unwrap_or_else(|| UNASSIGNED.to_string()),
                    name.unwrap_or_else(|| "Unassigned".to_string()),
                    figures,
                    figures.employee_commission,
                )
            }
            Dimension::ReferralPartner => {
                let key = record
                    .referral_partner_id
                    .map(|id| id.to_string())
                    .or_else(|| record.referral_partner_name.clone())
                    .unwrap_or_else(|| UNASSIGNED.to_string());
                let label = record
                    .referral_partner_name
                    .clone()
                    .unwrap_or_else(|| "Unassigned".to_string());
                add(key, label, figures, figures.employee_commission)
            }
            Dimension::Employee => {
                if figures.employee_commissions.is_empty() {
                    add(
                        UNASSIGNED.to_string(),
                        "Unassigned".to_string(),
                        figures,
                        Decimal::ZERO,
                    );
                }
                for commission in &figures.employee_commissions {
                    add(
                        commission.employee_id.to_string(),
                        commission
                            .employee_name
                            .clone()
                            .unwrap_or_else(|| commission.employee_id.to_string()),
                        figures,
                        commission.amount,
                    );
                }
            }
        }
    }

    let mut rows: Vec<BreakdownRow> = groups.into_values().map(|acc| acc.row).collect();
    rows.sort_by(|a, b| {
        b.total_combined_revenue
            .cmp(&a.total_combined_revenue)
            .then_with(|| a.label.cmp(&b.label))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::revenue::DisbursementStatus;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record() -> RevenueMasterRecord {
        RevenueMasterRecord {
            transaction_id: Uuid::new_v4(),
            disbursement_date: date(2025, 3, 10),
            insurance_company: "Acme Life".to_string(),
            client_name: "Jordan Reyes".to_string(),
            policy_number: Some("POL-1".to_string()),
            status: DisbursementStatus::Completed,
            disbursement_amount: dec!(10000),
            fee_percentage: dec!(5),
            flat_fee: dec!(50),
            additional_revenue: dec!(150),
            vendor_name: None,
            vendor_cost_percentage: dec!(0),
            vendor_flat_cost: dec!(0),
            employee_ids: vec![],
            referral_partner_id: None,
            referral_partner_name: None,
            referral_percentage: dec!(0),
            referral_flat_fee: dec!(0),
        }
    }

    fn rule(employee_id: Uuid, company: Option<&str>, priority: i32, pct: Decimal) -> CommissionRule {
        CommissionRule {
            id: Uuid::new_v4(),
            employee_id,
            employee_name: "Sam Ortiz".to_string(),
            insurance_company: company.map(str::to_string),
            priority,
            percentage: pct,
            flat_amount: dec!(0),
            effective_from: date(2025, 1, 1),
            effective_to: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_gross_and_combined_revenue() {
        let figures = compute_figures(&record(), &CommissionBook::default());
        // 10000 * 5% + 50
        assert_eq!(figures.gross_revenue, dec!(550.00));
        assert_eq!(figures.total_combined_revenue, dec!(700.00));
        assert_eq!(figures.vendor_cost, dec!(0));
        assert_eq!(figures.final_net_profit, dec!(700.00));
    }

    #[test]
    fn test_vendor_and_referral_costs() {
        let mut r = record();
        r.vendor_name = Some("ClaimsCo".to_string());
        r.vendor_cost_percentage = dec!(10);
        r.vendor_flat_cost = dec!(20);
        r.referral_partner_name = Some("Broker One".to_string());
        r.referral_percentage = dec!(5);
        r.referral_flat_fee = dec!(2.50);

        let figures = compute_figures(&r, &CommissionBook::default());
        // 700 * 10% + 20
        assert_eq!(figures.vendor_cost, dec!(90.00));
        assert_eq!(figures.commission_base, dec!(610.00));
        // 610 * 5% + 2.50
        assert_eq!(figures.referral_commission, dec!(33.00));
        assert_eq!(figures.final_net_profit, dec!(577.00));
    }

    #[test]
    fn test_vendor_percentages_ignored_without_vendor() {
        let mut r = record();
        r.vendor_cost_percentage = dec!(50);
        let figures = compute_figures(&r, &CommissionBook::default());
        assert_eq!(figures.vendor_cost, dec!(0));
    }

    #[test]
    fn test_commission_base_never_negative() {
        let mut r = record();
        r.vendor_name = Some("Expensive".to_string());
        r.vendor_flat_cost = dec!(1000);
        r.referral_partner_name = Some("Broker".to_string());
        r.referral_percentage = dec!(10);

        let figures = compute_figures(&r, &CommissionBook::default());
        assert_eq!(figures.commission_base, dec!(0));
        assert_eq!(figures.referral_commission, dec!(0));
        assert_eq!(figures.final_net_profit, dec!(-300.00));
    }

    #[test]
    fn test_specific_rule_beats_generic_rule() {
        let employee = Uuid::new_v4();
        let generic = rule(employee, None, 1, dec!(20));
        let specific = rule(employee, Some("acme life"), 50, dec!(10));
        let specific_id = specific.id;
        let book = CommissionBook::new(vec![generic, specific], HashMap::new());

        let matched = book.match_rule(employee, "Acme Life", date(2025, 3, 10)).unwrap();
        assert_eq!(matched.id, specific_id);
    }

    #[test]
    fn test_lowest_priority_wins() {
        let employee = Uuid::new_v4();
        let low = rule(employee, None, 5, dec!(10));
        let high = rule(employee, None, 1, dec!(12));
        let high_id = high.id;
        let book = CommissionBook::new(vec![low, high], HashMap::new());

        let matched = book.match_rule(employee, "Globe", date(2025, 3, 10)).unwrap();
        assert_eq!(matched.id, high_id);
    }

    #[test]
    fn test_latest_effective_from_breaks_ties() {
        let employee = Uuid::new_v4();
        let old = rule(employee, None, 1, dec!(10));
        let mut newer = rule(employee, None, 1, dec!(15));
        newer.effective_from = date(2025, 3, 1);
        let newer_id = newer.id;
        let book = CommissionBook::new(vec![old, newer], HashMap::new());

        let matched = book.match_rule(employee, "Globe", date(2025, 3, 10)).unwrap();
        assert_eq!(matched.id, newer_id);
    }

    #[test]
    fn test_inactive_and_expired_rules_are_skipped() {
        let employee = Uuid::new_v4();
        let mut inactive = rule(employee, None, 1, dec!(10));
        inactive.is_active = false;
        let mut expired = rule(employee, None, 1, dec!(10));
        expired.effective_to = Some(date(2025, 2, 28));
        let book = CommissionBook::new(vec![inactive, expired], HashMap::new());

        assert!(book.match_rule(employee, "Globe", date(2025, 3, 10)).is_none());
    }

    #[test]
    fn test_multi_employee_commissions() {
        let ana = Uuid::new_v4();
        let ben = Uuid::new_v4();
        let carl = Uuid::new_v4();
        let mut names = HashMap::new();
        names.insert(carl, "Carl Diaz".to_string());
        let book = CommissionBook::new(
            vec![rule(ana, None, 1, dec!(10)), rule(ben, None, 1, dec!(5))],
            names,
        );

        let mut r = record();
        // Duplicate id counted once, carl has no rule
        r.employee_ids = vec![ana, ben, ana, carl];

        let figures = compute_figures(&r, &book);
        assert_eq!(figures.employee_commissions.len(), 3);
        assert_eq!(figures.employee_commissions[0].amount, dec!(70.00));
        assert_eq!(figures.employee_commissions[1].amount, dec!(35.00));
        assert_eq!(figures.employee_commissions[2].amount, dec!(0));
        assert_eq!(figures.employee_commissions[2].rule_id, None);
        assert_eq!(
            figures.employee_commissions[2].employee_name.as_deref(),
            Some("Carl Diaz")
        );
        assert_eq!(figures.employee_commission, dec!(105.00));
        assert_eq!(figures.final_net_profit, dec!(595.00));
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(-1.005)), dec!(-1.01));
        assert_eq!(round_money(dec!(2.004)), dec!(2.00));
    }

    #[test]
    fn test_summary_margin_and_average() {
        let book = CommissionBook::default();
        let mut second = record();
        second.additional_revenue = dec!(0);
        let transactions = compute_all(vec![record(), second], &book);

        let summary = summarize(&transactions);
        assert_eq!(summary.totals.transaction_count, 2);
        assert_eq!(summary.totals.total_disbursed, dec!(20000));
        assert_eq!(summary.totals.total_combined_revenue, dec!(1250.00));
        assert_eq!(summary.profit_margin, dec!(100.00));
        assert_eq!(summary.average_revenue_per_transaction, dec!(625.00));
    }

    #[test]
    fn test_summary_of_nothing() {
        let summary = summarize(&[]);
        assert_eq!(summary.totals.transaction_count, 0);
        assert_eq!(summary.profit_margin, Decimal::ZERO);
        assert_eq!(summary.average_revenue_per_transaction, Decimal::ZERO);
    }

    #[test]
    fn test_timeseries_buckets_ascending() {
        let book = CommissionBook::default();
        let mut march = record();
        march.disbursement_date = date(2025, 3, 20);
        let mut january = record();
        january.disbursement_date = date(2025, 1, 5);
        let transactions = compute_all(vec![record(), march, january], &book);

        let points = timeseries(&transactions, Granularity::Month);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].label, "2025-01");
        assert_eq!(points[0].totals.transaction_count, 1);
        assert_eq!(points[1].label, "2025-03");
        assert_eq!(points[1].totals.transaction_count, 2);
    }

    #[test]
    fn test_breakdown_by_company_sorted_by_revenue() {
        let book = CommissionBook::default();
        let mut small = record();
        small.insurance_company = "Globe Mutual".to_string();
        small.disbursement_amount = dec!(100);
        let transactions = compute_all(vec![record(), small, record()], &book);

        let rows = breakdown(&transactions, Dimension::InsuranceCompany);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "Acme Life");
        assert_eq!(rows[0].transaction_count, 2);
        assert_eq!(rows[1].key, "Globe Mutual");
    }

    #[test]
    fn test_breakdown_by_employee_attributes_own_commission() {
        let ana = Uuid::new_v4();
        let ben = Uuid::new_v4();
        let book = CommissionBook::new(
            vec![rule(ana, None, 1, dec!(10)), rule(ben, None, 1, dec!(5))],
            HashMap::new(),
        );
        let mut shared = record();
        shared.employee_ids = vec![ana, ben];
        let unassigned = record();
        let transactions = compute_all(vec![shared, unassigned], &book);

        let rows = breakdown(&transactions, Dimension::Employee);
        assert_eq!(rows.len(), 3);

        let ana_row = rows.iter().find(|r| r.key == ana.to_string()).unwrap();
        assert_eq!(ana_row.employee_commission, dec!(70.00));
        assert_eq!(ana_row.total_combined_revenue, dec!(700.00));

        let ben_row = rows.iter().find(|r| r.key == ben.to_string()).unwrap();
        assert_eq!(ben_row.employee_commission, dec!(35.00));

        let none_row = rows.iter().find(|r| r.key == UNASSIGNED).unwrap();
        assert_eq!(none_row.transaction_count, 1);
        assert_eq!(none_row.employee_commission, dec!(0));
    }

    #[test]
    fn test_breakdown_groups_missing_vendor() {
        let book = CommissionBook::default();
        let mut with_vendor = record();
        with_vendor.vendor_name = Some("ClaimsCo".to_string());
        let transactions = compute_all(vec![record(), with_vendor], &book);

        let rows = breakdown(&transactions, Dimension::Vendor);
        let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
        assert!(keys.contains(&UNASSIGNED));
        assert!(keys.contains(&"ClaimsCo"));
    }
}
