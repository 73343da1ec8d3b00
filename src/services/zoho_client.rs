//! Zoho Analytics as an alternate source of revenue records.
//!
//! Zoho exposes the same master view through its SQL export API. Rows come
//! back as JSON objects whose values are mostly strings, so each one is
//! parsed into a `RevenueMasterRecord` here before the shared arithmetic runs.
//!
//! # Request
//!
//! ```text
//! GET {base}/restapi/v2/workspaces/{workspace}/data?CONFIG={"sqlQuery":"...","responseFormat":"json"}
//! Authorization: Zoho-oauthtoken <token>
//! ZANALYTICS-ORGID: <org>
//! ```

use std::{collections::HashMap, str::FromStr, time::Duration};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    config::Config,
    error::AppError,
    models::revenue::{DisbursementStatus, RevenueFilter, RevenueMasterRecord},
    services::revenue_query::escape_like,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const COLUMNS: [&str; 18] = [
    "transaction_id",
    "disbursement_date",
    "insurance_company",
    "client_name",
    "policy_number",
    "status",
    "disbursement_amount",
    "fee_percentage",
    "flat_fee",
    "additional_revenue",
    "vendor_name",
    "vendor_cost_percentage",
    "vendor_flat_cost",
    "employee_ids",
    "referral_partner_id",
    "referral_partner_name",
    "referral_percentage",
    "referral_flat_fee",
];

#[derive(Debug, Deserialize)]
struct ZohoResponse {
    #[serde(default)]
    data: Vec<HashMap<String, Value>>,
}

/// Client for the Zoho Analytics data endpoint.
#[derive(Debug, Clone)]
pub struct ZohoClient {
    http: reqwest::Client,
    base_url: String,
    org_id: String,
    workspace_id: String,
    view_name: String,
    oauth_token: String,
}

impl ZohoClient {
    /// Build a client when every Zoho setting is present.
    ///
    /// Returns `Ok(None)` when the source is not configured.
    ///
    /// # Errors
    ///
    /// Fails if `ZOHO_API_BASE` is not an absolute URL or the HTTP client
    /// cannot be created.
    pub fn from_config(config: &Config) -> anyhow::Result<Option<Self>> {
        if !config.zoho_enabled() {
            return Ok(None);
        }
        let setting = |value: &Option<String>| value.clone().unwrap_or_default();

        let parsed = url::Url::parse(&setting(&config.zoho_api_base))
            .map_err(|e| anyhow::anyhow!("ZOHO_API_BASE is not a valid URL: {}", e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("ZOHO_API_BASE must use http or https");
        }

        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Some(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            org_id: setting(&config.zoho_org_id),
            workspace_id: setting(&config.zoho_workspace_id),
            view_name: config.zoho_view_name.clone(),
            oauth_token: setting(&config.zoho_oauth_token),
        }))
    }

    fn data_url(&self) -> String {
        format!(
            "{}/restapi/v2/workspaces/{}/data",
            self.base_url, self.workspace_id
        )
    }

    /// Fetch every record matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// `Upstream` on transport failures, non-2xx responses, or rows that
    /// cannot be parsed.
    pub async fn fetch_records(
        &self,
        filter: &RevenueFilter,
    ) -> Result<Vec<RevenueMasterRecord>, AppError> {
        let sql = build_query(&self.view_name, filter);
        let config = json!({ "sqlQuery": sql, "responseFormat": "json" });

        tracing::debug!(query = %sql, "querying Zoho Analytics");

        let response = self
            .http
            .get(self.data_url())
            .header("Authorization", format!("Zoho-oauthtoken {}", self.oauth_token))
            .header("ZANALYTICS-ORGID", &self.org_id)
            .query(&[("CONFIG", config.to_string())])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Zoho returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let payload: ZohoResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("invalid response body: {}", e)))?;

        payload
            .data
            .iter()
            .enumerate()
            .map(|(i, row)| {
                parse_row(row).map_err(|e| AppError::Upstream(format!("row {}: {}", i, e)))
            })
            .collect()
    }
}

/// Quote a string literal for Zoho SQL.
fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Build the SQL sent to Zoho for `filter`.
pub fn build_query(view_name: &str, filter: &RevenueFilter) -> String {
    let columns = COLUMNS
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut conditions: Vec<String> = Vec::new();

    if let Some(from) = filter.date_from {
        conditions.push(format!("\"disbursement_date\" >= {}", literal(&from.to_string())));
    }
    if let Some(to) = filter.date_to {
        conditions.push(format!("\"disbursement_date\" <= {}", literal(&to.to_string())));
    }
    if !filter.insurance_companies.is_empty() {
        let list = filter
            .insurance_companies
            .iter()
            .map(|c| literal(&c.to_lowercase()))
            .collect::<Vec<_>>()
            .join(", ");
        conditions.push(format!("LOWER(\"insurance_company\") IN ({})", list));
    }
    if let Some(employee_id) = filter.employee_id {
        conditions.push(format!(
            "\"employee_ids\" LIKE {}",
            literal(&format!("%{}%", employee_id))
        ));
    }
    if let Some(partner_id) = filter.referral_partner_id {
        conditions.push(format!(
            "\"referral_partner_id\" = {}",
            literal(&partner_id.to_string())
        ));
    }
    if let Some(vendor) = &filter.vendor {
        conditions.push(format!(
            "LOWER(\"vendor_name\") = {}",
            literal(&vendor.to_lowercase())
        ));
    }
    match filter.status {
        Some(status) => conditions.push(format!("\"status\" = {}", literal(status.as_str()))),
        None if !filter.include_cancelled => {
            conditions.push("\"status\" <> 'cancelled'".to_string())
        }
        None => {}
    }
    if let Some(min) = filter.min_amount {
        conditions.push(format!("\"disbursement_amount\" >= {}", min));
    }
    if let Some(max) = filter.max_amount {
        conditions.push(format!("\"disbursement_amount\" <= {}", max));
    }
    if let Some(search) = &filter.search {
        // Same matching as the database source: case-insensitive, wildcards literal.
        let pattern = literal(&format!("%{}%", escape_like(&search.to_lowercase())));
        conditions.push(format!(
            "(LOWER(\"client_name\") LIKE {p} ESCAPE '\\' OR LOWER(\"policy_number\") LIKE {p} ESCAPE '\\')",
            p = pattern
        ));
    }

    let mut sql = format!(
        "SELECT {} FROM \"{}\"",
        columns,
        view_name.replace('"', "\"\"")
    );
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY \"disbursement_date\" DESC");
    sql
}

fn text(row: &HashMap<String, Value>, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required(row: &HashMap<String, Value>, column: &str) -> Result<String, String> {
    text(row, column).ok_or_else(|| format!("missing {}", column))
}

/// Largest magnitude a money column may hold (NUMERIC(14,2) in Postgres).
fn amount_limit() -> Decimal {
    Decimal::from(1_000_000_000_000i64)
}

/// Largest magnitude a percentage column may hold (NUMERIC(7,4)).
fn percentage_limit() -> Decimal {
    Decimal::from(1_000)
}

/// Parse a numeric column whose magnitude must stay below `limit`, so the
/// revenue formulas cannot overflow.
fn decimal(row: &HashMap<String, Value>, column: &str, limit: Decimal) -> Result<Decimal, String> {
    let Some(raw) = text(row, column) else {
        return Ok(Decimal::ZERO);
    };
    let cleaned = raw.replace(',', "");
    let value = Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| format!("{} is not a number: '{}'", column, raw))?;
    if value.abs() >= limit {
        return Err(format!("{} is out of range: '{}'", column, raw));
    }
    Ok(value)
}

fn amount(row: &HashMap<String, Value>, column: &str) -> Result<Decimal, String> {
    decimal(row, column, amount_limit())
}

fn percentage(row: &HashMap<String, Value>, column: &str) -> Result<Decimal, String> {
    decimal(row, column, percentage_limit())
}

fn uuid_value(row: &HashMap<String, Value>, column: &str) -> Result<Option<Uuid>, String> {
    text(row, column)
        .map(|raw| Uuid::parse_str(&raw).map_err(|_| format!("{} is not a UUID: '{}'", column, raw)))
        .transpose()
}

/// Parse one Zoho row into a record.
///
/// Numeric columns may be strings or numbers; missing and empty values
/// become zero. `employee_ids` is a comma-separated list.
pub fn parse_row(row: &HashMap<String, Value>) -> Result<RevenueMasterRecord, String> {
    let transaction_id = uuid_value(row, "transaction_id")?.ok_or("missing transaction_id")?;

    let raw_date = required(row, "disbursement_date")?;
    let disbursement_date = raw_date
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .ok_or_else(|| format!("disbursement_date is not a date: '{}'", raw_date))?;

    let status = match text(row, "status") {
        Some(raw) => DisbursementStatus::from_str(&raw)?,
        None => DisbursementStatus::Completed,
    };

    let employee_ids = text(row, "employee_ids")
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| Uuid::parse_str(id).map_err(|_| format!("bad employee id '{}'", id)))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();

    Ok(RevenueMasterRecord {
        transaction_id,
        disbursement_date,
        insurance_company: required(row, "insurance_company")?,
        client_name: text(row, "client_name").unwrap_or_default(),
        policy_number: text(row, "policy_number"),
        status,
        disbursement_amount: amount(row, "disbursement_amount")?,
        fee_percentage: percentage(row, "fee_percentage")?,
        flat_fee: amount(row, "flat_fee")?,
        additional_revenue: amount(row, "additional_revenue")?,
        vendor_name: text(row, "vendor_name"),
        vendor_cost_percentage: percentage(row, "vendor_cost_percentage")?,
        vendor_flat_cost: amount(row, "vendor_flat_cost")?,
        employee_ids,
        referral_partner_id: uuid_value(row, "referral_partner_id")?,
        referral_partner_name: text(row, "referral_partner_name"),
        referral_percentage: percentage(row, "referral_percentage")?,
        referral_flat_fee: amount(row, "referral_flat_fee")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(value: Value) -> HashMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_row_with_string_values() {
        let employee = Uuid::new_v4();
        let other = Uuid::new_v4();
        let record = parse_row(&row(json!({
            "transaction_id": "8f14e45f-ceea-467a-9575-6f1b1e3f1c11",
            "disbursement_date": "2025-04-02 00:00:00",
            "insurance_company": "Acme Life",
            "client_name": "Jordan Reyes",
            "policy_number": "",
            "status": "Completed",
            "disbursement_amount": "12,500.00",
            "fee_percentage": 4.5,
            "flat_fee": "",
            "additional_revenue": "100",
            "employee_ids": format!("{}, {}", employee, other),
        })))
        .unwrap();

        assert_eq!(record.disbursement_date, NaiveDate::from_ymd_opt(2025, 4, 2).unwrap());
        assert_eq!(record.disbursement_amount, dec!(12500.00));
        assert_eq!(record.fee_percentage, dec!(4.5));
        assert_eq!(record.flat_fee, Decimal::ZERO);
        assert_eq!(record.policy_number, None);
        assert_eq!(record.vendor_name, None);
        assert_eq!(record.vendor_flat_cost, Decimal::ZERO);
        assert_eq!(record.employee_ids, vec![employee, other]);
        assert_eq!(record.status, DisbursementStatus::Completed);
    }

    #[test]
    fn test_parse_row_rejects_bad_amount() {
        let result = parse_row(&row(json!({
            "transaction_id": "8f14e45f-ceea-467a-9575-6f1b1e3f1c11",
            "disbursement_date": "2025-04-02",
            "insurance_company": "Acme Life",
            "disbursement_amount": "lots",
        })));
        assert!(result.unwrap_err().contains("disbursement_amount"));
    }

    #[test]
    fn test_parse_row_rejects_out_of_range_values() {
        let base = json!({
            "transaction_id": "8f14e45f-ceea-467a-9575-6f1b1e3f1c11",
            "disbursement_date": "2025-04-02",
            "insurance_company": "Acme Life",
        });

        let mut huge = base.clone();
        huge["disbursement_amount"] = json!("79228162514264337593543950335");
        huge["fee_percentage"] = json!("100");
        let err = parse_row(&row(huge)).unwrap_err();
        assert!(err.contains("disbursement_amount is out of range"));

        let mut percent = base.clone();
        percent["disbursement_amount"] = json!("1000");
        percent["referral_percentage"] = json!("-1000");
        assert!(parse_row(&row(percent)).unwrap_err().contains("referral_percentage"));

        let mut largest = base;
        largest["disbursement_amount"] = json!("999999999999.99");
        largest["fee_percentage"] = json!("999.9999");
        assert!(parse_row(&row(largest)).is_ok());
    }

    #[test]
    fn test_parse_row_requires_transaction_id() {
        let result = parse_row(&row(json!({
            "disbursement_date": "2025-04-02",
            "insurance_company": "Acme Life",
        })));
        assert!(result.is_err());
    }

    #[test]
    fn test_build_query_escapes_literals() {
        let filter = RevenueFilter {
            insurance_companies: vec!["O'Neil Mutual".to_string()],
            search: Some("d'Arcy".to_string()),
            ..Default::default()
        };
        let sql = build_query("Revenue Master View", &filter);

        assert!(sql.starts_with("SELECT \"transaction_id\", "));
        assert!(sql.contains("FROM \"Revenue Master View\" WHERE "));
        assert!(sql.contains("LOWER(\"insurance_company\") IN ('o''neil mutual')"));
        assert!(sql.contains("LOWER(\"client_name\") LIKE '%d''arcy%' ESCAPE '\\'"));
        assert!(sql.contains("\"status\" <> 'cancelled'"));
        assert!(sql.ends_with("ORDER BY \"disbursement_date\" DESC"));
    }

    #[test]
    fn test_build_query_matches_like_the_database_filter() {
        let filter = RevenueFilter {
            vendor: Some("ClaimsCo".to_string()),
            search: Some("50%_OFF".to_string()),
            ..Default::default()
        };
        let sql = build_query("Revenue", &filter);

        assert!(sql.contains("LOWER(\"vendor_name\") = 'claimsco'"));
        assert!(sql.contains("LOWER(\"policy_number\") LIKE '%50\\%\\_off%' ESCAPE '\\'"));
    }

    #[test]
    fn test_build_query_without_conditions() {
        let filter = RevenueFilter {
            include_cancelled: true,
            ..Default::default()
        };
        let sql = build_query("Revenue", &filter);
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn test_unconfigured_client_is_none() {
        let config: Config = envy::from_iter(vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/revenue".to_string()),
            ("JWT_SECRET".to_string(), "secret".to_string()),
        ])
        .unwrap();
        assert!(ZohoClient::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_partial_settings_leave_client_unconfigured() {
        let config: Config = envy::from_iter(vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/revenue".to_string()),
            ("JWT_SECRET".to_string(), "secret".to_string()),
            ("ZOHO_API_BASE".to_string(), "not a url".to_string()),
            ("ZOHO_ORG_ID".to_string(), "1".to_string()),
        ])
        .unwrap();
        assert!(ZohoClient::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_configured_client_keeps_settings() {
        let config: Config = envy::from_iter(vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/revenue".to_string()),
            ("JWT_SECRET".to_string(), "secret".to_string()),
            ("ZOHO_API_BASE".to_string(), "https://analyticsapi.zoho.com/".to_string()),
            ("ZOHO_ORG_ID".to_string(), "1".to_string()),
            ("ZOHO_WORKSPACE_ID".to_string(), "2".to_string()),
            ("ZOHO_OAUTH_TOKEN".to_string(), "t".to_string()),
        ])
        .unwrap();
        let client = ZohoClient::from_config(&config).unwrap().unwrap();
        assert_eq!(
            client.data_url(),
            "https://analyticsapi.zoho.com/restapi/v2/workspaces/2/data"
        );
        assert_eq!(client.org_id, "1");
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let config: Config = envy::from_iter(vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/revenue".to_string()),
            ("JWT_SECRET".to_string(), "secret".to_string()),
            ("ZOHO_API_BASE".to_string(), "not a url".to_string()),
            ("ZOHO_ORG_ID".to_string(), "1".to_string()),
            ("ZOHO_WORKSPACE_ID".to_string(), "2".to_string()),
            ("ZOHO_OAUTH_TOKEN".to_string(), "t".to_string()),
        ])
        .unwrap();
        assert!(ZohoClient::from_config(&config).is_err());
    }
}
