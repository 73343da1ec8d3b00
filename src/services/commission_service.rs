//! Commission rule management.

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::commission::{CommissionRule, CommissionRuleRequest},
};

const RULE_SELECT: &str = r#"
    SELECT cr.id, cr.employee_id, e.full_name AS employee_name, cr.insurance_company,
           cr.priority, cr.percentage, cr.flat_amount, cr.effective_from, cr.effective_to,
           cr.is_active, cr.created_at, cr.updated_at
    FROM commission_rules cr
    JOIN employees e ON e.id = cr.employee_id
"#;

/// Check the bounds the database would otherwise reject with a 500.
pub fn validate_rule(request: &CommissionRuleRequest) -> Result<(), AppError> {
    if request.priority < 0 {
        return Err(AppError::InvalidRequest(
            "priority must be zero or greater".to_string(),
        ));
    }
    if request.percentage < Decimal::ZERO || request.percentage > Decimal::ONE_HUNDRED {
        return Err(AppError::InvalidRequest(
            "percentage must be between 0 and 100".to_string(),
        ));
    }
    if request.flat_amount < Decimal::ZERO {
        return Err(AppError::InvalidRequest(
            "flat_amount must not be negative".to_string(),
        ));
    }
    if let (Some(from), Some(to)) = (request.effective_from, request.effective_to) {
        if to < from {
            return Err(AppError::InvalidRequest(
                "effective_to must not be before effective_from".to_string(),
            ));
        }
    }
    Ok(())
}

/// All rules with their employee names, ordered for display.
pub async fn list_rules(pool: &DbPool) -> Result<Vec<CommissionRule>, AppError> {
    let sql = format!(
        "{} ORDER BY e.full_name, cr.priority, cr.effective_from DESC",
        RULE_SELECT
    );
    let rules = sqlx::query_as::<_, CommissionRule>(&sql)
        .fetch_all(pool)
        .await?;
    Ok(rules)
}

pub async fn get_rule(pool: &DbPool, id: Uuid) -> Result<CommissionRule, AppError> {
    let sql = format!("{} WHERE cr.id = $1", RULE_SELECT);
    sqlx::query_as::<_, CommissionRule>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Commission rule"))
}

async fn ensure_employee(pool: &DbPool, employee_id: Uuid) -> Result<(), AppError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM employees WHERE id = $1)")
        .bind(employee_id)
        .fetch_one(pool)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(AppError::NotFound("Employee"))
    }
}

fn normalized_company(company: Option<String>) -> Option<String> {
    company
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

pub async fn create_rule(
    pool: &DbPool,
    request: CommissionRuleRequest,
) -> Result<CommissionRule, AppError> {
    validate_rule(&request)?;
    ensure_employee(pool, request.employee_id).await?;

    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO commission_rules (
            employee_id, insurance_company, priority, percentage, flat_amount,
            effective_from, effective_to, is_active
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(request.employee_id)
    .bind(normalized_company(request.insurance_company))
    .bind(request.priority)
    .bind(request.percentage)
    .bind(request.flat_amount)
    .bind(request.effective_from.unwrap_or_else(|| Utc::now().date_naive()))
    .bind(request.effective_to)
    .bind(request.is_active)
    .fetch_one(pool)
    .await?;

    get_rule(pool, id).await
}

/// Replace every field of a rule.
pub async fn update_rule(
    pool: &DbPool,
    id: Uuid,
    request: CommissionRuleRequest,
) -> Result<CommissionRule, AppError> {
    validate_rule(&request)?;
    ensure_employee(pool, request.employee_id).await?;

    let updated = sqlx::query(
        r#"
        UPDATE commission_rules
        SET employee_id = $1,
            insurance_company = $2,
            priority = $3,
            percentage = $4,
            flat_amount = $5,
            effective_from = COALESCE($6, effective_from),
            effective_to = $7,
            is_active = $8,
            updated_at = NOW()
        WHERE id = $9
        "#,
    )
    .bind(request.employee_id)
    .bind(normalized_company(request.insurance_company))
    .bind(request.priority)
    .bind(request.percentage)
    .bind(request.flat_amount)
    .bind(request.effective_from)
    .bind(request.effective_to)
    .bind(request.is_active)
    .bind(id)
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(AppError::NotFound("Commission rule"));
    }
    get_rule(pool, id).await
}

pub async fn delete_rule(pool: &DbPool, id: Uuid) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM commission_rules WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Commission rule"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> CommissionRuleRequest {
        CommissionRuleRequest {
            employee_id: Uuid::new_v4(),
            insurance_company: None,
            priority: 1,
            percentage: dec!(12.5),
            flat_amount: dec!(0),
            effective_from: None,
            effective_to: None,
            is_active: true,
        }
    }

    #[test]
    fn test_valid_rule() {
        assert!(validate_rule(&request()).is_ok());
    }

    #[test]
    fn test_percentage_bounds() {
        let mut r = request();
        r.percentage = dec!(100.01);
        assert!(validate_rule(&r).is_err());
        r.percentage = dec!(-1);
        assert!(validate_rule(&r).is_err());
        r.percentage = dec!(100);
        assert!(validate_rule(&r).is_ok());
    }

    #[test]
    fn test_negative_priority_rejected() {
        let mut r = request();
        r.priority = -1;
        assert!(matches!(validate_rule(&r), Err(AppError::InvalidRequest(_))));
    }

    #[test]
    fn test_blank_company_means_generic() {
        assert_eq!(normalized_company(Some("  ".to_string())), None);
        assert_eq!(
            normalized_company(Some(" Acme Life ".to_string())).as_deref(),
            Some("Acme Life")
        );
    }
}
