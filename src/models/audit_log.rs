//! Audit log entries.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

/// Maps to the `audit_action` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Login,
    Logout,
    Create,
    Update,
    Delete,
    Export,
    View,
}

/// Represents a row of the `audit_logs` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An audit entry about to be written.
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewAuditLog {
    pub fn new(user_id: Option<Uuid>, action: AuditAction, resource_type: &str) -> Self {
        Self {
            user_id,
            action,
            resource_type: resource_type.to_string(),
            resource_id: None,
            details: Value::Object(Default::default()),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn resource(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

/// Request body for `POST /api/v1/audit-logs`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAuditLogRequest {
    pub action: AuditAction,

    #[validate(length(min = 1, max = 100, message = "must be between 1 and 100 characters"))]
    pub resource_type: String,

    #[validate(length(max = 200, message = "must be at most 200 characters"))]
    pub resource_id: Option<String>,

    pub details: Option<Value>,
}

/// Query string for `GET /api/v1/audit-logs`.
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    pub user_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub resource_type: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let user_id = Uuid::new_v4();
        let entry = NewAuditLog::new(Some(user_id), AuditAction::Update, "template")
            .resource(42)
            .details(json!({"name": "Monthly"}))
            .client(Some("10.0.0.1".into()), None);

        assert_eq!(entry.user_id, Some(user_id));
        assert_eq!(entry.resource_type, "template");
        assert_eq!(entry.resource_id.as_deref(), Some("42"));
        assert_eq!(entry.details["name"], "Monthly");
        assert_eq!(entry.ip_address.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_default_details_is_empty_object() {
        let entry = NewAuditLog::new(None, AuditAction::Login, "session");
        assert_eq!(entry.details, json!({}));
    }
}
