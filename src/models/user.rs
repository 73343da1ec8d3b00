//! User accounts, roles and permissions, and token claims.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Dashboard role. Maps to the `user_role` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Analyst,
    Viewer,
}

/// Actions gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ViewReports,
    RunExports,
    ManageTemplates,
    ManageSchedules,
    ViewAuditLogs,
    ManageUsers,
}

impl Permission {
    pub fn name(self) -> &'static str {
        match self {
            Permission::ViewReports => "view_reports",
            Permission::RunExports => "run_exports",
            Permission::ManageTemplates => "manage_templates",
            Permission::ManageSchedules => "manage_schedules",
            Permission::ViewAuditLogs => "view_audit_logs",
            Permission::ManageUsers => "manage_users",
        }
    }
}

impl Role {
    /// Whether this role grants `permission`.
    pub fn can(self, permission: Permission) -> bool {
        match permission {
            Permission::ViewReports => true,
            Permission::RunExports | Permission::ManageTemplates => {
                matches!(self, Role::Admin | Role::Manager | Role::Analyst)
            }
            Permission::ManageSchedules | Permission::ViewAuditLogs => {
                matches!(self, Role::Admin | Role::Manager)
            }
            Permission::ManageUsers => self == Role::Admin,
        }
    }
}

/// Account status. Only `Active` users can authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
}

/// Represents a user record from the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    /// bcrypt hash; never serialized
    pub password_hash: String,
    pub role: Role,
    pub status: UserStatus,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User as returned to API clients.
///
/// `initial_password` is only present in the response to a create request
/// that did not supply a password.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub status: UserStatus,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_password: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            status: user.status,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
            updated_at: user.updated_at,
            initial_password: None,
        }
    }
}

impl UserResponse {
    /// Attach the generated password (shown once, at creation).
    pub fn with_initial_password(mut self, password: String) -> Self {
        self.initial_password = Some(password);
        self
    }
}

/// Request body for `POST /api/v1/users`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,

    #[validate(length(min = 1, max = 200, message = "must be between 1 and 200 characters"))]
    pub full_name: String,

    #[serde(default = "default_role")]
    pub role: Role,

    /// Generated when omitted
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: Option<String>,
}

fn default_role() -> Role {
    Role::Viewer
}

/// Request body for `PUT /api/v1/users/{id}`. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 200, message = "must be between 1 and 200 characters"))]
    pub full_name: Option<String>,

    pub role: Option<Role>,

    pub status: Option<UserStatus>,

    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: Option<String>,
}

/// Query string for `GET /api/v1/users`.
#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Request body for `POST /api/v1/auth/login`.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,

    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

/// JWT claims carried in the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_permissions() {
        assert!(Role::Viewer.can(Permission::ViewReports));
        assert!(!Role::Viewer.can(Permission::RunExports));

        assert!(Role::Analyst.can(Permission::RunExports));
        assert!(Role::Analyst.can(Permission::ManageTemplates));
        assert!(!Role::Analyst.can(Permission::ManageSchedules));

        assert!(Role::Manager.can(Permission::ManageSchedules));
        assert!(Role::Manager.can(Permission::ViewAuditLogs));
        assert!(!Role::Manager.can(Permission::ManageUsers));

        assert!(Role::Admin.can(Permission::ManageUsers));
    }

    #[test]
    fn test_create_request_validation() {
        let request = CreateUserRequest {
            email: "not-an-email".to_string(),
            full_name: String::new(),
            role: Role::Viewer,
            password: Some("short".to_string()),
        };
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("full_name"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn test_password_is_optional() {
        let request = CreateUserRequest {
            email: "ana@example.com".to_string(),
            full_name: "Ana Souza".to_string(),
            role: Role::Analyst,
            password: None,
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_role_deserializes_snake_case() {
        let role: Role = serde_json::from_str("\"manager\"").unwrap();
        assert_eq!(role, Role::Manager);
    }
}
