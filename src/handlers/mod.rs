//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Checks the caller's permission
//! 3. Delegates to a service and returns JSON with a status code

use crate::{
    middleware::{auth::AuthContext, client::ClientInfo},
    models::audit_log::{AuditAction, NewAuditLog},
};

/// Audit log endpoints
pub mod audit_logs;
/// Login, logout and current user
pub mod auth;
/// Export jobs and downloads
pub mod exports;
/// Service health
pub mod health;
/// Revenue reports and commission rules
pub mod revenue;
/// Scheduled reports
pub mod scheduled_reports;
/// Report templates
pub mod templates;
/// User management
pub mod users;

/// Start an audit entry for an action by the authenticated caller.
pub(crate) fn audit_entry(
    auth: &AuthContext,
    client: &ClientInfo,
    action: AuditAction,
    resource_type: &str,
) -> NewAuditLog {
    NewAuditLog::new(Some(auth.user_id), action, resource_type)
        .client(client.ip_address.clone(), client.user_agent.clone())
}
