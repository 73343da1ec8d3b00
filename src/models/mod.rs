//! Data models representing database entities and API payloads.

/// Audit log entries
pub mod audit_log;
/// Employee commission rules
pub mod commission;
/// Export jobs
pub mod export;
/// Shared list paging
pub mod pagination;
/// Revenue records, figures and filters
pub mod revenue;
/// Scheduled reports
pub mod schedule;
/// Report templates
pub mod template;
/// Users, roles and token claims
pub mod user;
