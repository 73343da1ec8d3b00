//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They own the SQL, the revenue arithmetic and the export pipeline.

pub mod audit_service;
pub mod auth_service;
pub mod commission_service;
pub mod export_service;
pub mod report_writer;
pub mod revenue_calc;
pub mod revenue_query;
pub mod revenue_service;
pub mod schedule_service;
pub mod template_service;
pub mod user_service;
pub mod zoho_client;
