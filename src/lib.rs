//! Revenue Dashboard Service
//!
//! A REST API for revenue and commission analytics. It reads disbursement
//! records from PostgreSQL (or Zoho Analytics), derives revenue, vendor cost,
//! employee and referral commissions and net profit for each record, and
//! serves summaries, time series, breakdowns and exports of the results.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: JWT bearer tokens, bcrypt password hashes, role permissions
//! - **Format**: JSON requests/responses; CSV, JSON and PDF exports

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
