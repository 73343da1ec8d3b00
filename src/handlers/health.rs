//! `GET /health`: database reachability plus which revenue sources are usable.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    /// `configured` when `source=zoho` can be served
    pub zoho: &'static str,
    pub timestamp: DateTime<Utc>,
}

fn zoho_status(configured: bool) -> &'static str {
    if configured { "configured" } else { "not_configured" }
}

/// # Response (200 OK)
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "zoho": "not_configured",
///   "timestamp": "2025-06-01T08:00:00Z"
/// }
/// ```
///
/// An unreachable database yields the standard 500 error body. A missing
/// Zoho configuration does not make the service unhealthy.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    sqlx::query("SELECT 1").execute(&state.pool).await?;

    Ok(Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        database: "connected",
        zoho: zoho_status(state.zoho.is_some()),
        timestamp: Utc::now(),
    }))
}
