//! Saved report templates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;
use validator::Validate;

use crate::models::revenue::{Dimension, Granularity, RevenueFilter};

/// Maps to the `report_type` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "report_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    #[default]
    Summary,
    Timeseries,
    Breakdown,
    Transactions,
}

impl ReportType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::Summary => "summary",
            ReportType::Timeseries => "timeseries",
            ReportType::Breakdown => "breakdown",
            ReportType::Transactions => "transactions",
        }
    }
}

/// Represents a row of `report_templates`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ReportTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub report_type: ReportType,
    pub filters: Json<RevenueFilter>,
    /// Export columns to keep; empty means all
    pub columns: Vec<String>,
    pub granularity: Option<Granularity>,
    pub dimension: Option<Dimension>,
    pub is_default: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for `POST /api/v1/templates`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTemplateRequest {
    #[validate(length(min = 1, max = 200, message = "must be between 1 and 200 characters"))]
    pub name: String,

    #[validate(length(max = 2000, message = "must be at most 2000 characters"))]
    pub description: Option<String>,

    pub report_type: ReportType,

    #[serde(default)]
    pub filters: RevenueFilter,

    #[serde(default)]
    pub columns: Vec<String>,

    pub granularity: Option<Granularity>,

    pub dimension: Option<Dimension>,

    #[serde(default)]
    pub is_default: bool,
}

/// Request body for `PUT /api/v1/templates/{id}`. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTemplateRequest {
    #[validate(length(min = 1, max = 200, message = "must be between 1 and 200 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 2000, message = "must be at most 2000 characters"))]
    pub description: Option<String>,

    pub report_type: Option<ReportType>,

    pub filters: Option<RevenueFilter>,

    pub columns: Option<Vec<String>>,

    pub granularity: Option<Granularity>,

    pub dimension: Option<Dimension>,

    pub is_default: Option<bool>,
}

/// Query string for `GET /api/v1/templates`.
#[derive(Debug, Default, Deserialize)]
pub struct TemplateListQuery {
    pub report_type: Option<ReportType>,
}
