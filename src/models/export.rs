//! Export jobs and their fixed progress sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{
    revenue::{DataSource, Dimension, Granularity, RevenueFilter},
    template::ReportType,
};

/// Maps to the `export_format` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "export_format", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
    Pdf,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

/// Maps to the `export_status` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "export_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Preparing,
    Fetching,
    Processing,
    Writing,
    Completed,
    Failed,
}

impl ExportStatus {
    /// Progress percentage reported for this stage.
    ///
    /// `Failed` keeps whatever progress the job had reached, so it has none.
    pub fn progress(self) -> Option<i16> {
        match self {
            ExportStatus::Preparing => Some(10),
            ExportStatus::Fetching => Some(30),
            ExportStatus::Processing => Some(60),
            ExportStatus::Writing => Some(85),
            ExportStatus::Completed => Some(100),
            ExportStatus::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExportStatus::Completed | ExportStatus::Failed)
    }

    /// The stage after this one in `EXPORT_STAGES`; `None` once terminal.
    pub fn next(self) -> Option<ExportStatus> {
        if self.is_terminal() {
            return None;
        }
        let index = EXPORT_STAGES.iter().position(|&s| s == self)?;
        EXPORT_STAGES.get(index + 1).copied()
    }
}

/// Stages every export walks through, in order.
pub const EXPORT_STAGES: [ExportStatus; 5] = [
    ExportStatus::Preparing,
    ExportStatus::Fetching,
    ExportStatus::Processing,
    ExportStatus::Writing,
    ExportStatus::Completed,
];

/// Represents a row of `export_jobs`, without the file bytes.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ExportJob {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub format: ExportFormat,
    pub report_type: ReportType,
    pub parameters: Value,
    pub status: ExportStatus,
    pub progress: i16,
    pub file_name: Option<String>,
    /// SHA-256 of the file, hex encoded
    pub checksum: Option<String>,
    pub byte_size: Option<i64>,
    pub row_count: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// File bytes of a completed export.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExportFile {
    pub file_name: String,
    pub format: ExportFormat,
    pub file_data: Vec<u8>,
}

/// Request body for `POST /api/v1/exports`.
///
/// When `template_id` is set, the template's report type, filters,
/// granularity and dimension replace the ones given here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub format: ExportFormat,
    pub report_type: Option<ReportType>,
    pub filters: Option<RevenueFilter>,
    pub template_id: Option<Uuid>,
    pub granularity: Option<Granularity>,
    pub dimension: Option<Dimension>,
    #[serde(default)]
    pub source: DataSource,
}

/// Query string for `GET /api/v1/exports`.
#[derive(Debug, Default, Deserialize)]
pub struct ExportListQuery {
    pub status: Option<ExportStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_progress_is_increasing() {
        let progress: Vec<i16> = EXPORT_STAGES
            .iter()
            .map(|s| s.progress().unwrap())
            .collect();
        assert_eq!(progress, vec![10, 30, 60, 85, 100]);
    }

    #[test]
    fn test_terminal_states() {
        assert!(ExportStatus::Completed.is_terminal());
        assert!(ExportStatus::Failed.is_terminal());
        assert!(!ExportStatus::Writing.is_terminal());
        assert_eq!(ExportStatus::Failed.progress(), None);
    }

    #[test]
    fn test_next_walks_stages_in_order() {
        let mut walked = vec![ExportStatus::Preparing];
        while let Some(next) = walked[walked.len() - 1].next() {
            walked.push(next);
        }
        assert_eq!(walked, EXPORT_STAGES.to_vec());
        assert_eq!(ExportStatus::Failed.next(), None);
    }

    #[test]
    fn test_request_defaults() {
        let request: ExportRequest = serde_json::from_str(r#"{"report_type": "summary"}"#).unwrap();
        assert_eq!(request.format, ExportFormat::Csv);
        assert_eq!(request.source, DataSource::Database);
        assert_eq!(request.report_type, Some(ReportType::Summary));
    }
}
