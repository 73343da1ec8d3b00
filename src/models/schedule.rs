//! Scheduled report definitions.
//!
//! Schedules are bookkeeping only: nothing in this service fires them. A
//! schedule carries a cron expression for an external runner and can be run
//! on demand through `POST /api/v1/scheduled-reports/{id}/run`.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::export::ExportFormat;

/// Maps to the `schedule_frequency` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "schedule_frequency", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl Frequency {
    /// Five-field cron expression (UTC) for a run at `hour:minute`.
    ///
    /// | frequency | expression          |
    /// |-----------|---------------------|
    /// | daily     | `M H * * *`         |
    /// | weekly    | `M H * * 1`         |
    /// | monthly   | `M H 1 * *`         |
    /// | quarterly | `M H 1 1,4,7,10 *`  |
    pub fn cron_expression(self, hour: i16, minute: i16) -> String {
        let (day_of_month, month, day_of_week) = match self {
            Frequency::Daily => ("*", "*", "*"),
            Frequency::Weekly => ("*", "*", "1"),
            Frequency::Monthly => ("1", "*", "*"),
            Frequency::Quarterly => ("1", "1,4,7,10", "*"),
        };
        format!("{} {} {} {} {}", minute, hour, day_of_month, month, day_of_week)
    }

    /// Whether a run is due on `date`. Weekly runs fall on Mondays.
    pub fn runs_on(self, date: NaiveDate) -> bool {
        match self {
            Frequency::Daily => true,
            Frequency::Weekly => date.weekday() == Weekday::Mon,
            Frequency::Monthly => date.day() == 1,
            Frequency::Quarterly => date.day() == 1 && matches!(date.month(), 1 | 4 | 7 | 10),
        }
    }
}

/// Maps to the `schedule_status` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "schedule_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    #[default]
    Active,
    Paused,
}

/// Represents a row of `scheduled_reports`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ScheduledReport {
    pub id: Uuid,
    pub name: String,
    pub template_id: Uuid,
    pub frequency: Frequency,
    pub hour: i16,
    pub minute: i16,
    pub cron_expression: String,
    pub recipients: Vec<String>,
    pub format: ExportFormat,
    pub status: ScheduleStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for `POST /api/v1/scheduled-reports`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateScheduleRequest {
    #[validate(length(min = 1, max = 200, message = "must be between 1 and 200 characters"))]
    pub name: String,

    pub template_id: Uuid,

    pub frequency: Frequency,

    #[serde(default = "default_hour")]
    #[validate(range(min = 0, max = 23, message = "must be between 0 and 23"))]
    pub hour: i16,

    #[serde(default)]
    #[validate(range(min = 0, max = 59, message = "must be between 0 and 59"))]
    pub minute: i16,

    #[validate(length(min = 1, message = "at least one recipient is required"))]
    pub recipients: Vec<String>,

    #[serde(default)]
    pub format: ExportFormat,

    #[serde(default)]
    pub status: ScheduleStatus,
}

fn default_hour() -> i16 {
    6
}

/// Request body for `PUT /api/v1/scheduled-reports/{id}`. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateScheduleRequest {
    #[validate(length(min = 1, max = 200, message = "must be between 1 and 200 characters"))]
    pub name: Option<String>,

    pub template_id: Option<Uuid>,

    pub frequency: Option<Frequency>,

    #[validate(range(min = 0, max = 23, message = "must be between 0 and 23"))]
    pub hour: Option<i16>,

    #[validate(range(min = 0, max = 59, message = "must be between 0 and 59"))]
    pub minute: Option<i16>,

    #[validate(length(min = 1, message = "at least one recipient is required"))]
    pub recipients: Option<Vec<String>>,

    pub format: Option<ExportFormat>,

    pub status: Option<ScheduleStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_lookup() {
        assert_eq!(Frequency::Daily.cron_expression(6, 30), "30 6 * * *");
        assert_eq!(Frequency::Weekly.cron_expression(8, 0), "0 8 * * 1");
        assert_eq!(Frequency::Monthly.cron_expression(0, 5), "5 0 1 * *");
        assert_eq!(
            Frequency::Quarterly.cron_expression(23, 59),
            "59 23 1 1,4,7,10 *"
        );
    }

    #[test]
    fn test_runs_on() {
        let monday = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        assert!(Frequency::Weekly.runs_on(monday));
        assert!(!Frequency::Weekly.runs_on(tuesday));

        let july_first = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let june_first = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert!(Frequency::Quarterly.runs_on(july_first));
        assert!(!Frequency::Quarterly.runs_on(june_first));
        assert!(Frequency::Monthly.runs_on(june_first));
    }

    #[test]
    fn test_create_request_bounds() {
        let request: CreateScheduleRequest = serde_json::from_str(
            r#"{"name": "Weekly", "template_id": "8f14e45f-ceea-467a-9575-6f1b1e3f1c11",
                "frequency": "weekly", "hour": 24, "recipients": []}"#,
        )
        .unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("hour"));
        assert!(errors.field_errors().contains_key("recipients"));
    }
}
