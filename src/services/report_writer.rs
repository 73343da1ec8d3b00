//! Rendering report data into downloadable files.
//!
//! Every report is first flattened into a `ReportTable` (headers plus string
//! cells), optionally narrowed to a template's columns, then written as CSV,
//! JSON or PDF.

use chrono::{DateTime, Utc};
use genpdf::{Element, elements, style};
use serde_json::{Map, Value, json};

use crate::{
    error::AppError,
    models::{
        export::ExportFormat,
        revenue::{BreakdownRow, RevenueSummary, RevenueTotals, RevenueTransaction, TimeseriesPoint},
        template::ReportType,
    },
};

/// Report output before formatting.
#[derive(Debug, Clone)]
pub enum ReportData {
    Summary(RevenueSummary),
    Timeseries(Vec<TimeseriesPoint>),
    Breakdown(Vec<BreakdownRow>),
    Transactions(Vec<RevenueTransaction>),
}

impl ReportData {
    pub fn report_type(&self) -> ReportType {
        match self {
            ReportData::Summary(_) => ReportType::Summary,
            ReportData::Timeseries(_) => ReportType::Timeseries,
            ReportData::Breakdown(_) => ReportType::Breakdown,
            ReportData::Transactions(_) => ReportType::Transactions,
        }
    }
}

/// Tabular form of a report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable {
    pub report_type: ReportType,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

const TOTALS_HEADERS: [&str; 8] = [
    "transaction_count",
    "total_disbursed",
    "gross_revenue",
    "total_combined_revenue",
    "vendor_costs",
    "employee_commissions",
    "referral_commissions",
    "final_net_profit",
];

fn totals_cells(totals: &RevenueTotals) -> Vec<String> {
    vec![
        totals.transaction_count.to_string(),
        totals.total_disbursed.to_string(),
        totals.gross_revenue.to_string(),
        totals.total_combined_revenue.to_string(),
        totals.vendor_costs.to_string(),
        totals.employee_commissions.to_string(),
        totals.referral_commissions.to_string(),
        totals.final_net_profit.to_string(),
    ]
}

const TRANSACTION_HEADERS: [&str; 20] = [
    "transaction_id",
    "disbursement_date",
    "insurance_company",
    "client_name",
    "policy_number",
    "status",
    "disbursement_amount",
    "fee_percentage",
    "flat_fee",
    "additional_revenue",
    "vendor_name",
    "referral_partner_name",
    "employees",
    "gross_revenue",
    "total_combined_revenue",
    "vendor_cost",
    "commission_base",
    "employee_commission",
    "referral_commission",
    "final_net_profit",
];

const BREAKDOWN_HEADERS: [&str; 7] = [
    "key",
    "label",
    "transaction_count",
    "total_combined_revenue",
    "employee_commission",
    "referral_commission",
    "final_net_profit",
];

/// Column names produced for a report type, in output order.
pub fn report_columns(report_type: ReportType) -> Vec<&'static str> {
    match report_type {
        ReportType::Summary => {
            let mut headers = TOTALS_HEADERS.to_vec();
            headers.extend(["profit_margin", "average_revenue_per_transaction"]);
            headers
        }
        ReportType::Timeseries => {
            let mut headers = vec!["period_start", "label"];
            headers.extend(TOTALS_HEADERS);
            headers
        }
        ReportType::Breakdown => BREAKDOWN_HEADERS.to_vec(),
        ReportType::Transactions => TRANSACTION_HEADERS.to_vec(),
    }
}

fn unknown_column(name: &str, report_type: ReportType) -> AppError {
    AppError::InvalidRequest(format!(
        "unknown column '{}' for a {} report",
        name,
        report_type.as_str()
    ))
}

/// Reject any of `columns` that a `report_type` report does not produce.
pub fn check_columns(report_type: ReportType, columns: &[String]) -> Result<(), AppError> {
    let known = report_columns(report_type);
    match columns.iter().find(|c| !known.contains(&c.as_str())) {
        Some(name) => Err(unknown_column(name, report_type)),
        None => Ok(()),
    }
}

fn transaction_cells(t: &RevenueTransaction) -> Vec<String> {
    let r = &t.record;
    let f = &t.figures;
    let employees = f
        .employee_commissions
        .iter()
        .map(|c| {
            c.employee_name
                .clone()
                .unwrap_or_else(|| c.employee_id.to_string())
        })
        .collect::<Vec<_>>()
        .join("; ");

    vec![
        r.transaction_id.to_string(),
        r.disbursement_date.to_string(),
        r.insurance_company.clone(),
        r.client_name.clone(),
        r.policy_number.clone().unwrap_or_default(),
        r.status.as_str().to_string(),
        r.disbursement_amount.to_string(),
        r.fee_percentage.to_string(),
        r.flat_fee.to_string(),
        r.additional_revenue.to_string(),
        r.vendor_name.clone().unwrap_or_default(),
        r.referral_partner_name.clone().unwrap_or_default(),
        employees,
        f.gross_revenue.to_string(),
        f.total_combined_revenue.to_string(),
        f.vendor_cost.to_string(),
        f.commission_base.to_string(),
        f.employee_commission.to_string(),
        f.referral_commission.to_string(),
        f.final_net_profit.to_string(),
    ]
}

impl ReportTable {
    pub fn from_data(data: &ReportData) -> Self {
        let rows = match data {
            ReportData::Summary(summary) => {
                let mut row = totals_cells(&summary.totals);
                row.push(summary.profit_margin.to_string());
                row.push(summary.average_revenue_per_transaction.to_string());
                vec![row]
            }
            ReportData::Timeseries(points) => points
                .iter()
                .map(|p| {
                    let mut row = vec![p.period_start.to_string(), p.label.clone()];
                    row.extend(totals_cells(&p.totals));
                    row
                })
                .collect(),
            ReportData::Breakdown(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        r.key.clone(),
                        r.label.clone(),
                        r.transaction_count.to_string(),
                        r.total_combined_revenue.to_string(),
                        r.employee_commission.to_string(),
                        r.referral_commission.to_string(),
                        r.final_net_profit.to_string(),
                    ]
                })
                .collect(),
            ReportData::Transactions(transactions) => {
                transactions.iter().map(transaction_cells).collect()
            }
        };

        let report_type = data.report_type();
        Self {
            report_type,
            headers: report_columns(report_type)
                .into_iter()
                .map(str::to_string)
                .collect(),
            rows,
        }
    }

    /// Keep only `columns`, in the order given. An empty list keeps everything.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when a column does not exist in this report.
    pub fn select_columns(self, columns: &[String]) -> Result<Self, AppError> {
        if columns.is_empty() {
            return Ok(self);
        }

        let indexes = columns
            .iter()
            .map(|name| {
                self.headers
                    .iter()
                    .position(|h| h == name)
                    .ok_or_else(|| unknown_column(name, self.report_type))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pick = |row: &Vec<String>| -> Vec<String> { indexes.iter().map(|&i| row[i].clone()).collect() };

        Ok(Self {
            report_type: self.report_type,
            headers: pick(&self.headers),
            rows: self.rows.iter().map(pick).collect(),
        })
    }
}

pub fn write_csv(table: &ReportTable) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::Writer::from_writer(vec![]);
    let csv_error = |e: csv::Error| AppError::Export(format!("CSV writer error: {}", e));

    writer.write_record(&table.headers).map_err(csv_error)?;
    for row in &table.rows {
        writer.write_record(row).map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Export(format!("CSV writer error: {}", e)))
}

/// JSON document with one object per row.
///
/// ```json
/// {
///   "report_type": "breakdown",
///   "generated_at": "2025-06-01T08:00:00Z",
///   "row_count": 2,
///   "columns": ["key", "label", ...],
///   "rows": [{"key": "Acme Life", "label": "Acme Life", ...}]
/// }
/// ```
pub fn write_json(table: &ReportTable, generated_at: DateTime<Utc>) -> Result<Vec<u8>, AppError> {
    let rows: Vec<Value> = table
        .rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = table
                .headers
                .iter()
                .cloned()
                .zip(row.iter().cloned().map(Value::String))
                .collect();
            Value::Object(object)
        })
        .collect();

    let document = json!({
        "report_type": table.report_type,
        "generated_at": generated_at,
        "row_count": table.rows.len(),
        "columns": table.headers,
        "rows": rows,
    });

    serde_json::to_vec_pretty(&document)
        .map_err(|e| AppError::Export(format!("JSON serialization error: {}", e)))
}

fn pdf_error(e: genpdf::error::Error) -> AppError {
    AppError::Export(format!("PDF rendering error: {}", e))
}

fn render_pdf(
    table: &ReportTable,
    font_dir: &str,
    font_name: &str,
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, AppError> {
    let font_family = genpdf::fonts::from_files(font_dir, font_name, None).map_err(|e| {
        AppError::Export(format!(
            "font '{}' not found in {}: {}",
            font_name, font_dir, e
        ))
    })?;

    let mut doc = genpdf::Document::new(font_family);
    let title = format!("Revenue report: {}", table.report_type.as_str());
    doc.set_title(title.clone());
    doc.set_font_size(8);
    let mut decorator = genpdf::SimplePageDecorator::new();
    decorator.set_margins(10);
    doc.set_page_decorator(decorator);

    doc.push(elements::Paragraph::new(title).styled(style::Style::new().bold().with_font_size(16)));
    doc.push(elements::Paragraph::new(format!(
        "Generated {} | {} rows",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        table.rows.len()
    )));
    doc.push(elements::Break::new(1.5));

    let bold = style::Style::new().bold();

    // A single-row report reads better as label/value pairs
    if table.report_type == ReportType::Summary {
        let mut layout = elements::TableLayout::new(vec![2, 1]);
        layout.set_cell_decorator(elements::FrameCellDecorator::new(true, true, false));
        if let Some(row) = table.rows.first() {
            for (header, value) in table.headers.iter().zip(row) {
                layout
                    .row()
                    .element(elements::Paragraph::new(header.as_str()).styled(bold))
                    .element(elements::Paragraph::new(value.as_str()))
                    .push()
                    .map_err(pdf_error)?;
            }
        }
        doc.push(layout);
    } else {
        let mut layout = elements::TableLayout::new(vec![1; table.headers.len().max(1)]);
        layout.set_cell_decorator(elements::FrameCellDecorator::new(true, true, false));

        let mut header_row = layout.row();
        for header in &table.headers {
            header_row.push_element(elements::Paragraph::new(header.as_str()).styled(bold));
        }
        header_row.push().map_err(pdf_error)?;

        for row in &table.rows {
            let mut table_row = layout.row();
            for cell in row {
                table_row.push_element(elements::Paragraph::new(cell.as_str()));
            }
            table_row.push().map_err(pdf_error)?;
        }
        doc.push(layout);
    }

    let mut buffer = Vec::new();
    doc.render(&mut buffer).map_err(pdf_error)?;
    Ok(buffer)
}

/// Render a PDF on the blocking pool. Font files are read from `font_dir`.
pub async fn write_pdf(
    table: ReportTable,
    font_dir: String,
    font_name: String,
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, AppError> {
    tokio::task::spawn_blocking(move || render_pdf(&table, &font_dir, &font_name, generated_at))
        .await
        .map_err(|e| anyhow::anyhow!("PDF rendering task failed: {}", e))?
}

/// Write `table` in `format`.
pub async fn write(
    format: ExportFormat,
    table: ReportTable,
    font_dir: &str,
    font_name: &str,
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, AppError> {
    match format {
        ExportFormat::Csv => write_csv(&table),
        ExportFormat::Json => write_json(&table, generated_at),
        ExportFormat::Pdf => {
            write_pdf(table, font_dir.to_string(), font_name.to_string(), generated_at).await
        }
    }
}
