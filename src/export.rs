//! Export a saved report as JSON or CSV.
//!
//! JSON is the full report, pretty-printed; it deserializes back into an
//! identical [`AnalysisResult`]. CSV carries only the normalized records,
//! one row each, for spreadsheets.

use anyhow::{bail, Result};
use std::path::Path;
use std::str::FromStr;

use crate::config::Config;
use crate::models::{AnalysisResult, FeedbackRecord};
use crate::store::sqlite::SqliteReportStore;
use crate::store::ReportStore;

const CSV_HEADER: [&str; 7] = [
    "feedback_text",
    "nps_score",
    "age",
    "location",
    "device_type",
    "user_segment",
    "date",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => bail!("Unknown export format: {} (expected json or csv)", other),
        }
    }
}

pub fn export_json(result: &AnalysisResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

pub fn export_csv(result: &AnalysisResult) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for record in &result.raw_data {
        writer.write_record(csv_row(record))?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

fn csv_row(record: &FeedbackRecord) -> [String; 7] {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    [
        record.feedback_text.clone(),
        record.nps_score.to_string(),
        opt(&record.age),
        opt(&record.location),
        opt(&record.device_type),
        opt(&record.user_segment),
        opt(&record.date),
    ]
}

pub fn render(result: &AnalysisResult, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => export_json(result),
        ExportFormat::Csv => export_csv(result),
    }
}

/// `fbh export`: write a saved report to `output`, or stdout when `None`.
pub async fn run_export(
    config: &Config,
    id: &str,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<()> {
    let store = SqliteReportStore::open(config).await?;
    let session = store.get(id).await?;
    store.close().await;

    let Some(session) = session else {
        bail!("analysis not found: {}", id);
    };
    let body = render(&session.result, format)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &body)?;
            eprintln!(
                "Exported {} ({} records) to {}",
                session.name,
                session.feedback_count,
                path.display()
            );
        }
        None => {
            print!("{}", body);
            if !body.ends_with('\n') {
                println!();
            }
        }
    }

    Ok(())
}
