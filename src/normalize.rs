//! Row normalization: raw CSV text → [`FeedbackRecord`]s.
//!
//! Headers are trimmed, lower-cased and have inner whitespace replaced by
//! `_` (`"Device Type"` → `device_type`). Which column feeds
//! `feedback_text` and `nps_score` is decided by a [`NormalizePolicy`]
//! chosen per deployment.
//!
//! Rules shared by every policy:
//!
//! - scores are numbers in `0..=10` (rounded), anything else becomes `0`;
//! - rows whose feedback text is empty after trimming are dropped;
//! - the recognized optional columns (`age`, `location`, `device_type`,
//!   `user_segment`, `date`) are copied when non-empty;
//! - every other column lands in `extra_fields`.

use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

use crate::models::FeedbackRecord;

const FEEDBACK_ALIASES: [&str; 5] = ["feedback_text", "feedback", "comment", "comments", "response"];
const SCORE_ALIASES: [&str; 3] = ["nps_score", "nps", "score"];
const OPTIONAL_FIELDS: [&str; 5] = ["age", "location", "device_type", "user_segment", "date"];

/// Rows scanned by the heuristic when looking for the text and score columns.
const HEURISTIC_SCAN_ROWS: usize = 5;
/// A value longer than this marks a column as free-text feedback.
const HEURISTIC_TEXT_LEN: usize = 20;

/// How the feedback and score columns are located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizePolicy {
    /// Match column names (`feedback_text`, `nps_score` and aliases).
    ByRecognizedNames,
    /// First long-text column is feedback, first 0–10 numeric column is the score.
    ByHeuristicDetection,
    /// Every non-recognized column is folded into the feedback text.
    PassThroughAllColumns,
}

impl FromStr for NormalizePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "recognized" => Ok(NormalizePolicy::ByRecognizedNames),
            "heuristic" => Ok(NormalizePolicy::ByHeuristicDetection),
            "pass_through" => Ok(NormalizePolicy::PassThroughAllColumns),
            other => bail!(
                "Unknown normalizer policy: '{}'. Must be recognized, heuristic, or pass_through.",
                other
            ),
        }
    }
}

/// Outcome of normalizing one CSV input.
#[derive(Debug, Clone)]
pub struct NormalizeReport {
    pub records: Vec<FeedbackRecord>,
    /// Normalized header names, in input order.
    pub found_fields: Vec<String>,
    /// Data rows skipped for lacking feedback text.
    pub dropped_rows: usize,
}

struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn cell(&self, row: usize, col: usize) -> &str {
        self.rows[row].get(col).map(String::as_str).unwrap_or("")
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

fn read_table(csv_text: &str) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("CSV parsing error")?
        .iter()
        .map(normalize_header)
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.context("CSV parsing error")?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Table { headers, rows })
}

/// Parse a score cell. Empty or non-numeric cells yield `None`.
fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_score(value: &str) -> u8 {
    match parse_number(value) {
        Some(n) if (0.0..=10.0).contains(&n) => (n + 0.5).floor() as u8,
        _ => 0,
    }
}

fn find_alias(table: &Table, aliases: &[&str]) -> Option<usize> {
    aliases.iter().find_map(|alias| table.column(alias))
}

/// Guess columns from cell content in the first rows.
fn detect_columns(table: &Table) -> (Option<usize>, Option<usize>) {
    let mut feedback_col = None;
    let mut score_col = None;

    for row in 0..table.rows.len().min(HEURISTIC_SCAN_ROWS) {
        for col in 0..table.headers.len() {
            let value = table.cell(row, col).trim();
            if feedback_col.is_none() && value.chars().count() > HEURISTIC_TEXT_LEN {
                feedback_col = Some(col);
            }
            if score_col.is_none() {
                if let Some(n) = parse_number(value) {
                    if (0.0..=10.0).contains(&n) {
                        score_col = Some(col);
                    }
                }
            }
        }
        if feedback_col.is_some() && score_col.is_some() {
            break;
        }
    }

    if score_col.is_none() && !table.rows.is_empty() {
        score_col = (0..table.headers.len()).find(|&col| parse_number(table.cell(0, col)).is_some());
    }

    if feedback_col.is_none() && !table.headers.is_empty() {
        feedback_col = Some(0);
    }

    (feedback_col, score_col)
}

fn copy_optional_fields(table: &Table, row: usize, record: &mut FeedbackRecord) {
    for field in OPTIONAL_FIELDS {
        let Some(col) = table.column(field) else {
            continue;
        };
        let value = table.cell(row, col).trim();
        if value.is_empty() {
            continue;
        }
        let slot = match field {
            "age" => &mut record.age,
            "location" => &mut record.location,
            "device_type" => &mut record.device_type,
            "user_segment" => &mut record.user_segment,
            _ => &mut record.date,
        };
        *slot = Some(value.to_string());
    }
}

fn is_recognized(header: &str) -> bool {
    OPTIONAL_FIELDS.contains(&header)
}

/// Normalize CSV text into feedback records using the given policy.
pub fn normalize_csv(csv_text: &str, policy: NormalizePolicy) -> Result<NormalizeReport> {
    let table = read_table(csv_text)?;

    if table.rows.is_empty() {
        bail!("No data found in CSV");
    }

    let (feedback_col, score_col) = match policy {
        NormalizePolicy::ByRecognizedNames => (
            find_alias(&table, &FEEDBACK_ALIASES),
            find_alias(&table, &SCORE_ALIASES),
        ),
        NormalizePolicy::ByHeuristicDetection => detect_columns(&table),
        NormalizePolicy::PassThroughAllColumns => (None, find_alias(&table, &SCORE_ALIASES)),
    };

    // Columns folded into the text under pass-through.
    let content_cols: Vec<usize> = (0..table.headers.len())
        .filter(|&col| Some(col) != score_col && !is_recognized(&table.headers[col]))
        .collect();

    let mut records = Vec::with_capacity(table.rows.len());
    let mut dropped_rows = 0;

    for row in 0..table.rows.len() {
        let feedback_text = match policy {
            NormalizePolicy::PassThroughAllColumns => join_columns(&table, row, &content_cols),
            _ => feedback_col
                .map(|col| table.cell(row, col).trim().to_string())
                .unwrap_or_default(),
        };

        if feedback_text.is_empty() {
            dropped_rows += 1;
            continue;
        }

        let nps_score = score_col.map(|col| parse_score(table.cell(row, col))).unwrap_or(0);
        let mut record = FeedbackRecord::new(feedback_text, nps_score);
        copy_optional_fields(&table, row, &mut record);

        if policy != NormalizePolicy::PassThroughAllColumns {
            let mut extra = BTreeMap::new();
            for col in 0..table.headers.len() {
                if Some(col) == feedback_col || Some(col) == score_col {
                    continue;
                }
                let header = &table.headers[col];
                let value = table.cell(row, col).trim();
                if is_recognized(header) || header.is_empty() || value.is_empty() {
                    continue;
                }
                extra.insert(header.clone(), value.to_string());
            }
            record.extra_fields = extra;
        }

        records.push(record);
    }

    if records.is_empty() {
        bail!("No valid data found. Make sure your CSV has at least some feedback entries.");
    }

    Ok(NormalizeReport {
        records,
        found_fields: table.headers,
        dropped_rows,
    })
}

fn join_columns(table: &Table, row: usize, cols: &[usize]) -> String {
    let parts: Vec<(&str, &str)> = cols
        .iter()
        .map(|&col| (table.headers[col].as_str(), table.cell(row, col).trim()))
        .filter(|(_, value)| !value.is_empty())
        .collect();

    if cols.len() == 1 {
        return parts.first().map(|(_, v)| v.to_string()).unwrap_or_default();
    }

    parts
        .iter()
        .map(|(header, value)| format!("{}: {}", header, value))
        .collect::<Vec<_>>()
        .join(" | ")
}
