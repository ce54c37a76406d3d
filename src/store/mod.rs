//! Storage abstraction for saved analysis reports.
//!
//! The [`ReportStore`] trait defines the session operations used by the
//! CLI and the HTTP server, enabling pluggable backends:
//!
//! - [`SqliteReportStore`](sqlite::SqliteReportStore): the on-disk store.
//! - [`InMemoryReportStore`](memory::InMemoryReportStore): for tests and
//!   `--no-save` style runs that still want list/get semantics.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{AnalysisResult, AnalysisSession};

/// Abstract storage backend for analysis sessions.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`save`](ReportStore::save) | Persist a report, returning its session id |
/// | [`list`](ReportStore::list) | All sessions, oldest first |
/// | [`get`](ReportStore::get) | One session by id |
/// | [`delete`](ReportStore::delete) | Remove a session |
/// | [`rename`](ReportStore::rename) | Change a session's display name |
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist `result` as a session.
    ///
    /// The session id is the result id. Saving the same id again replaces
    /// the earlier session. When `name` is `None` the name defaults to
    /// `"Analysis - <date>"`.
    async fn save(&self, result: &AnalysisResult, name: Option<&str>) -> Result<String>;

    async fn list(&self) -> Result<Vec<AnalysisSession>>;

    async fn get(&self, id: &str) -> Result<Option<AnalysisSession>>;

    /// Returns `false` when no session has this id.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Returns `false` when no session has this id.
    async fn rename(&self, id: &str, name: &str) -> Result<bool>;
}

/// Build the session record stored for `result`.
pub fn session_for(result: &AnalysisResult, name: Option<&str>) -> AnalysisSession {
    let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => n.to_string(),
        None => default_session_name(result.timestamp),
    };

    AnalysisSession {
        id: result.id.clone(),
        name,
        created: result.timestamp,
        feedback_count: result.feedback_count,
        nps_score: result.nps.overall_nps,
        result: result.clone(),
    }
}

/// `"Analysis - YYYY-MM-DD"` for a Unix-millisecond timestamp (UTC).
pub fn default_session_name(timestamp_ms: i64) -> String {
    let date = chrono::DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string());
    format!("Analysis - {}", date)
}
