//! SQLite-backed [`ReportStore`] implementation.
//!
//! One row per session in the `analyses` table. The full report is kept as
//! JSON in `result_json`; the summary columns duplicate what listing needs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::models::{AnalysisResult, AnalysisSession};

use super::{session_for, ReportStore};

pub struct SqliteReportStore {
    pool: SqlitePool,
}

impl SqliteReportStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = crate::db::connect(config).await?;
        crate::migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn session_from_row(row: &SqliteRow) -> Result<AnalysisSession> {
    let id: String = row.get("id");
    let result_json: String = row.get("result_json");
    let result: AnalysisResult = serde_json::from_str(&result_json)
        .with_context(|| format!("Stored report {} is not valid JSON", id))?;
    let feedback_count: i64 = row.get("feedback_count");

    Ok(AnalysisSession {
        id,
        name: row.get("name"),
        created: row.get("created"),
        feedback_count: feedback_count.max(0) as usize,
        nps_score: row.get("nps_score"),
        result,
    })
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn save(&self, result: &AnalysisResult, name: Option<&str>) -> Result<String> {
        let session = session_for(result, name);
        let result_json = serde_json::to_string(&session.result)?;

        sqlx::query(
            r#"
            INSERT INTO analyses (id, name, created, feedback_count, nps_score, result_json)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                created = excluded.created,
                feedback_count = excluded.feedback_count,
                nps_score = excluded.nps_score,
                result_json = excluded.result_json
            "#,
        )
        .bind(&session.id)
        .bind(&session.name)
        .bind(session.created)
        .bind(session.feedback_count as i64)
        .bind(session.nps_score)
        .bind(&result_json)
        .execute(&self.pool)
        .await?;

        tracing::debug!(id = %session.id, name = %session.name, "saved analysis");
        Ok(session.id)
    }

    async fn list(&self) -> Result<Vec<AnalysisSession>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, created, feedback_count, nps_score, result_json
            FROM analyses
            ORDER BY created ASC, rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(session_from_row).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<AnalysisSession>> {
        let row = sqlx::query(
            "SELECT id, name, created, feedback_count, nps_score, result_json FROM analyses WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let done = sqlx::query("DELETE FROM analyses WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn rename(&self, id: &str, name: &str) -> Result<bool> {
        let done = sqlx::query("UPDATE analyses SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }
}
