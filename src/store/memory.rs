//! In-memory [`ReportStore`] implementation for testing.
//!
//! Sessions live in a `Vec` behind `std::sync::RwLock`, kept in save order.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{AnalysisResult, AnalysisSession};

use super::{session_for, ReportStore};

pub struct InMemoryReportStore {
    sessions: RwLock<Vec<AnalysisSession>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryReportStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("report store lock poisoned")
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn save(&self, result: &AnalysisResult, name: Option<&str>) -> Result<String> {
        let session = session_for(result, name);
        let id = session.id.clone();

        let mut sessions = self.sessions.write().map_err(poisoned)?;
        match sessions.iter_mut().find(|s| s.id == id) {
            Some(existing) => *existing = session,
            None => sessions.push(session),
        }
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<AnalysisSession>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        let mut out = sessions.clone();
        out.sort_by_key(|s| s.created);
        Ok(out)
    }

    async fn get(&self, id: &str) -> Result<Option<AnalysisSession>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        Ok(sessions.len() != before)
    }

    async fn rename(&self, id: &str, name: &str) -> Result<bool> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        match sessions.iter_mut().find(|s| s.id == id) {
            Some(session) => {
                session.name = name.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedbackRecord, NpsBreakdown};

    fn result(id: &str, timestamp: i64) -> AnalysisResult {
        AnalysisResult {
            id: id.to_string(),
            timestamp,
            feedback_count: 1,
            themes: Vec::new(),
            nps: NpsBreakdown {
                promoters: 1,
                promoters_percent: 100,
                overall_nps: 100,
                ..Default::default()
            },
            sentiment: Default::default(),
            demographics: Default::default(),
            trends: Vec::new(),
            insights: Vec::new(),
            raw_data: vec![FeedbackRecord::new("great", 10)],
        }
    }

    #[tokio::test]
    async fn save_then_get() {
        let store = InMemoryReportStore::new();
        let id = store.save(&result("a", 1_000), Some("Q1 survey")).await.unwrap();
        assert_eq!(id, "a");

        let session = store.get("a").await.unwrap().unwrap();
        assert_eq!(session.name, "Q1 survey");
        assert_eq!(session.nps_score, 100);
        assert_eq!(session.feedback_count, 1);
        assert_eq!(session.result, result("a", 1_000));
    }

    #[tokio::test]
    async fn list_is_oldest_first() {
        let store = InMemoryReportStore::new();
        store.save(&result("late", 2_000), None).await.unwrap();
        store.save(&result("early", 1_000), None).await.unwrap();

        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn rename_and_delete_report_missing_ids() {
        let store = InMemoryReportStore::new();
        store.save(&result("a", 1_000), None).await.unwrap();

        assert!(store.rename("a", "Renamed").await.unwrap());
        assert!(!store.rename("missing", "x").await.unwrap());
        assert_eq!(store.get("a").await.unwrap().unwrap().name, "Renamed");

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saving_same_id_replaces() {
        let store = InMemoryReportStore::new();
        store.save(&result("a", 1_000), Some("first")).await.unwrap();
        store.save(&result("a", 1_000), Some("second")).await.unwrap();

        let sessions = store.list().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].name, "second");
    }
}
