//! Core data models used throughout Feedback Harness.
//!
//! These types represent the normalized feedback rows, the per-batch
//! analysis fragments returned by the backend, and the aggregated report
//! that flows into the store and the exporters.
//!
//! Report types serialize with camelCase keys (`feedbackCount`,
//! `overallNps`, ...) so exported JSON keeps the shape consumers of the
//! web dashboard already read. Record fields stay snake_case.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Recognized demographic columns, in report order.
pub const DEMOGRAPHIC_FIELDS: [&str; 4] = ["age", "location", "device_type", "user_segment"];

/// One normalized feedback row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub feedback_text: String,
    /// 0..=10; 0 when the input has no score column.
    pub nps_score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_segment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Unrecognized input columns, kept verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_fields: BTreeMap<String, String>,
}

impl FeedbackRecord {
    pub fn new(feedback_text: impl Into<String>, nps_score: u8) -> Self {
        Self {
            feedback_text: feedback_text.into(),
            nps_score,
            age: None,
            location: None,
            device_type: None,
            user_segment: None,
            date: None,
            extra_fields: BTreeMap::new(),
        }
    }

    /// Value of a recognized demographic field, if set and non-empty.
    pub fn demographic(&self, field: &str) -> Option<&str> {
        let value = match field {
            "age" => self.age.as_deref(),
            "location" => self.location.as_deref(),
            "device_type" => self.device_type.as_deref(),
            "user_segment" => self.user_segment.as_deref(),
            _ => None,
        };
        value.filter(|v| !v.is_empty())
    }
}

/// Positive / neutral / negative tallies.
///
/// Signed so that a misbehaving backend's negative counts survive parsing
/// and are rejected by the aggregator instead of by serde.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentCounts {
    pub positive: i64,
    pub neutral: i64,
    pub negative: i64,
}

impl SentimentCounts {
    /// Field-wise sum, or `None` if any field overflows.
    pub fn checked_add(&self, other: &SentimentCounts) -> Option<SentimentCounts> {
        Some(SentimentCounts {
            positive: self.positive.checked_add(other.positive)?,
            neutral: self.neutral.checked_add(other.neutral)?,
            negative: self.negative.checked_add(other.negative)?,
        })
    }

    pub fn has_negative(&self) -> bool {
        self.positive < 0 || self.neutral < 0 || self.negative < 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpsCounts {
    pub promoters: i64,
    pub passives: i64,
    pub detractors: i64,
}

impl NpsCounts {
    /// Sum of the three buckets, saturating at `i64::MAX`.
    pub fn total(&self) -> i64 {
        self.promoters
            .saturating_add(self.passives)
            .saturating_add(self.detractors)
    }

    pub fn checked_add(&self, other: &NpsCounts) -> Option<NpsCounts> {
        Some(NpsCounts {
            promoters: self.promoters.checked_add(other.promoters)?,
            passives: self.passives.checked_add(other.passives)?,
            detractors: self.detractors.checked_add(other.detractors)?,
        })
    }

    pub fn has_negative(&self) -> bool {
        self.promoters < 0 || self.passives < 0 || self.detractors < 0
    }
}

/// A named feedback theme with mention count, sentiment split and quotes.
///
/// The same shape is used for a single batch's fragment and for the
/// merged theme in the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    pub count: i64,
    pub sentiment: SentimentCounts,
    #[serde(default)]
    pub quotes: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// A theme as reported by one batch, before merging.
pub type ThemeFragment = Theme;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

/// Structured result of analyzing exactly one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Zero-based position of the batch in the run.
    pub batch_index: usize,
    /// Number of records submitted in the batch.
    pub batch_len: usize,
    pub themes: Vec<ThemeFragment>,
    pub nps: NpsCounts,
    pub sentiment: SentimentCounts,
    pub insights: Vec<String>,
    /// One label per record, in batch order, when the backend complies.
    pub entry_sentiments: Vec<SentimentLabel>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpsBreakdown {
    pub promoters: i64,
    pub passives: i64,
    pub detractors: i64,
    pub promoters_percent: i64,
    pub passives_percent: i64,
    pub detractors_percent: i64,
    pub overall_nps: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentMetrics {
    pub positive: i64,
    pub neutral: i64,
    pub negative: i64,
    pub positive_percent: i64,
    pub neutral_percent: i64,
    pub negative_percent: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicValue {
    pub count: i64,
    pub avg_nps: i64,
    pub sentiment: SentimentMetrics,
}

/// demographic field → observed value → stats.
pub type DemographicData = BTreeMap<String, BTreeMap<String, DemographicValue>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: String,
    pub nps: i64,
    pub sentiment: SentimentMetrics,
}

/// The aggregated report for one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub id: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub feedback_count: usize,
    pub themes: Vec<Theme>,
    pub nps: NpsBreakdown,
    pub sentiment: SentimentMetrics,
    pub demographics: DemographicData,
    pub trends: Vec<TrendPoint>,
    pub insights: Vec<String>,
    pub raw_data: Vec<FeedbackRecord>,
}

/// A persisted report with its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSession {
    pub id: String,
    pub name: String,
    /// Unix milliseconds, copied from the result.
    pub created: i64,
    pub feedback_count: usize,
    pub nps_score: i64,
    pub result: AnalysisResult,
}
