//! Merging per-batch results into one report.
//!
//! Given every [`BatchResult`] of a run plus the original records, builds
//! the single [`AnalysisResult`]:
//!
//! 1. **Order**: results are re-sorted by `batch_index`. Completion order
//!    never matters; quote preference and insight order depend on it.
//! 2. **Validate**: negative counts, or NPS counts exceeding the batch
//!    size, fail the whole run with [`PipelineError::Aggregation`].
//! 3. **Themes**: merged by exact name: counts add field-wise, quotes are
//!    unioned in first-seen order and capped at [`MAX_THEME_QUOTES`].
//!    Output is sorted by count, descending, ties in first-seen order.
//! 4. **NPS / sentiment**: field-wise sums. Every percentage, sentiment
//!    included, uses the NPS total as denominator.
//! 5. **Demographics / trends**: derived from the records themselves,
//!    never from the model.
//! 6. **Insights**: concatenated, exact duplicates dropped, capped at
//!    [`MAX_INSIGHTS`].
//!
//! Rounding is half-up (`floor(x + 0.5)`), so `-12.5` rounds to `-12`.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{
    AnalysisResult, BatchResult, DemographicData, DemographicValue, FeedbackRecord,
    NpsBreakdown, NpsCounts, SentimentCounts, SentimentMetrics, Theme, TrendPoint,
    DEMOGRAPHIC_FIELDS,
};

pub const MAX_THEME_QUOTES: usize = 3;
pub const MAX_INSIGHTS: usize = 5;

const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M"];

/// Aggregate a run's batch results with a fresh id and the current time.
pub fn aggregate(
    results: &[BatchResult],
    records: &[FeedbackRecord],
) -> Result<AnalysisResult, PipelineError> {
    aggregate_with_identity(
        results,
        records,
        Uuid::new_v4().to_string(),
        Utc::now().timestamp_millis(),
    )
}

/// Aggregate with a caller-supplied id and timestamp.
///
/// Deterministic: identical inputs give identical output.
pub fn aggregate_with_identity(
    results: &[BatchResult],
    records: &[FeedbackRecord],
    id: String,
    timestamp: i64,
) -> Result<AnalysisResult, PipelineError> {
    let ordered = order_by_index(results)?;
    for result in &ordered {
        validate(result)?;
    }

    let mut nps_counts = NpsCounts::default();
    let mut sentiment_counts = SentimentCounts::default();
    for result in &ordered {
        nps_counts = nps_counts
            .checked_add(&result.nps)
            .ok_or_else(|| overflow(result.batch_index, "NPS"))?;
        sentiment_counts = sentiment_counts
            .checked_add(&result.sentiment)
            .ok_or_else(|| overflow(result.batch_index, "sentiment"))?;
    }
    let nps_total = nps_counts.total();

    Ok(AnalysisResult {
        id,
        timestamp,
        feedback_count: records.len(),
        themes: merge_themes(&ordered)?,
        nps: nps_breakdown(&nps_counts),
        sentiment: sentiment_metrics(&sentiment_counts, nps_total),
        demographics: build_demographics(records),
        trends: build_trends(records),
        insights: merge_insights(&ordered),
        raw_data: records.to_vec(),
    })
}

fn order_by_index(results: &[BatchResult]) -> Result<Vec<&BatchResult>, PipelineError> {
    if results.is_empty() {
        return Err(PipelineError::Aggregation(
            "no batch results to aggregate".to_string(),
        ));
    }

    let mut ordered: Vec<&BatchResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.batch_index);

    for pair in ordered.windows(2) {
        if pair[0].batch_index == pair[1].batch_index {
            return Err(PipelineError::Aggregation(format!(
                "batch {} was reported more than once",
                pair[0].batch_index
            )));
        }
    }

    Ok(ordered)
}

fn validate(result: &BatchResult) -> Result<(), PipelineError> {
    let batch = result.batch_index;

    for theme in &result.themes {
        if theme.count < 0 || theme.sentiment.has_negative() {
            return Err(PipelineError::Aggregation(format!(
                "batch {}: theme '{}' has a negative count",
                batch, theme.name
            )));
        }
    }
    if result.nps.has_negative() {
        return Err(PipelineError::Aggregation(format!(
            "batch {}: negative NPS count",
            batch
        )));
    }
    if result.sentiment.has_negative() {
        return Err(PipelineError::Aggregation(format!(
            "batch {}: negative sentiment count",
            batch
        )));
    }
    if result.nps.total() > result.batch_len as i64 {
        return Err(PipelineError::Aggregation(format!(
            "batch {}: NPS counts ({}) exceed batch size ({})",
            batch,
            result.nps.total(),
            result.batch_len
        )));
    }

    if result.entry_sentiments.len() != result.batch_len {
        tracing::warn!(
            batch,
            labels = result.entry_sentiments.len(),
            records = result.batch_len,
            "per-entry sentiment labels do not match batch size"
        );
    }

    Ok(())
}

fn overflow(batch: usize, what: &str) -> PipelineError {
    PipelineError::Aggregation(format!("batch {}: {} count overflow", batch, what))
}

fn merge_themes(ordered: &[&BatchResult]) -> Result<Vec<Theme>, PipelineError> {
    let mut merged: Vec<Theme> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for result in ordered {
        for fragment in &result.themes {
            match by_name.get(&fragment.name) {
                Some(&pos) => {
                    let existing = &mut merged[pos];
                    existing.count = existing
                        .count
                        .checked_add(fragment.count)
                        .ok_or_else(|| overflow(result.batch_index, "theme"))?;
                    existing.sentiment = existing
                        .sentiment
                        .checked_add(&fragment.sentiment)
                        .ok_or_else(|| overflow(result.batch_index, "theme sentiment"))?;
                    existing.quotes = union_quotes(&existing.quotes, &fragment.quotes);
                }
                None => {
                    by_name.insert(fragment.name.clone(), merged.len());
                    merged.push(fragment.clone());
                }
            }
        }
    }

    // Stable: equal counts keep first-seen order.
    merged.sort_by(|a, b| b.count.cmp(&a.count));
    Ok(merged)
}

fn union_quotes(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut quotes: Vec<String> = Vec::with_capacity(MAX_THEME_QUOTES);
    for quote in existing.iter().chain(incoming) {
        if !quotes.contains(quote) {
            quotes.push(quote.clone());
        }
    }
    quotes.truncate(MAX_THEME_QUOTES);
    quotes
}

fn merge_insights(ordered: &[&BatchResult]) -> Vec<String> {
    let mut insights: Vec<String> = Vec::new();
    for insight in ordered.iter().flat_map(|r| r.insights.iter()) {
        if !insights.contains(insight) {
            insights.push(insight.clone());
        }
    }
    insights.truncate(MAX_INSIGHTS);
    insights
}

fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// `round(count / total * 100)`, or 0 when `total` is 0.
pub fn percent(count: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    round_half_up(count as f64 / total as f64 * 100.0)
}

pub fn nps_breakdown(counts: &NpsCounts) -> NpsBreakdown {
    let total = counts.total();
    let overall_nps = if total > 0 {
        round_half_up((counts.promoters - counts.detractors) as f64 / total as f64 * 100.0)
    } else {
        0
    };

    NpsBreakdown {
        promoters: counts.promoters,
        passives: counts.passives,
        detractors: counts.detractors,
        promoters_percent: percent(counts.promoters, total),
        passives_percent: percent(counts.passives, total),
        detractors_percent: percent(counts.detractors, total),
        overall_nps,
    }
}

/// Sentiment metrics with percentages over `denominator`.
///
/// The report passes the NPS total here, not the sentiment total.
pub fn sentiment_metrics(counts: &SentimentCounts, denominator: i64) -> SentimentMetrics {
    SentimentMetrics {
        positive: counts.positive,
        neutral: counts.neutral,
        negative: counts.negative,
        positive_percent: percent(counts.positive, denominator),
        neutral_percent: percent(counts.neutral, denominator),
        negative_percent: percent(counts.negative, denominator),
    }
}

/// Average score and score-band sentiment for a group of records.
///
/// Bands: `>= 7` positive, `6` neutral, `<= 5` negative.
fn score_bands(group: &[&FeedbackRecord]) -> (i64, SentimentMetrics) {
    let total = group.len() as i64;
    if total == 0 {
        return (0, SentimentMetrics::default());
    }

    let sum: i64 = group.iter().map(|r| r.nps_score as i64).sum();
    let counts = SentimentCounts {
        positive: group.iter().filter(|r| r.nps_score >= 7).count() as i64,
        neutral: group.iter().filter(|r| r.nps_score == 6).count() as i64,
        negative: group.iter().filter(|r| r.nps_score <= 5).count() as i64,
    };

    (
        round_half_up(sum as f64 / total as f64),
        sentiment_metrics(&counts, total),
    )
}

/// Per-field, per-value counts for the recognized demographic columns.
pub fn build_demographics(records: &[FeedbackRecord]) -> DemographicData {
    let mut demographics = DemographicData::new();

    for field in DEMOGRAPHIC_FIELDS {
        let mut groups: BTreeMap<&str, Vec<&FeedbackRecord>> = BTreeMap::new();
        for record in records {
            if let Some(value) = record.demographic(field) {
                groups.entry(value).or_default().push(record);
            }
        }
        if groups.is_empty() {
            continue;
        }

        let values = groups
            .into_iter()
            .map(|(value, group)| {
                let (avg_nps, sentiment) = score_bands(&group);
                (
                    value.to_string(),
                    DemographicValue {
                        count: group.len() as i64,
                        avg_nps,
                        sentiment,
                    },
                )
            })
            .collect();

        demographics.insert(field.to_string(), values);
    }

    demographics
}

/// Parse a free-form date for ordering.
pub fn parse_calendar_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Per-date NPS and score-band sentiment, oldest first.
///
/// Dates are grouped by exact string. Dates that cannot be parsed sort
/// after all parseable ones, in first-seen order.
pub fn build_trends(records: &[FeedbackRecord]) -> Vec<TrendPoint> {
    let mut groups: Vec<(&str, Vec<&FeedbackRecord>)> = Vec::new();
    let mut by_date: HashMap<&str, usize> = HashMap::new();

    for record in records {
        let Some(date) = record.date.as_deref().filter(|d| !d.is_empty()) else {
            continue;
        };
        match by_date.get(date) {
            Some(&pos) => groups[pos].1.push(record),
            None => {
                by_date.insert(date, groups.len());
                groups.push((date, vec![record]));
            }
        }
    }

    let mut points: Vec<(Option<NaiveDate>, TrendPoint)> = groups
        .into_iter()
        .map(|(date, group)| {
            let (nps, sentiment) = score_bands(&group);
            (
                parse_calendar_date(date),
                TrendPoint {
                    date: date.to_string(),
                    nps,
                    sentiment,
                },
            )
        })
        .collect();

    points.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    points.into_iter().map(|(_, point)| point).collect()
}
