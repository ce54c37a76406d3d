//! Analysis run driver.
//!
//! Orchestrates one run end to end:
//!
//! ```text
//! records → batch_records() → analyzer.analyze() × N → aggregate() → AnalysisResult
//! ```
//!
//! Batches are submitted with at most `concurrency` calls in flight
//! (1 = strictly sequential). Results may complete in any order; each is
//! tagged with its batch index and the aggregator restores the order.
//!
//! The first failing batch aborts the run: the remaining in-flight calls
//! are dropped and no partial result is returned. Dropping the future
//! returned by [`run_analysis`] cancels the run the same way.

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};

use crate::aggregate::aggregate;
use crate::analyzer::BatchAnalyzer;
use crate::batch::batch_records;
use crate::error::PipelineError;
use crate::models::{AnalysisResult, BatchResult, FeedbackRecord};
use crate::progress::{AnalysisProgressEvent, AnalysisProgressReporter};

/// Everything a run needs besides its records.
pub struct RunContext<'a> {
    pub analyzer: &'a dyn BatchAnalyzer,
    pub batch_size: usize,
    /// Maximum number of batch calls in flight.
    pub concurrency: usize,
    pub progress: &'a dyn AnalysisProgressReporter,
}

/// Analyze `records` and aggregate them into one report.
///
/// Fails with [`PipelineError::EmptyInput`] before any backend call when
/// `records` is empty.
pub async fn run_analysis(
    records: &[FeedbackRecord],
    ctx: &RunContext<'_>,
) -> Result<AnalysisResult, PipelineError> {
    let batches = batch_records(records, ctx.batch_size)?;

    ctx.progress.report(AnalysisProgressEvent::Batching {
        records: records.len() as u64,
        batches: batches.len() as u64,
    });
    tracing::info!(
        analyzer = %ctx.analyzer.name(),
        records = records.len(),
        batches = batches.len(),
        concurrency = ctx.concurrency,
        "starting analysis"
    );

    let results = analyze_batches(&batches, ctx).await?;
    let report = aggregate(&results, records)?;

    tracing::info!(
        id = %report.id,
        themes = report.themes.len(),
        nps = report.nps.overall_nps,
        "analysis complete"
    );
    Ok(report)
}

/// Run every batch through the analyzer, returning results in completion order.
pub async fn analyze_batches<'a>(
    batches: &[&'a [FeedbackRecord]],
    ctx: &RunContext<'a>,
) -> Result<Vec<BatchResult>, PipelineError> {
    let total = batches.len();
    let analyzer = ctx.analyzer;

    // Boxed up front so the stream's future names one concrete lifetime.
    let calls: Vec<BoxFuture<'a, Result<BatchResult, PipelineError>>> = batches
        .iter()
        .copied()
        .enumerate()
        .map(|(index, batch)| {
            async move {
                let mut result = analyzer.analyze(batch, index, total).await?;
                result.batch_index = index;
                result.batch_len = batch.len();
                Ok::<_, PipelineError>(result)
            }
            .boxed()
        })
        .collect();

    let mut pending = stream::iter(calls).buffer_unordered(ctx.concurrency.max(1));

    let mut results = Vec::with_capacity(total);
    while let Some(outcome) = pending.next().await {
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "batch failed, aborting run");
                return Err(e);
            }
        };
        tracing::debug!(batch = result.batch_index, "batch analyzed");
        results.push(result);
        ctx.progress.report(AnalysisProgressEvent::Analyzing {
            completed: results.len() as u64,
            total: total as u64,
        });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NpsCounts, SentimentCounts};
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports every record as a passive, and counts calls.
    struct PassiveAnalyzer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BatchAnalyzer for PassiveAnalyzer {
        fn name(&self) -> String {
            "passive".to_string()
        }

        async fn analyze(
            &self,
            batch: &[FeedbackRecord],
            _index: usize,
            _total: usize,
        ) -> Result<BatchResult, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let n = batch.len() as i64;
            Ok(BatchResult {
                batch_index: usize::MAX,
                batch_len: 0,
                themes: Vec::new(),
                nps: NpsCounts {
                    promoters: 0,
                    passives: n,
                    detractors: 0,
                },
                sentiment: SentimentCounts {
                    positive: 0,
                    neutral: n,
                    negative: 0,
                },
                insights: Vec::new(),
                entry_sentiments: Vec::new(),
            })
        }
    }

    fn records(n: usize) -> Vec<FeedbackRecord> {
        (0..n).map(|i| FeedbackRecord::new(format!("r{}", i), 7)).collect()
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let analyzer = PassiveAnalyzer {
            calls: AtomicUsize::new(0),
        };
        let ctx = RunContext {
            analyzer: &analyzer,
            batch_size: 40,
            concurrency: 4,
            progress: &NoProgress,
        };
        let err = run_analysis(&[], &ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput));
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_call_per_batch() {
        let analyzer = PassiveAnalyzer {
            calls: AtomicUsize::new(0),
        };
        let ctx = RunContext {
            analyzer: &analyzer,
            batch_size: 4,
            concurrency: 1,
            progress: &NoProgress,
        };
        let input = records(10);
        let report = run_analysis(&input, &ctx).await.unwrap();

        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.feedback_count, 10);
        assert_eq!(report.nps.passives, 10);
        assert_eq!(report.nps.overall_nps, 0);
    }

    #[tokio::test]
    async fn results_are_tagged_with_position() {
        let analyzer = PassiveAnalyzer {
            calls: AtomicUsize::new(0),
        };
        let ctx = RunContext {
            analyzer: &analyzer,
            batch_size: 3,
            concurrency: 2,
            progress: &NoProgress,
        };
        let input = records(7);
        let batches = batch_records(&input, 3).unwrap();
        let mut results = analyze_batches(&batches, &ctx).await.unwrap();
        results.sort_by_key(|r| r.batch_index);

        let tags: Vec<(usize, usize)> = results.iter().map(|r| (r.batch_index, r.batch_len)).collect();
        assert_eq!(tags, vec![(0, 3), (1, 3), (2, 1)]);
    }
}
