//! `fbh analyze`: load, normalize, analyze and save one feedback set.
//!
//! The source is a CSV file path or a public Google Sheets link. With
//! `--dry-run` only normalization and batching run, so record and batch
//! counts can be checked without touching the backend. Ctrl-C while the
//! backend is working drops the run; nothing is saved.

use anyhow::{bail, Context, Result};

use crate::analyzer::create_analyzer;
use crate::batch::batch_count;
use crate::config::Config;
use crate::normalize::{normalize_csv, NormalizePolicy};
use crate::pipeline::{run_analysis, RunContext};
use crate::progress::ProgressMode;
use crate::reports::print_result;
use crate::sheets::{fetch_sheet_csv, is_sheet_url};
use crate::store::sqlite::SqliteReportStore;
use crate::store::ReportStore;

/// Command-line overrides for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub source: String,
    pub name: Option<String>,
    pub policy: Option<String>,
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub dry_run: bool,
    pub no_save: bool,
    pub progress: ProgressMode,
}

/// Read the raw CSV text for `source`.
pub async fn load_source(config: &Config, source: &str) -> Result<String> {
    if is_sheet_url(source) {
        return fetch_sheet_csv(source, config.llm.timeout_secs).await;
    }
    std::fs::read_to_string(source).with_context(|| format!("Failed to read {}", source))
}

pub async fn run_analyze(config: &Config, opts: &AnalyzeOptions) -> Result<()> {
    let policy: NormalizePolicy = match &opts.policy {
        Some(p) => p.parse()?,
        None => config.analysis.policy()?,
    };
    let batch_size = opts.batch_size.unwrap_or(config.analysis.batch_size);
    let concurrency = opts.concurrency.unwrap_or(config.analysis.concurrency);
    if batch_size == 0 {
        bail!("--batch-size must be at least 1");
    }
    if concurrency == 0 {
        bail!("--concurrency must be at least 1");
    }

    let text = load_source(config, &opts.source).await?;
    let normalized = normalize_csv(&text, policy)?;
    if normalized.dropped_rows > 0 {
        tracing::warn!(
            dropped = normalized.dropped_rows,
            "rows without feedback text were skipped"
        );
    }
    let records = normalized.records;

    if opts.dry_run {
        println!("Dry run: {}", opts.source);
        println!("  fields:     {}", normalized.found_fields.join(", "));
        println!("  records:    {}", records.len());
        println!("  dropped:    {}", normalized.dropped_rows);
        println!(
            "  batches:    {} (batch size {})",
            batch_count(records.len(), batch_size),
            batch_size
        );
        return Ok(());
    }

    let analyzer = create_analyzer(&config.llm)?;
    let reporter = opts.progress.reporter();
    let ctx = RunContext {
        analyzer: analyzer.as_ref(),
        batch_size,
        concurrency,
        progress: reporter.as_ref(),
    };

    let result = tokio::select! {
        outcome = run_analysis(&records, &ctx) => match outcome {
            Ok(result) => result,
            Err(e) => {
                if e.is_retryable_by_caller() {
                    eprintln!("The analysis backend failed; running the same command again may succeed.");
                }
                return Err(e.into());
            }
        },
        _ = tokio::signal::ctrl_c() => {
            bail!("analysis cancelled; nothing was saved");
        }
    };

    print_result(&result);
    println!();

    if opts.no_save {
        println!("Analysis {} not saved (--no-save)", result.id);
        return Ok(());
    }

    let store = SqliteReportStore::open(config).await?;
    let id = store.save(&result, opts.name.as_deref()).await?;
    store.close().await;
    println!("Saved analysis {}", id);

    Ok(())
}
