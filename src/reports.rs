//! Saved-report commands: `fbh list`, `show`, `rename`, `delete`.
//!
//! Each opens the SQLite store, performs one operation and prints a
//! plain-text result to stdout.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::models::{AnalysisResult, AnalysisSession};
use crate::store::sqlite::SqliteReportStore;
use crate::store::ReportStore;

pub(crate) fn format_created(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let store = SqliteReportStore::open(config).await?;
    let sessions = store.list().await?;
    store.close().await;

    if sessions.is_empty() {
        println!("No saved analyses.");
        return Ok(());
    }

    println!(
        "{:<38} {:<32} {:<17} {:>8} {:>5}",
        "ID", "NAME", "CREATED", "RECORDS", "NPS"
    );
    for session in &sessions {
        println!(
            "{:<38} {:<32} {:<17} {:>8} {:>5}",
            session.id,
            truncate(&session.name, 32),
            format_created(session.created),
            session.feedback_count,
            session.nps_score
        );
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}

pub async fn run_show(config: &Config, id: &str) -> Result<()> {
    let store = SqliteReportStore::open(config).await?;
    let session = store.get(id).await?;
    store.close().await;

    match session {
        Some(session) => {
            print_session(&session);
            Ok(())
        }
        None => bail!("analysis not found: {}", id),
    }
}

pub(crate) fn print_session(session: &AnalysisSession) {
    println!("--- Analysis ---");
    println!("id:       {}", session.id);
    println!("name:     {}", session.name);
    println!("created:  {}", format_created(session.created));
    println!("records:  {}", session.feedback_count);
    println!();
    print_result(&session.result);
}

pub(crate) fn print_result(result: &AnalysisResult) {
    let nps = &result.nps;
    println!("--- NPS ---");
    println!("overall:     {}", nps.overall_nps);
    println!(
        "promoters:   {} ({}%)",
        nps.promoters, nps.promoters_percent
    );
    println!("passives:    {} ({}%)", nps.passives, nps.passives_percent);
    println!(
        "detractors:  {} ({}%)",
        nps.detractors, nps.detractors_percent
    );
    println!();

    let s = &result.sentiment;
    println!("--- Sentiment ---");
    println!(
        "positive {} ({}%)  neutral {} ({}%)  negative {} ({}%)",
        s.positive, s.positive_percent, s.neutral, s.neutral_percent, s.negative, s.negative_percent
    );
    println!();

    println!("--- Themes ({}) ---", result.themes.len());
    for theme in &result.themes {
        println!(
            "{:>4}  {}  (+{} ~{} -{})",
            theme.count,
            theme.name,
            theme.sentiment.positive,
            theme.sentiment.neutral,
            theme.sentiment.negative
        );
        if !theme.description.is_empty() {
            println!("      {}", theme.description);
        }
        for quote in &theme.quotes {
            println!("      \"{}\"", quote);
        }
    }
    println!();

    if !result.insights.is_empty() {
        println!("--- Insights ---");
        for insight in &result.insights {
            println!("- {}", insight);
        }
        println!();
    }

    for (field, values) in &result.demographics {
        println!("--- {} ---", field);
        for (value, stats) in values {
            println!(
                "{:<24} count {:>5}  avg {:>2}",
                value, stats.count, stats.avg_nps
            );
        }
        println!();
    }

    if !result.trends.is_empty() {
        println!("--- Trends ---");
        for point in &result.trends {
            println!(
                "{:<12} avg {:>2}  +{}% ~{}% -{}%",
                point.date,
                point.nps,
                point.sentiment.positive_percent,
                point.sentiment.neutral_percent,
                point.sentiment.negative_percent
            );
        }
    }
}

pub async fn run_rename(config: &Config, id: &str, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("name must not be empty");
    }

    let store = SqliteReportStore::open(config).await?;
    let renamed = store.rename(id, name).await?;
    store.close().await;

    if !renamed {
        bail!("analysis not found: {}", id);
    }
    println!("Renamed {} to \"{}\"", id, name);
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let store = SqliteReportStore::open(config).await?;
    let deleted = store.delete(id).await?;
    store.close().await;

    if !deleted {
        bail!("analysis not found: {}", id);
    }
    println!("Deleted {}", id);
    Ok(())
}
