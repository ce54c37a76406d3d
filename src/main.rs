//! # Feedback Harness CLI (`fbh`)
//!
//! ## Usage
//!
//! ```bash
//! fbh --config ./config/fbh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fbh init` | Create the SQLite database and run schema migrations |
//! | `fbh analyze <source>` | Analyze a CSV file or Google Sheets link and save the report |
//! | `fbh list` | List saved analyses |
//! | `fbh show <id>` | Print a saved report |
//! | `fbh rename <id> <name>` | Rename a saved analysis |
//! | `fbh delete <id>` | Delete a saved analysis |
//! | `fbh export <id>` | Export a report as JSON or CSV |
//! | `fbh serve` | Start the JSON HTTP API |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `warn,feedback_harness=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use feedback_harness::analyze::{run_analyze, AnalyzeOptions};
use feedback_harness::export::{run_export, ExportFormat};
use feedback_harness::progress::ProgressMode;
use feedback_harness::{config, migrate, reports, server};

/// Feedback Harness CLI: batch LLM analysis of NPS feedback.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/fbh.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "fbh",
    about = "Feedback Harness: batch LLM analysis of customer feedback and NPS scores",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fbh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Analyze a feedback CSV and save the report.
    Analyze {
        /// CSV file path or public Google Sheets link.
        source: String,

        /// Display name for the saved analysis (default: "Analysis - <date>").
        #[arg(long)]
        name: Option<String>,

        /// Column detection policy: `recognized`, `heuristic`, or `pass_through`.
        #[arg(long)]
        policy: Option<String>,

        /// Records per backend call (overrides `[analysis].batch_size`).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Maximum concurrent backend calls (overrides `[analysis].concurrency`).
        #[arg(long)]
        concurrency: Option<usize>,

        /// Show record and batch counts without calling the backend.
        #[arg(long)]
        dry_run: bool,

        /// Print the report without saving it.
        #[arg(long)]
        no_save: bool,

        /// Progress on stderr: `human`, `json`, or `off`. Default: human if stderr is a TTY.
        #[arg(long)]
        progress: Option<String>,
    },

    /// List saved analyses, oldest first.
    List,

    /// Print a saved analysis.
    Show { id: String },

    /// Rename a saved analysis.
    Rename { id: String, name: String },

    /// Delete a saved analysis.
    Delete { id: String },

    /// Export a saved analysis.
    Export {
        id: String,

        /// `json` (full report) or `csv` (records only).
        #[arg(long, default_value = "json")]
        format: String,

        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Start the JSON HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,feedback_harness=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Analyze {
            source,
            name,
            policy,
            batch_size,
            concurrency,
            dry_run,
            no_save,
            progress,
        } => {
            let progress = match progress.as_deref() {
                None => ProgressMode::default_for_tty(),
                Some(value) => ProgressMode::parse(value).ok_or_else(|| {
                    anyhow::anyhow!("--progress must be human, json, or off (got {})", value)
                })?,
            };
            let opts = AnalyzeOptions {
                source,
                name,
                policy,
                batch_size,
                concurrency,
                dry_run,
                no_save,
                progress,
            };
            run_analyze(&cfg, &opts).await?;
        }
        Commands::List => {
            reports::run_list(&cfg).await?;
        }
        Commands::Show { id } => {
            reports::run_show(&cfg, &id).await?;
        }
        Commands::Rename { id, name } => {
            reports::run_rename(&cfg, &id, &name).await?;
        }
        Commands::Delete { id } => {
            reports::run_delete(&cfg, &id).await?;
        }
        Commands::Export { id, format, output } => {
            let format: ExportFormat = format.parse()?;
            run_export(&cfg, &id, format, output.as_deref()).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
