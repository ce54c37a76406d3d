//! # Feedback Harness
//!
//! Batch LLM analysis of customer feedback with NPS scores.
//!
//! Feedback rows are loaded from CSV (or a public Google Sheet), normalized
//! into records, split into fixed-size batches and sent to an LLM backend.
//! Each batch comes back as themes, NPS counts, sentiment counts and
//! insights; the aggregator merges them into one report, adds demographic
//! and date breakdowns computed from the records, and the report is saved
//! to SQLite for listing, export and the HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────┐   ┌────────────────┐   ┌───────────┐
//! │ CSV/Sheet  │──▶│ Normalize │──▶│ Batch → LLM ×N │──▶│ Aggregate │
//! └────────────┘   └───────────┘   └────────────────┘   └─────┬─────┘
//!                                                            ▼
//!                                   ┌──────────┐       ┌──────────┐
//!                                   │   CLI    │◀──────│  SQLite  │
//!                                   │  (fbh)   │       │  store   │
//!                                   └──────────┘       └────┬─────┘
//!                                                           ▼
//!                                                      ┌──────────┐
//!                                                      │   HTTP   │
//!                                                      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fbh init                                  # create database
//! fbh analyze survey.csv --dry-run          # check records and batches
//! fbh analyze survey.csv --name "Q3 survey" # analyze and save
//! fbh list
//! fbh export <id> --format csv --output out.csv
//! fbh serve                                 # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Records, batch results and reports |
//! | [`error`] | Pipeline error taxonomy |
//! | [`normalize`] | CSV → feedback records |
//! | [`sheets`] | Google Sheets links as input |
//! | [`batch`] | Fixed-size batching |
//! | [`analyzer`] | Batch analyzer trait and LLM adapter |
//! | [`aggregate`] | Merging batch results into a report |
//! | [`pipeline`] | Run orchestration with bounded concurrency |
//! | [`progress`] | Progress reporting on stderr |
//! | [`store`] | Report store trait, SQLite and in-memory backends |
//! | [`export`] | JSON and CSV export |
//! | [`server`] | JSON HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod aggregate;
pub mod analyze;
pub mod analyzer;
pub mod batch;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod reports;
pub mod server;
pub mod sheets;
pub mod store;
