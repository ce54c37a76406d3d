//! Binary-driven tests for the `fbh` CLI.

use axum::{http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const SURVEY: &str = "\
feedback_text,nps_score,device_type,date
The new dashboard is fast and clear,10,desktop,2024-06-02
Search results are often irrelevant to me,4,mobile,2024-06-01
Pretty good overall but exports are slow,8,desktop,2024-06-01
";

fn fbh_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fbh"))
}

fn setup_test_env(llm_section: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::write(root.join("survey.csv"), SURVEY).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/fbh.sqlite"

[analysis]
batch_size = 2
concurrency = 2

[server]
bind = "127.0.0.1:7341"

{}
"#,
        root.display(),
        llm_section
    );

    let config_path = root.join("config").join("fbh.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_fbh(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = fbh_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run fbh binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn survey_path(config_path: &Path) -> String {
    config_path
        .parent()
        .and_then(Path::parent)
        .unwrap()
        .join("survey.csv")
        .display()
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_fbh(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("fbh.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, _, first) = run_fbh(&config_path, &["init"]);
    assert!(first, "First init failed");
    let (_, _, second) = run_fbh(&config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent)");
}

#[test]
fn test_list_empty() {
    let (_tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_fbh(&config_path, &["list"]);
    assert!(success, "list failed: {}", stderr);
    assert!(stdout.contains("No saved analyses."));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_fbh(&tmp.path().join("nope.toml"), &["list"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_analyze_dry_run_counts_batches() {
    let (_tmp, config_path) = setup_test_env("");
    let survey = survey_path(&config_path);

    let (stdout, stderr, success) =
        run_fbh(&config_path, &["analyze", &survey, "--dry-run"]);
    assert!(success, "dry run failed: {}", stderr);
    assert!(stdout.contains("records:    3"), "stdout: {}", stdout);
    assert!(stdout.contains("batches:    2 (batch size 2)"), "stdout: {}", stdout);

    let (stdout, _, _) = run_fbh(
        &config_path,
        &["analyze", &survey, "--dry-run", "--batch-size", "1"],
    );
    assert!(stdout.contains("batches:    3 (batch size 1)"));
}

#[test]
fn test_analyze_with_disabled_backend_saves_nothing() {
    let (_tmp, config_path) = setup_test_env("");
    let survey = survey_path(&config_path);

    let (_, stderr, success) =
        run_fbh(&config_path, &["analyze", &survey, "--progress", "off"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr: {}", stderr);

    let (stdout, _, _) = run_fbh(&config_path, &["list"]);
    assert!(stdout.contains("No saved analyses."));
}

#[test]
fn test_analyze_missing_file_fails() {
    let (_tmp, config_path) = setup_test_env("");
    let (_, stderr, success) = run_fbh(&config_path, &["analyze", "/no/such/file.csv"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read"));
}

const BATCH_REPLY: &str = r#"{
  "themes": [{"name": "Performance", "count": 1,
              "sentiment": {"positive": 1, "neutral": 0, "negative": 0},
              "quotes": ["fast and clear"], "description": "Speed of the product"}],
  "nps": {"promoters": 1, "passives": 0, "detractors": 0},
  "sentiment": {"positive": 1, "neutral": 0, "negative": 0},
  "insights": ["Speed drives promoters"]
}"#;

async fn spawn_mock_llm() -> String {
    let app = Router::new().route(
        "/v1/messages",
        post(|Json(_req): Json<Value>| async {
            Json(json!({ "content": [{ "type": "text", "text": BATCH_REPLY }] }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn run_fbh_async(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let config_path = config_path.to_path_buf();
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    tokio::task::spawn_blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_fbh(&config_path, &args)
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_analyze_save_export_rename_delete() {
    let base = spawn_mock_llm().await;
    let llm = format!(
        "[llm]\nprovider = \"anthropic\"\nmodel = \"test-model\"\nbase_url = \"{}\"\napi_key_env = \"FBH_TEST_UNSET_API_KEY\"\ntimeout_secs = 10\n",
        base
    );
    let (tmp, config_path) = setup_test_env(&llm);
    let survey = survey_path(&config_path);

    let (stdout, stderr, success) = run_fbh_async(
        &config_path,
        &["analyze", &survey, "--name", "June survey", "--progress", "off"],
    )
    .await;
    assert!(success, "analyze failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Performance"));
    assert!(stdout.contains("overall:     100"));

    let id = stdout
        .lines()
        .find_map(|l| l.strip_prefix("Saved analysis "))
        .expect("saved id in output")
        .trim()
        .to_string();

    let (stdout, _, success) = run_fbh_async(&config_path, &["list"]).await;
    assert!(success);
    assert!(stdout.contains(&id));
    assert!(stdout.contains("June survey"));

    // JSON export to stdout is the full report.
    let (stdout, _, success) =
        run_fbh_async(&config_path, &["export", &id, "--format", "json"]).await;
    assert!(success);
    let report: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["id"], id.as_str());
    assert_eq!(report["feedbackCount"], 3);
    assert_eq!(report["themes"][0]["count"], 2);
    assert_eq!(report["trends"][0]["date"], "2024-06-01");

    // CSV export to a file.
    let out = tmp.path().join("exports").join("june.csv");
    let out_arg = out.display().to_string();
    let (_, stderr, success) = run_fbh_async(
        &config_path,
        &["export", &id, "--format", "csv", "--output", &out_arg],
    )
    .await;
    assert!(success, "csv export failed: {}", stderr);
    let csv = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[1],
        "The new dashboard is fast and clear,10,,,desktop,,2024-06-02"
    );

    let (_, _, success) = run_fbh_async(&config_path, &["rename", &id, "June NPS"]).await;
    assert!(success);
    let (stdout, _, _) = run_fbh_async(&config_path, &["show", &id]).await;
    assert!(stdout.contains("name:     June NPS"));

    let (_, _, success) = run_fbh_async(&config_path, &["delete", &id]).await;
    assert!(success);
    let (_, stderr, success) = run_fbh_async(&config_path, &["show", &id]).await;
    assert!(!success);
    assert!(stderr.contains("analysis not found"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_analyze_no_save() {
    let base = spawn_mock_llm().await;
    let llm = format!(
        "[llm]\nprovider = \"anthropic\"\nmodel = \"test-model\"\nbase_url = \"{}\"\napi_key_env = \"FBH_TEST_UNSET_API_KEY\"\n",
        base
    );
    let (_tmp, config_path) = setup_test_env(&llm);
    let survey = survey_path(&config_path);

    let (stdout, stderr, success) = run_fbh_async(
        &config_path,
        &["analyze", &survey, "--no-save", "--progress", "off"],
    )
    .await;
    assert!(success, "analyze failed: {}", stderr);
    assert!(stdout.contains("not saved"));

    let (stdout, _, _) = run_fbh_async(&config_path, &["list"]).await;
    assert!(stdout.contains("No saved analyses."));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_backend_error_suggests_retry() {
    let app = Router::new().route(
        "/v1/messages",
        post(|| async {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "overloaded" })),
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let llm = format!(
        "[llm]\nprovider = \"anthropic\"\nmodel = \"test-model\"\nbase_url = \"http://{}\"\napi_key_env = \"FBH_TEST_UNSET_API_KEY\"\n",
        addr
    );
    let (_tmp, config_path) = setup_test_env(&llm);
    let survey = survey_path(&config_path);

    let (_, stderr, success) =
        run_fbh_async(&config_path, &["analyze", &survey, "--progress", "off"]).await;
    assert!(!success);
    assert!(stderr.contains("503"), "stderr: {}", stderr);
    assert!(stderr.contains("may succeed"), "stderr: {}", stderr);

    let (stdout, _, _) = run_fbh_async(&config_path, &["list"]).await;
    assert!(stdout.contains("No saved analyses."));
}
