//! Public Google Sheets links as an input source.
//!
//! A shared sheet link is rewritten to its CSV export URL and fetched
//! over HTTP; the body then goes through the normal CSV normalizer.

use anyhow::{bail, Context, Result};
use std::time::Duration;
use url::Url;

/// Whether `source` looks like a Google Sheets link rather than a file path.
pub fn is_sheet_url(source: &str) -> bool {
    (source.starts_with("https://") || source.starts_with("http://"))
        && source.contains("/spreadsheets/d/")
}

/// Convert a sheet link into its CSV export URL.
///
/// The `gid` (tab) is read from the `#gid=` fragment and defaults to `0`.
pub fn sheet_csv_url(sheet_url: &str) -> Result<String> {
    let url = Url::parse(sheet_url).with_context(|| "Invalid Google Sheets URL")?;

    let segments: Vec<&str> = url
        .path_segments()
        .ok_or_else(|| anyhow::anyhow!("Invalid Google Sheets URL"))?
        .collect();
    let spreadsheet_id = segments
        .windows(3)
        .find(|w| w[0] == "spreadsheets" && w[1] == "d")
        .map(|w| w[2]);

    let spreadsheet_id = match spreadsheet_id {
        Some(id)
            if !id.is_empty()
                && id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
        {
            id
        }
        _ => bail!("Invalid Google Sheets URL"),
    };

    let gid = url
        .fragment()
        .and_then(|f| f.split('=').nth(1))
        .filter(|g| !g.is_empty())
        .unwrap_or("0");

    Ok(format!(
        "https://docs.google.com/spreadsheets/d/{}/export?format=csv&gid={}",
        spreadsheet_id, gid
    ))
}

/// Download a public sheet as CSV text.
pub async fn fetch_sheet_csv(sheet_url: &str, timeout_secs: u64) -> Result<String> {
    let csv_url = sheet_csv_url(sheet_url)?;
    tracing::info!(url = %csv_url, "fetching sheet");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;

    let response = client
        .get(&csv_url)
        .send()
        .await
        .with_context(|| "Error fetching Google Sheet")?;

    let status = response.status();
    if !status.is_success() {
        bail!("Failed to fetch Google Sheet: {}", status);
    }

    response
        .text()
        .await
        .with_context(|| "Failed to read Google Sheet body")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_export_url_with_gid() {
        let url = sheet_csv_url(
            "https://docs.google.com/spreadsheets/d/1AbC-d_9/edit#gid=123456",
        )
        .unwrap();
        assert_eq!(
            url,
            "https://docs.google.com/spreadsheets/d/1AbC-d_9/export?format=csv&gid=123456"
        );
    }

    #[test]
    fn gid_defaults_to_first_tab() {
        let url = sheet_csv_url("https://docs.google.com/spreadsheets/d/xyz/edit").unwrap();
        assert!(url.ends_with("gid=0"));
    }

    #[test]
    fn rejects_non_sheet_links() {
        assert!(sheet_csv_url("https://example.com/docs/abc").is_err());
        assert!(sheet_csv_url("not a url").is_err());
        assert!(sheet_csv_url("https://example.com/d/abc").is_err());
        assert!(sheet_csv_url("https://docs.google.com/document/d/abc/edit").is_err());
    }

    #[test]
    fn detects_sheet_sources() {
        assert!(is_sheet_url("https://docs.google.com/spreadsheets/d/abc/edit"));
        assert!(!is_sheet_url("./data/feedback.csv"));
    }
}
