//! # archive — keep the raw reports in a code-hosting repository
//!
//! Each file is written to `data/{date}/{file}` through the contents API
//! (create, or update when a blob already exists at that path), and linked
//! from the store via its raw URL.

use std::time::Duration;

use base64::Engine;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::info;

use crate::config::ArchiveConfig;
use crate::error::PipelineError;
use crate::models::FileLink;

const API_BASE: &str = "https://api.github.com";
const RAW_BASE: &str = "https://raw.githubusercontent.com";

pub fn archive_path(date: NaiveDate, file_name: &str) -> String {
    format!("data/{}/{file_name}", date.format("%Y-%m-%d"))
}

/// Stable, content-addressable link to an archived file.
pub fn raw_url(repo: &str, date: NaiveDate, file_name: &str) -> String {
    format!("{RAW_BASE}/{repo}/main/{}", archive_path(date, file_name))
}

#[derive(Debug, Clone)]
pub struct Archive {
    client:  reqwest::Client,
    config:  ArchiveConfig,
    timeout: Duration,
}

impl Archive {
    pub fn new(client: reqwest::Client, config: ArchiveConfig, timeout: Duration) -> Self {
        Self { client, config, timeout }
    }

    fn request(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.config.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "cme-metals")
            .timeout(self.timeout)
    }

    /// Uploads `bytes` and returns the link to store alongside the record.
    pub async fn store(&self, date: NaiveDate, file_name: &str, bytes: &[u8]) -> Result<FileLink, PipelineError> {
        let path = archive_path(date, file_name);
        let url = format!("{API_BASE}/repos/{}/contents/{path}", self.config.repo);

        // Existing blob sha is required to overwrite.
        let existing = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| PipelineError::external("archive", e))?;
        let sha = if existing.status().is_success() {
            let body: Value = existing
                .json()
                .await
                .map_err(|e| PipelineError::external("archive", e))?;
            body.get("sha").and_then(Value::as_str).map(str::to_string)
        } else {
            None
        };

        let mut body = json!({
            "message": format!("{} {file_name}", if sha.is_some() { "Update" } else { "Add" }),
            "content": base64::engine::general_purpose::STANDARD.encode(bytes),
        });
        if let Some(sha) = &sha {
            body["sha"] = json!(sha);
        }

        let resp = self
            .request(self.client.put(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::external("archive", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::external("archive", format!("HTTP {status}: {text}")));
        }

        info!(file = file_name, %path, "🗄️ Report archived");

        Ok(FileLink {
            name: file_name.to_string(),
            url:  raw_url(&self.config.repo, date, file_name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_url_layout() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 11).unwrap();
        assert_eq!(archive_path(d, "Gold_Stocks.xls"), "data/2026-01-11/Gold_Stocks.xls");
        assert_eq!(
            raw_url("owner/cme-data-archive", d, "Gold_Stocks.xls"),
            "https://raw.githubusercontent.com/owner/cme-data-archive/main/data/2026-01-11/Gold_Stocks.xls"
        );
    }
}
