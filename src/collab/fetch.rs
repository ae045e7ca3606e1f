//! # fetch — download the day's reports into the local cache

use std::path::Path;

use tracing::{info, warn};

use super::market::BROWSER_UA;
use crate::config::Config;
use crate::error::PipelineError;

pub async fn download(
    client: &reqwest::Client,
    config: &Config,
    file_name: &str,
) -> Result<Vec<u8>, PipelineError> {
    let url = format!("{}/{file_name}", config.report_base_url.trim_end_matches('/'));

    let resp = client
        .get(&url)
        .header("User-Agent", BROWSER_UA)
        .timeout(config.http_timeout)
        .send()
        .await
        .map_err(|e| PipelineError::external("report download", e))?;

    if !resp.status().is_success() {
        return Err(PipelineError::external("report download", format!("{file_name}: HTTP {}", resp.status())));
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| PipelineError::external("report download", e))?;
    Ok(bytes.to_vec())
}

/// Downloads every file into `dir`. A failed file is logged and left absent;
/// the parser reports it as unavailable later.
pub async fn download_all(client: &reqwest::Client, config: &Config, dir: &Path, files: &[String]) -> usize {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!(dir = %dir.display(), error = %e, "Cannot create report directory");
        return 0;
    }

    let mut saved = 0;
    for file in files {
        match download(client, config, file).await {
            Ok(bytes) => match tokio::fs::write(dir.join(file), &bytes).await {
                Ok(()) => {
                    info!(file = %file, size = bytes.len(), "⬇️ Report downloaded");
                    saved += 1;
                }
                Err(e) => warn!(file = %file, error = %e, "Cannot write report"),
            },
            Err(e) => warn!(file = %file, error = %e, "Download failed"),
        }
    }
    saved
}
