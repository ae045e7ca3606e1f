//! # config — explicit run configuration
//!
//! Built once at start-up from environment variables and handed to every
//! component by reference. Nothing reads the environment after this point, so
//! tests construct a [`Config`] from a plain map via [`Config::from_lookup`].

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, NaiveDate};

use crate::error::PipelineError;

/// AI providers for the narrative note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    Gemini,   // Google Gemini 1.5 Flash
    Claude,   // Anthropic Claude 3.5 Sonnet
    OpenAi,   // OpenAI GPT-4o
    /// Rule-based note, no network call.
    Disabled,
}

impl std::fmt::Display for AiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiProvider::Gemini   => write!(f, "Gemini 1.5 Flash"),
            AiProvider::Claude   => write!(f, "Claude 3.5 Sonnet"),
            AiProvider::OpenAi   => write!(f, "GPT-4o"),
            AiProvider::Disabled => write!(f, "rule-based"),
        }
    }
}

/// Remote structured store credentials.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub api_url:     String,
    pub token:       String,
    pub database_id: String,
}

/// Code-hosting archive target, e.g. `"owner/cme-data-archive"`.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub repo:  String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Trading day being processed.
    pub report_date:       NaiveDate,
    /// Reports for a day live in `{data_dir}/{report_date}/`.
    pub data_dir:          PathBuf,
    pub layout_file:       PathBuf,
    /// File name of the issues-and-stops report.
    pub delivery_report:   String,
    /// Width of the dealer summary.
    pub top_n:             usize,
    pub http_timeout:      Duration,
    pub parse_timeout:     Duration,
    pub fetch_reports:     bool,
    /// Use the in-process store; no remote writes.
    pub dry_run:           bool,
    /// `None` only in dry-run mode.
    pub store:             Option<StoreConfig>,
    pub ai_provider:       AiProvider,
    pub ai_api_key:        Option<String>,
    pub archive:           Option<ArchiveConfig>,
    pub report_base_url:   String,
    pub exchange_base_url: String,
    pub price_base_url:    String,
}

impl Config {
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds and validates a config from any key lookup. Every required
    /// credential is checked here, before the first network call.
    pub fn from_lookup<F>(var: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| PipelineError::ConfigurationMissing(format!("{key} is required")))
        };

        let dry_run = flag(get("DRY_RUN"));

        let store = if dry_run {
            None
        } else {
            Some(StoreConfig {
                api_url:     get("NOTION_API_URL").unwrap_or_else(|| "https://api.notion.com/v1".to_string()),
                token:       require("NOTION_TOKEN")?,
                database_id: require("NOTION_DATABASE_ID")?,
            })
        };

        let ai_provider = match get("AI_PROVIDER").unwrap_or_else(|| "none".to_string()).to_lowercase().as_str() {
            "gemini" => AiProvider::Gemini,
            "claude" => AiProvider::Claude,
            "openai" => AiProvider::OpenAi,
            "none" | "off" => AiProvider::Disabled,
            other => {
                return Err(PipelineError::ConfigurationMissing(format!(
                    "unknown AI_PROVIDER '{other}', use gemini, claude, openai or none"
                )))
            }
        };
        let ai_api_key = match ai_provider {
            AiProvider::Disabled => None,
            _ => Some(require("AI_API_KEY")?),
        };

        let archive = match (get("ARCHIVE_REPO"), get("ARCHIVE_TOKEN")) {
            (Some(repo), Some(token)) => Some(ArchiveConfig { repo, token }),
            (None, None) => None,
            (Some(_), None) => return Err(PipelineError::ConfigurationMissing("ARCHIVE_TOKEN is required when ARCHIVE_REPO is set".into())),
            (None, Some(_)) => return Err(PipelineError::ConfigurationMissing("ARCHIVE_REPO is required when ARCHIVE_TOKEN is set".into())),
        };

        let report_date = match get("REPORT_DATE") {
            Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
                PipelineError::ConfigurationMissing(format!("REPORT_DATE must be YYYY-MM-DD, got '{raw}'"))
            })?,
            None => Local::now().date_naive() - chrono::Duration::days(1),
        };

        let top_n = number(get("TOP_N_DEALERS"), "TOP_N_DEALERS", 3)?;
        if top_n == 0 {
            return Err(PipelineError::ConfigurationMissing("TOP_N_DEALERS must be at least 1".into()));
        }

        Ok(Self {
            report_date,
            data_dir:          PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "data".to_string())),
            layout_file:       PathBuf::from(get("LAYOUT_FILE").unwrap_or_else(|| "layouts/cme_metals.json".to_string())),
            delivery_report:   get("DELIVERY_REPORT").unwrap_or_else(|| "MetalsIssuesAndStopsReport.pdf".to_string()),
            top_n:             top_n as usize,
            http_timeout:      Duration::from_secs(number(get("HTTP_TIMEOUT_SECS"), "HTTP_TIMEOUT_SECS", 15)?),
            parse_timeout:     Duration::from_secs(number(get("PARSE_TIMEOUT_SECS"), "PARSE_TIMEOUT_SECS", 10)?),
            fetch_reports:     flag(get("FETCH_REPORTS")),
            dry_run,
            store,
            ai_provider,
            ai_api_key,
            archive,
            report_base_url:   get("REPORT_BASE_URL").unwrap_or_else(|| "https://www.cmegroup.com/delivery_reports".to_string()),
            exchange_base_url: get("EXCHANGE_BASE_URL").unwrap_or_else(|| "https://www.cmegroup.com".to_string()),
            price_base_url:    get("PRICE_BASE_URL").unwrap_or_else(|| "https://query1.finance.yahoo.com".to_string()),
        })
    }

    /// Local cache directory for this run's reports.
    pub fn report_dir(&self) -> PathBuf {
        self.data_dir.join(self.report_date.format("%Y-%m-%d").to_string())
    }
}

fn flag(raw: Option<String>) -> bool {
    matches!(raw.as_deref().map(str::to_lowercase).as_deref(), Some("1" | "true" | "yes" | "on"))
}

fn number(raw: Option<String>, key: &str, default: u64) -> Result<u64, PipelineError> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| PipelineError::ConfigurationMissing(format!("{key} must be a number, got '{v}'"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_missing_store_token_is_fatal() {
        let err = Config::from_lookup(lookup(&[("NOTION_DATABASE_ID", "db")])).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigurationMissing(ref m) if m.contains("NOTION_TOKEN")));
    }

    #[test]
    fn test_dry_run_needs_no_credentials() {
        let cfg = Config::from_lookup(lookup(&[("DRY_RUN", "true"), ("REPORT_DATE", "2026-01-11")])).unwrap();
        assert!(cfg.store.is_none());
        assert_eq!(cfg.ai_provider, AiProvider::Disabled);
        assert_eq!(cfg.top_n, 3);
        assert_eq!(cfg.report_dir(), PathBuf::from("data/2026-01-11"));
    }

    #[test]
    fn test_ai_provider_requires_key() {
        let err = Config::from_lookup(lookup(&[("DRY_RUN", "1"), ("AI_PROVIDER", "gemini")])).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigurationMissing(ref m) if m.contains("AI_API_KEY")));

        let cfg = Config::from_lookup(lookup(&[
            ("DRY_RUN", "1"),
            ("AI_PROVIDER", "Claude"),
            ("AI_API_KEY", "k"),
        ]))
        .unwrap();
        assert_eq!(cfg.ai_provider, AiProvider::Claude);
    }

    #[test]
    fn test_half_configured_archive_is_rejected() {
        let err = Config::from_lookup(lookup(&[("DRY_RUN", "1"), ("ARCHIVE_REPO", "o/r")])).unwrap_err();
        assert_eq!(err.kind(), "configuration_missing");
    }

    #[test]
    fn test_invalid_numbers_and_dates() {
        assert!(Config::from_lookup(lookup(&[("DRY_RUN", "1"), ("TOP_N_DEALERS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DRY_RUN", "1"), ("REPORT_DATE", "11/01/2026")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DRY_RUN", "1"), ("HTTP_TIMEOUT_SECS", "soon")])).is_err());
    }
}
