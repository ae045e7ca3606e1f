//! # error
//!
//! Centralised pipeline error type.
//!
//! Every component returns `Result<_, PipelineError>` and the caller decides
//! what a failure means: the pipeline defaults or skips per commodity, and only
//! [`PipelineError::ConfigurationMissing`] stops a run before it starts.
//! Single bad report rows never show up here; the extractor drops them.

use thiserror::Error;

use crate::models::{Commodity, RecordKey};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Report file missing, unreadable, or its layout no longer resolves.
    #[error("Report unavailable for {commodity}: {reason}")]
    ReportUnavailable { commodity: Commodity, reason: String },

    /// Looking up the remote record for a key failed.
    #[error("Remote query failed for {key}: {status}")]
    RemoteQueryFailed { key: RecordKey, status: String },

    /// Creating or patching the remote record failed.
    #[error("Remote write failed for {key}: {status}")]
    RemoteWriteFailed { key: RecordKey, status: String },

    /// Price, open-interest, AI or archive collaborator failed.
    #[error("{service} unavailable: {reason}")]
    ExternalServiceUnavailable { service: &'static str, reason: String },

    /// A required credential or identifier is absent.
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),
}

impl PipelineError {
    pub fn report_unavailable(commodity: Commodity, reason: impl Into<String>) -> Self {
        PipelineError::ReportUnavailable { commodity, reason: reason.into() }
    }

    pub fn external(service: &'static str, err: impl std::fmt::Display) -> Self {
        PipelineError::ExternalServiceUnavailable { service, reason: err.to_string() }
    }

    /// Short machine-friendly tag for the run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::ReportUnavailable { .. }          => "report_unavailable",
            PipelineError::RemoteQueryFailed { .. }          => "remote_query_failed",
            PipelineError::RemoteWriteFailed { .. }          => "remote_write_failed",
            PipelineError::ExternalServiceUnavailable { .. } => "external_service_unavailable",
            PipelineError::ConfigurationMissing(_)           => "configuration_missing",
        }
    }
}
