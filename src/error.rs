//! Error taxonomy for a single optimization run.
//!
//! `ServiceError` is what the remote-service seam can report; `RunError` is what a run
//! can fail with. Every hard `RunError` collapses into the orchestrator's `Failed` phase
//! using its `Display` text as the user-facing message.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a [`crate::engine::RunService`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Non-success HTTP response. The body is kept verbatim for diagnosis.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ServiceError::Decode(e.to_string())
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("no dataset selected")]
    MissingDataset,
    #[error("failed to read dataset {path}: {source}")]
    DatasetRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode run config: {0}")]
    EncodeConfig(#[from] serde_json::Error),
    #[error("submission failed: {0}")]
    Submission(#[source] ServiceError),
    /// The service reported the run as failed. Displays the message unchanged.
    #[error("{0}")]
    Run(String),
    #[error("timed out after {}s waiting for the run to finish", .0.as_secs())]
    Timeout(Duration),
    #[error("status query failed: {0}")]
    StatusQuery(#[source] ServiceError),
    #[error("failed to fetch {artifact}: {source}")]
    Fetch {
        artifact: &'static str,
        #[source]
        source: ServiceError,
    },
    #[error("run cancelled")]
    Cancelled,
}

/// Errors from the orchestrator itself, as opposed to failures of a run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("a run is already in progress")]
    Busy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_error_displays_service_message_verbatim() {
        assert_eq!(RunError::Run("bad csv".into()).to_string(), "bad csv");
    }

    #[test]
    fn submission_error_keeps_status_and_body() {
        let err = RunError::Submission(ServiceError::Status {
            status: 422,
            body: "{\"detail\":\"config is not valid JSON\"}".into(),
        });
        assert_eq!(
            err.to_string(),
            "submission failed: HTTP 422: {\"detail\":\"config is not valid JSON\"}"
        );
    }

    #[test]
    fn timeout_mentions_deadline_seconds() {
        let err = RunError::Timeout(Duration::from_millis(180_000));
        assert_eq!(
            err.to_string(),
            "timed out after 180s waiting for the run to finish"
        );
    }
}
