//! Network-facing half of a run: submission, status polling and result retrieval.

pub(crate) mod artifacts;
mod client;
mod fetcher;
mod poller;
mod submitter;

#[cfg(test)]
pub(crate) mod fake;

pub use client::HttpRunService;
pub use fetcher::{decode_memo, ResultFetcher};
pub use poller::StatusPoller;
pub use submitter::{RunRequest, RunSubmitter};

use crate::error::ServiceError;
use crate::model::{RunHandle, RunStatus, Summary};
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// One `POST /api/runs` request, already encoded for transport.
#[derive(Debug, Clone)]
pub struct SubmitPayload {
    pub file_name: String,
    pub dataset: Bytes,
    /// JSON-encoded run configuration.
    pub config: String,
    pub make_memo: bool,
    pub memo_model: Option<String>,
}

/// The remote optimization service.
#[async_trait]
pub trait RunService: Send + Sync {
    async fn submit(&self, payload: SubmitPayload) -> Result<RunHandle, ServiceError>;
    async fn status(&self, handle: &RunHandle) -> Result<RunStatus, ServiceError>;
    async fn summary(&self, handle: &RunHandle) -> Result<Summary, ServiceError>;
    /// Raw memo body, undecoded: a JSON object or a JSON string holding one. Decoding
    /// is left to the caller so a malformed body is not a request failure.
    async fn memo(&self, handle: &RunHandle) -> Result<String, ServiceError>;
}

/// Cooperative cancellation shared between a run and whoever may abort it.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives in `self`, so this only returns once the flag is set.
        let _ = rx.wait_for(|c| *c).await;
    }

    /// Run `fut` unless cancelled first. `None` means the signal won.
    pub async fn guard<F: Future>(&self, fut: F) -> Option<F::Output> {
        if self.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            out = fut => Some(out),
        }
    }
}
