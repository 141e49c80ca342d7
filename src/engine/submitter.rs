use crate::config::RunConfig;
use crate::dataset::DatasetHandle;
use crate::engine::{RunService, SubmitPayload};
use crate::error::RunError;
use crate::model::RunHandle;
use tracing::info;

/// Everything a caller supplies to start one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub dataset: Option<DatasetHandle>,
    /// Frozen copy of the normalized configuration.
    pub config: RunConfig,
    pub make_memo: bool,
    pub memo_model: Option<String>,
}

pub struct RunSubmitter<'a> {
    service: &'a dyn RunService,
}

impl<'a> RunSubmitter<'a> {
    pub fn new(service: &'a dyn RunService) -> Self {
        Self { service }
    }

    /// Package the request and send it. A missing or unreadable dataset fails before any
    /// network call.
    pub async fn submit(&self, request: &RunRequest) -> Result<RunHandle, RunError> {
        let dataset = request.dataset.as_ref().ok_or(RunError::MissingDataset)?;
        let loaded = dataset.load().await?;
        loaded.log_shape();

        let config = request.config.to_document()?;
        let memo_model = request
            .memo_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        let payload = SubmitPayload {
            file_name: loaded.file_name,
            dataset: loaded.contents,
            config,
            make_memo: request.make_memo,
            memo_model,
        };
        let handle = self
            .service
            .submit(payload)
            .await
            .map_err(RunError::Submission)?;
        info!(run_id = %handle, memo = request.make_memo, "run submitted");
        Ok(handle)
    }
}
