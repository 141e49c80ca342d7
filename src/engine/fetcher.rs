use crate::engine::artifacts::ArtifactPolicy;
use crate::engine::RunService;
use crate::error::RunError;
use crate::model::{ArtifactLink, Memo, MemoOutcome, PlotArtifact, RunHandle, RunStatus, Summary};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct MemoEnvelope {
    memo: MemoBody,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Deserialize)]
struct MemoBody {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    key_findings: Vec<String>,
    #[serde(default)]
    risk_story: String,
    #[serde(default)]
    return_story: String,
    #[serde(default)]
    crash_days_commentary: String,
    #[serde(default)]
    limitations: Vec<String>,
    #[serde(default)]
    next_experiments: Vec<String>,
}

/// Decode a memo body that holds either a JSON object or a JSON string encoding one.
pub fn decode_memo(body: &str) -> Result<Memo, String> {
    let payload: serde_json::Value = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let value = match payload {
        serde_json::Value::String(encoded) => {
            serde_json::from_str::<serde_json::Value>(&encoded).map_err(|e| e.to_string())?
        }
        other => other,
    };
    let MemoEnvelope { memo, model } =
        serde_json::from_value(value).map_err(|e| e.to_string())?;
    Ok(Memo {
        headline: memo.headline,
        key_findings: memo.key_findings,
        risk_story: memo.risk_story,
        return_story: memo.return_story,
        crash_days_commentary: memo.crash_days_commentary,
        limitations: memo.limitations,
        next_experiments: memo.next_experiments,
        model,
    })
}

/// Retrieves what a `done` run produced.
pub struct ResultFetcher<'a> {
    service: &'a dyn RunService,
    policy: ArtifactPolicy,
}

impl<'a> ResultFetcher<'a> {
    pub fn new(service: &'a dyn RunService, policy: ArtifactPolicy) -> Self {
        Self { service, policy }
    }

    pub async fn fetch_summary(&self, handle: &RunHandle) -> Result<Summary, RunError> {
        debug!(run_id = %handle, "fetching summary");
        self.service
            .summary(handle)
            .await
            .map_err(|source| RunError::Fetch {
                artifact: "summary",
                source,
            })
    }

    /// A failed request is fatal; an undecodable payload is not.
    pub async fn fetch_memo(&self, handle: &RunHandle) -> Result<MemoOutcome, RunError> {
        debug!(run_id = %handle, "fetching memo");
        let body = self
            .service
            .memo(handle)
            .await
            .map_err(|source| RunError::Fetch {
                artifact: "memo",
                source,
            })?;
        match decode_memo(&body) {
            Ok(memo) => Ok(MemoOutcome::Present(memo)),
            Err(reason) => {
                warn!(run_id = %handle, %reason, "memo payload could not be decoded");
                Ok(MemoOutcome::Unavailable { reason })
            }
        }
    }

    pub fn derive_plots(&self, status: &RunStatus) -> Vec<PlotArtifact> {
        self.policy.derive_plots(status)
    }

    pub fn derived_artifact_links(&self, status: &RunStatus) -> Vec<ArtifactLink> {
        self.policy.derived_artifact_links(status)
    }
}
