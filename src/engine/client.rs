use crate::engine::{RunService, SubmitPayload};
use crate::error::ServiceError;
use crate::model::{ClientSettings, RunHandle, RunStatus, Summary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    run_id: String,
}

/// HTTP implementation of the optimization service contract.
#[derive(Clone)]
pub struct HttpRunService {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpRunService {
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        let base_url = Url::parse(&settings.base_url)
            .with_context(|| format!("invalid base URL `{}`", settings.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("base URL `{}` cannot carry a path", settings.base_url);
        }
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.request_timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn run_url(&self, handle: &RunHandle, tail: Option<&str>) -> Url {
        match tail {
            Some(t) => self.endpoint(&["api", "runs", handle.as_str(), t]),
            None => self.endpoint(&["api", "runs", handle.as_str()]),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ServiceError> {
        debug!(%url, "GET");
        let resp = self.http.get(url).send().await?;
        let resp = ensure_success(resp).await?;
        Ok(resp.json::<T>().await?)
    }
}

/// Turn a non-success response into `ServiceError::Status` with the body kept verbatim.
async fn ensure_success(resp: Response) -> Result<Response, ServiceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RunService for HttpRunService {
    async fn submit(&self, payload: SubmitPayload) -> Result<RunHandle, ServiceError> {
        let SubmitPayload {
            file_name,
            dataset,
            config,
            make_memo,
            memo_model,
        } = payload;
        let file = Part::stream(dataset)
            .file_name(file_name)
            .mime_str("text/csv")?;
        let mut form = Form::new()
            .part("file", file)
            .text("config", config)
            .text("make_memo", if make_memo { "true" } else { "false" });
        if let Some(model) = memo_model {
            form = form.text("memo_model", model);
        }

        let url = self.endpoint(&["api", "runs"]);
        debug!(%url, "POST");
        let resp = self.http.post(url).multipart(form).send().await?;
        let resp = ensure_success(resp).await?;
        let body: SubmitResponse = resp.json().await?;
        Ok(RunHandle::new(body.run_id))
    }

    async fn status(&self, handle: &RunHandle) -> Result<RunStatus, ServiceError> {
        self.get_json(self.run_url(handle, None)).await
    }

    async fn summary(&self, handle: &RunHandle) -> Result<Summary, ServiceError> {
        self.get_json(self.run_url(handle, Some("summary"))).await
    }

    async fn memo(&self, handle: &RunHandle) -> Result<String, ServiceError> {
        let url = self.run_url(handle, Some("memo"));
        debug!(%url, "GET");
        let resp = ensure_success(self.http.get(url).send().await?).await?;
        Ok(resp.text().await?)
    }
}
