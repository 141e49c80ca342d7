//! Scripted in-memory service for tests.

use crate::engine::{RunService, SubmitPayload};
use crate::error::ServiceError;
use crate::model::{RunHandle, RunState, RunStatus, SplitMetrics, Summary};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Submit,
    Status,
    Summary,
    Memo,
}

pub(crate) fn status(state: RunState, files: &[&str]) -> RunStatus {
    RunStatus {
        state,
        files: files.iter().map(|f| f.to_string()).collect(),
        error: None,
    }
}

pub(crate) fn sample_summary() -> Summary {
    let split = |cvar, mean| SplitMetrics {
        cvar,
        mean,
        extra: BTreeMap::new(),
    };
    Summary {
        objective: 0.0213,
        alpha: 0.05,
        turnover: 0.42,
        train: split(0.0201, 0.0004),
        test: split(0.0248, 0.0002),
    }
}

pub(crate) fn sample_memo_payload() -> serde_json::Value {
    serde_json::json!({
        "memo": {
            "headline": "Tail risk cut by a fifth",
            "key_findings": ["CVaR down 21%", "Turnover within budget"],
            "risk_story": "Bond sleeve absorbs drawdowns.",
            "return_story": "Mean return roughly unchanged.",
            "crash_days_commentary": "Worst days cluster in March 2020.",
            "limitations": ["Single starting allocation"],
            "next_experiments": ["Raise alpha to 0.1"]
        },
        "model": "gpt-4o-mini"
    })
}

/// Replays a scripted status sequence; the last status repeats once the script runs out.
pub(crate) struct FakeService {
    calls: Mutex<Vec<Call>>,
    submissions: Mutex<Vec<SubmitPayload>>,
    statuses: Mutex<VecDeque<Result<RunStatus, ServiceError>>>,
    last_status: Mutex<Option<RunStatus>>,
    submit_error: Option<ServiceError>,
    summary: Result<Summary, ServiceError>,
    memo: Result<String, ServiceError>,
}

impl FakeService {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
            last_status: Mutex::new(Some(status(RunState::Done, &[]))),
            submit_error: None,
            summary: Ok(sample_summary()),
            memo: Ok(sample_memo_payload().to_string()),
        }
    }

    pub(crate) fn with_statuses(self, statuses: Vec<RunStatus>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into_iter().map(Ok).collect();
        self
    }

    pub(crate) fn with_status_error(self, err: ServiceError) -> Self {
        self.statuses.lock().unwrap().push_back(Err(err));
        self
    }

    pub(crate) fn with_submit_error(mut self, err: ServiceError) -> Self {
        self.submit_error = Some(err);
        self
    }

    pub(crate) fn with_summary(mut self, summary: Result<Summary, ServiceError>) -> Self {
        self.summary = summary;
        self
    }

    pub(crate) fn with_memo(mut self, memo: Result<String, ServiceError>) -> Self {
        self.memo = memo;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn last_submission(&self) -> Option<SubmitPayload> {
        self.submissions.lock().unwrap().last().cloned()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RunService for FakeService {
    async fn submit(&self, payload: SubmitPayload) -> Result<RunHandle, ServiceError> {
        self.record(Call::Submit);
        self.submissions.lock().unwrap().push(payload);
        match &self.submit_error {
            Some(e) => Err(e.clone()),
            None => Ok(RunHandle::new("run-0001")),
        }
    }

    async fn status(&self, _handle: &RunHandle) -> Result<RunStatus, ServiceError> {
        self.record(Call::Status);
        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(Ok(s)) => {
                *self.last_status.lock().unwrap() = Some(s.clone());
                Ok(s)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last_status
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ServiceError::Transport("no status scripted".into())),
        }
    }

    async fn summary(&self, _handle: &RunHandle) -> Result<Summary, ServiceError> {
        self.record(Call::Summary);
        self.summary.clone()
    }

    async fn memo(&self, _handle: &RunHandle) -> Result<String, ServiceError> {
        self.record(Call::Memo);
        self.memo.clone()
    }
}
