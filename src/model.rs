use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Connection and timing settings for talking to the optimization service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub run_deadline: Duration,
    /// Deadline used when a memo was requested; memo generation is slower.
    #[serde(with = "humantime_serde")]
    pub memo_run_deadline: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl ClientSettings {
    pub fn deadline_for(&self, memo_requested: bool) -> Duration {
        if memo_requested {
            self.memo_run_deadline
        } else {
            self.run_deadline
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".into(),
            poll_interval: Duration::from_millis(800),
            run_deadline: Duration::from_millis(180_000),
            memo_run_deadline: Duration::from_millis(240_000),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("cvar-run-cli/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Identifier the service assigns to a run at submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunHandle(String);

impl RunHandle {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    #[serde(rename = "status")]
    pub state: RunState,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Metrics for one sample split. Fields beyond `cvar` and `mean` are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitMetrics {
    pub cvar: f64,
    pub mean: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub objective: f64,
    pub alpha: f64,
    pub turnover: f64,
    pub train: SplitMetrics,
    pub test: SplitMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Memo {
    pub headline: String,
    pub key_findings: Vec<String>,
    pub risk_story: String,
    pub return_story: String,
    pub crash_days_commentary: String,
    pub limitations: Vec<String>,
    pub next_experiments: Vec<String>,
    /// Text-generation model that wrote the memo.
    pub model: String,
}

/// What became of the memo for a completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoOutcome {
    NotRequested,
    /// Requested, but the payload could not be decoded.
    Unavailable { reason: String },
    Present(Memo),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlotArtifact {
    pub title: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactLink {
    pub label: &'static str,
    pub path: String,
}

/// Everything retrieved for a run that reached `done`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedRun {
    pub handle: RunHandle,
    pub status: RunStatus,
    pub summary: Summary,
    pub memo: MemoOutcome,
    pub plots: Vec<PlotArtifact>,
    pub links: Vec<ArtifactLink>,
}

/// Lifecycle of the current run. Each state carries only the data valid in it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Submitting,
    Polling {
        handle: RunHandle,
        latest: Option<RunStatus>,
    },
    FetchingResults {
        handle: RunHandle,
        status: RunStatus,
    },
    Completed(Box<CompletedRun>),
    Failed {
        handle: Option<RunHandle>,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseKind {
    Idle,
    Submitting,
    Polling,
    FetchingResults,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            RunPhase::Idle => PhaseKind::Idle,
            RunPhase::Submitting => PhaseKind::Submitting,
            RunPhase::Polling { .. } => PhaseKind::Polling,
            RunPhase::FetchingResults { .. } => PhaseKind::FetchingResults,
            RunPhase::Completed(_) => PhaseKind::Completed,
            RunPhase::Failed { .. } => PhaseKind::Failed,
        }
    }

    /// A run is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            RunPhase::Submitting | RunPhase::Polling { .. } | RunPhase::FetchingResults { .. }
        )
    }

    pub fn handle(&self) -> Option<&RunHandle> {
        match self {
            RunPhase::Idle | RunPhase::Submitting => None,
            RunPhase::Polling { handle, .. } | RunPhase::FetchingResults { handle, .. } => {
                Some(handle)
            }
            RunPhase::Completed(run) => Some(&run.handle),
            RunPhase::Failed { handle, .. } => handle.as_ref(),
        }
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            RunPhase::Failed { message, .. } => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RunEvent {
    PhaseChanged {
        phase: PhaseKind,
    },
    /// Every polled status, in request order.
    StatusObserved {
        status: RunStatus,
    },
    Info(InfoEvent),
    RunFinished {
        // Boxed: a completed run is much larger than the other variants.
        outcome: Box<RunPhase>,
    },
}

/// Structured info events consumed by CLI layers.
#[derive(Debug, Clone)]
pub enum InfoEvent {
    Message(String),
    Submitted { handle: RunHandle },
    RejectedBusy,
    Cancelling,
    MemoUnavailable { reason: String },
}

impl InfoEvent {
    /// Render a human-readable message for CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Submitted { handle } => format!("Submitted run {handle}"),
            InfoEvent::RejectedBusy => "A run is already in progress".to_string(),
            InfoEvent::Cancelling => "Cancelling…".to_string(),
            InfoEvent::MemoUnavailable { reason } => {
                format!("Memo could not be read ({reason}); showing results without it")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_decodes_wire_shape() {
        let s: RunStatus = serde_json::from_str(
            r#"{"status":"error","files":[],"error":"bad csv"}"#,
        )
        .unwrap();
        assert_eq!(s.state, RunState::Error);
        assert_eq!(s.error.as_deref(), Some("bad csv"));

        let s: RunStatus = serde_json::from_str(r#"{"status":"running"}"#).unwrap();
        assert_eq!(s.state, RunState::Running);
        assert!(s.files.is_empty());
    }

    #[test]
    fn summary_keeps_extra_split_metrics() {
        let s: Summary = serde_json::from_str(
            r#"{"objective":0.021,"alpha":0.05,"turnover":0.31,
                "train":{"cvar":0.02,"mean":0.0004,"vol":0.011},
                "test":{"cvar":0.025,"mean":0.0002}}"#,
        )
        .unwrap();
        assert_eq!(s.train.extra.get("vol"), Some(&serde_json::json!(0.011)));
        assert!(s.test.extra.is_empty());
    }

    #[test]
    fn busy_only_while_in_flight() {
        assert!(!RunPhase::Idle.is_busy());
        assert!(RunPhase::Submitting.is_busy());
        let handle = RunHandle::new("r1");
        assert!(RunPhase::Polling {
            handle: handle.clone(),
            latest: None
        }
        .is_busy());
        let failed = RunPhase::Failed {
            handle: Some(handle),
            message: "x".into(),
        };
        assert!(!failed.is_busy());
        assert_eq!(failed.failure_message(), Some("x"));
        assert_eq!(failed.handle().map(RunHandle::as_str), Some("r1"));
    }

    #[test]
    fn deadline_depends_on_memo() {
        let s = ClientSettings::default();
        assert_eq!(s.deadline_for(false), Duration::from_millis(180_000));
        assert_eq!(s.deadline_for(true), Duration::from_millis(240_000));
        assert_eq!(s.poll_interval, Duration::from_millis(800));
    }
}
