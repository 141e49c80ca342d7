//! Run lifecycle state machine.
//!
//! `Idle -> Submitting -> Polling -> FetchingResults -> Completed`, with `Failed`
//! reachable from every in-flight state. The current phase lives in a `watch` channel so
//! presentation layers can render it; it doubles as the busy flag.

use crate::engine::artifacts::ArtifactPolicy;
use crate::engine::{CancelSignal, ResultFetcher, RunRequest, RunService, RunSubmitter, StatusPoller};
use crate::error::{OrchestratorError, RunError};
use crate::model::{
    ClientSettings, CompletedRun, InfoEvent, MemoOutcome, PhaseKind, RunEvent, RunHandle,
    RunPhase, RunStatus,
};
use std::sync::Arc;
use tokio::sync::{mpsc::UnboundedSender, watch};
use tracing::info;

pub struct RunOrchestrator {
    service: Arc<dyn RunService>,
    settings: ClientSettings,
    policy: ArtifactPolicy,
    phase: watch::Sender<RunPhase>,
    event_tx: Option<UnboundedSender<RunEvent>>,
}

impl RunOrchestrator {
    pub fn new(service: Arc<dyn RunService>, settings: ClientSettings) -> Self {
        let (phase, _) = watch::channel(RunPhase::Idle);
        Self {
            service,
            settings,
            policy: ArtifactPolicy::default(),
            phase,
            event_tx: None,
        }
    }

    /// Also emit `RunEvent`s on `tx`.
    pub fn with_events(mut self, tx: UnboundedSender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn phase(&self) -> RunPhase {
        self.phase.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.phase.borrow().is_busy()
    }

    fn emit(&self, ev: RunEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }

    fn transition(&self, next: RunPhase) {
        let kind = next.kind();
        self.phase.send_replace(next);
        self.emit(RunEvent::PhaseChanged { phase: kind });
    }

    /// Claim the busy flag and reset to `Submitting`, dropping any previous run's state.
    fn begin(&self) -> Result<(), OrchestratorError> {
        let claimed = self.phase.send_if_modified(|phase| {
            if phase.is_busy() {
                return false;
            }
            *phase = RunPhase::Submitting;
            true
        });
        if !claimed {
            return Err(OrchestratorError::Busy);
        }
        self.emit(RunEvent::PhaseChanged {
            phase: PhaseKind::Submitting,
        });
        Ok(())
    }

    fn fail(&self, handle: Option<RunHandle>, err: RunError) -> RunPhase {
        let message = err.to_string();
        info!(run_id = ?handle.as_ref().map(RunHandle::as_str), %message, "run failed");
        let failed = RunPhase::Failed { handle, message };
        self.transition(failed.clone());
        failed
    }

    /// Execute one run to a terminal phase. Rejected if a run is already in flight.
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: CancelSignal,
    ) -> Result<RunPhase, OrchestratorError> {
        self.begin()?;
        let outcome = match self.drive(&request, &cancel).await {
            Ok(completed) => {
                let done = RunPhase::Completed(Box::new(completed));
                self.transition(done.clone());
                done
            }
            Err((handle, err)) => self.fail(handle, err),
        };
        self.emit(RunEvent::RunFinished {
            outcome: Box::new(outcome.clone()),
        });
        Ok(outcome)
    }

    async fn drive(
        &self,
        request: &RunRequest,
        cancel: &CancelSignal,
    ) -> Result<CompletedRun, (Option<RunHandle>, RunError)> {
        let service = self.service.as_ref();

        let handle = cancel
            .guard(RunSubmitter::new(service).submit(request))
            .await
            .unwrap_or(Err(RunError::Cancelled))
            .map_err(|e| (None, e))?;
        self.emit(RunEvent::Info(InfoEvent::Submitted {
            handle: handle.clone(),
        }));
        self.transition(RunPhase::Polling {
            handle: handle.clone(),
            latest: None,
        });

        let deadline = self.settings.deadline_for(request.make_memo);
        let status = StatusPoller::new(service, &handle, self.settings.poll_interval, deadline)
            .run(cancel, |status| self.observe(status))
            .await
            .map_err(|e| (Some(handle.clone()), e))?;

        self.transition(RunPhase::FetchingResults {
            handle: handle.clone(),
            status: status.clone(),
        });
        self.fetch_results(handle, status, request.make_memo, cancel)
            .await
    }

    fn observe(&self, status: &RunStatus) {
        self.phase.send_modify(|phase| {
            if let RunPhase::Polling { latest, .. } = phase {
                *latest = Some(status.clone());
            }
        });
        self.emit(RunEvent::StatusObserved {
            status: status.clone(),
        });
    }

    async fn fetch_results(
        &self,
        handle: RunHandle,
        status: RunStatus,
        make_memo: bool,
        cancel: &CancelSignal,
    ) -> Result<CompletedRun, (Option<RunHandle>, RunError)> {
        let fetcher = ResultFetcher::new(self.service.as_ref(), self.policy);
        let fail = |e| (Some(handle.clone()), e);

        let summary = cancel
            .guard(fetcher.fetch_summary(&handle))
            .await
            .unwrap_or(Err(RunError::Cancelled))
            .map_err(fail)?;

        let memo = if make_memo {
            cancel
                .guard(fetcher.fetch_memo(&handle))
                .await
                .unwrap_or(Err(RunError::Cancelled))
                .map_err(fail)?
        } else {
            MemoOutcome::NotRequested
        };
        if let MemoOutcome::Unavailable { reason } = &memo {
            self.emit(RunEvent::Info(InfoEvent::MemoUnavailable {
                reason: reason.clone(),
            }));
        }

        let plots = fetcher.derive_plots(&status);
        let links = fetcher.derived_artifact_links(&status);
        info!(run_id = %handle, plots = plots.len(), links = links.len(), "results fetched");
        Ok(CompletedRun {
            handle,
            status,
            summary,
            memo,
            plots,
            links,
        })
    }
}
