//! Run lifecycle controller.
//!
//! Owns start/restart/cancel orchestration on top of a shared [`RunOrchestrator`] and
//! emits events for presentation layers. Runs never overlap: a restart cancels the active
//! run and starts the next one only after observing its completion.

use crate::engine::{CancelSignal, RunRequest};
use crate::error::OrchestratorError;
use crate::model::{InfoEvent, RunEvent, RunPhase};
use crate::orchestrator::RunOrchestrator;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Duration;

/// Commands emitted by CLI layers to control runs.
#[derive(Debug)]
pub(crate) enum UiCommand {
    Start(RunRequest),
    /// Cancel whatever is running, then start this request.
    Restart(RunRequest),
    Cancel,
    Quit,
}

/// Internal handle for a running run task.
struct RunCtx {
    cancel: CancelSignal,
    handle: Option<tokio::task::JoinHandle<Result<RunPhase, OrchestratorError>>>,
}

/// Spawn a new run and return its control handle.
fn start_run(orchestrator: &Arc<RunOrchestrator>, request: RunRequest) -> RunCtx {
    let cancel = CancelSignal::new();
    let orchestrator = orchestrator.clone();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { orchestrator.run(request, run_cancel).await });
    RunCtx {
        cancel,
        handle: Some(handle),
    }
}

fn send_info(event_tx: &UnboundedSender<RunEvent>, info: InfoEvent) {
    let _ = event_tx.send(RunEvent::Info(info));
}

/// Process commands until `Quit` (or the command channel closes) and no run is active.
/// Returns the terminal phase of the last run that finished, if any.
pub(crate) async fn run_controller(
    orchestrator: Arc<RunOrchestrator>,
    event_tx: UnboundedSender<RunEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<Option<RunPhase>> {
    let mut run_ctx: Option<RunCtx> = None;
    let mut restart_pending: Option<RunRequest> = None;
    let mut quit_pending = false;
    let mut last_outcome: Option<RunPhase> = None;
    // Cancel watchdog: if a cancel takes too long, emit a status message to keep UI feedback alive.
    let mut cancel_deadline: Option<tokio::time::Instant> = None;
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));

    let begin_cancel = |ctx: &RunCtx, deadline: &mut Option<tokio::time::Instant>| {
        ctx.cancel.cancel();
        send_info(&event_tx, InfoEvent::Cancelling);
        *deadline = Some(tokio::time::Instant::now() + Duration::from_secs(3));
    };

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Start(request)) => {
                        if run_ctx.is_some() {
                            send_info(&event_tx, InfoEvent::RejectedBusy);
                        } else {
                            run_ctx = Some(start_run(&orchestrator, request));
                        }
                    }
                    Some(UiCommand::Restart(request)) => {
                        if let Some(ctx) = &run_ctx {
                            restart_pending = Some(request);
                            begin_cancel(ctx, &mut cancel_deadline);
                        } else {
                            run_ctx = Some(start_run(&orchestrator, request));
                        }
                    }
                    Some(UiCommand::Cancel) => {
                        if let Some(ctx) = &run_ctx {
                            begin_cancel(ctx, &mut cancel_deadline);
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        // Quit waits for the current run to finish so its final state is reported.
                        quit_pending = true;
                        restart_pending = None;
                        match &run_ctx {
                            Some(ctx) => begin_cancel(ctx, &mut cancel_deadline),
                            None => break,
                        }
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            maybe_done = async {
                if let Some(ctx) = &mut run_ctx {
                    if let Some(h) = ctx.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    match join_res {
                        Ok(Ok(phase)) => last_outcome = Some(phase),
                        Ok(Err(OrchestratorError::Busy)) => {
                            send_info(&event_tx, InfoEvent::RejectedBusy);
                        }
                        Err(e) => {
                            send_info(&event_tx, InfoEvent::Message(format!("Run task failed: {e}")));
                        }
                    }
                    run_ctx = None;
                    cancel_deadline = None;
                    if quit_pending {
                        break;
                    }
                    if let Some(request) = restart_pending.take() {
                        run_ctx = Some(start_run(&orchestrator, request));
                    }
                }
            }
            // If cancel stalls (e.g., network op in flight), keep the user informed.
            _ = watchdog.tick() => {
                if let Some(deadline) = cancel_deadline {
                    if tokio::time::Instant::now() >= deadline && run_ctx.is_some() {
                        send_info(&event_tx, InfoEvent::Message("Still cancelling…".into()));
                        cancel_deadline = None;
                    }
                }
            }
        }
    }

    Ok(last_outcome)
}
