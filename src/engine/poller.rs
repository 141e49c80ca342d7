use crate::engine::{CancelSignal, RunService};
use crate::error::RunError;
use crate::model::{RunHandle, RunState, RunStatus};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

const GENERIC_RUN_ERROR: &str = "Run failed";

/// Drives one run handle to a terminal status. Bound to a single handle for its lifetime.
pub struct StatusPoller<'a> {
    service: &'a dyn RunService,
    handle: &'a RunHandle,
    interval: Duration,
    deadline: Duration,
}

impl<'a> StatusPoller<'a> {
    pub fn new(
        service: &'a dyn RunService,
        handle: &'a RunHandle,
        interval: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            service,
            handle,
            interval,
            deadline,
        }
    }

    /// Poll until `done`, `error`, the deadline, or cancellation. `observe` sees every
    /// status in request order, terminal ones included. Returns the `done` status.
    pub async fn run(
        self,
        cancel: &CancelSignal,
        mut observe: impl FnMut(&RunStatus),
    ) -> Result<RunStatus, RunError> {
        let start = Instant::now();
        let deadline_at = start + self.deadline;

        loop {
            // Always wait a full interval first, including before the first query.
            cancel
                .guard(tokio::time::sleep(self.interval))
                .await
                .ok_or(RunError::Cancelled)?;

            // A hung query must not push the deadline out.
            let query = tokio::time::timeout_at(deadline_at, self.service.status(self.handle));
            let status = match cancel.guard(query).await {
                None => return Err(RunError::Cancelled),
                Some(Err(_elapsed)) => return Err(RunError::Timeout(self.deadline)),
                Some(Ok(res)) => res.map_err(RunError::StatusQuery)?,
            };

            debug!(run_id = %self.handle, state = ?status.state, files = status.files.len(), "status");
            observe(&status);

            match status.state {
                RunState::Done => {
                    info!(run_id = %self.handle, elapsed_ms = start.elapsed().as_millis() as u64, "run done");
                    return Ok(status);
                }
                RunState::Error => {
                    let message = status
                        .error
                        .filter(|e| !e.trim().is_empty())
                        .unwrap_or_else(|| GENERIC_RUN_ERROR.to_string());
                    info!(run_id = %self.handle, %message, "run reported error");
                    return Err(RunError::Run(message));
                }
                RunState::Pending | RunState::Running => {}
            }

            if start.elapsed() > self.deadline {
                return Err(RunError::Timeout(self.deadline));
            }
        }
    }
}
