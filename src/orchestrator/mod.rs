//! Application-level orchestration utilities.
//!
//! This module owns the run state machine, start/cancel/restart control, and post-run
//! processing such as result assembly, auto-save and export. CLI layers call into this
//! module to keep responsibilities separated.

mod controller;
mod lifecycle;
mod post_process;

pub(crate) use controller::{run_controller, UiCommand};
pub use lifecycle::RunOrchestrator;
pub(crate) use post_process::{process_run_completion, ResultView};
