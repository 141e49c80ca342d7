use crate::config::{defaults_record, load_params, ConfigModel};
use crate::dataset::DatasetHandle;
use crate::engine::{HttpRunService, RunRequest};
use crate::model::{ClientSettings, RunEvent, RunPhase};
use crate::orchestrator::{process_run_completion, run_controller, RunOrchestrator, UiCommand};
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
///
/// Each stream is locked per line only: tracing also writes to stderr, and a lock held
/// across lines would block every log call until the writer exits.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let mut out = std::io::stdout().lock();
                    let _ = writeln!(out, "{}", msg);
                    let _ = out.flush();
                }
                OutputLine::Stderr(msg) => {
                    let mut err = std::io::stderr().lock();
                    let _ = writeln!(err, "{}", msg);
                    let _ = err.flush();
                }
            }
        }
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "cvar-run-cli",
    version,
    about = "Submit CVaR portfolio optimization runs and collect their results"
)]
pub struct Cli {
    /// Base URL of the optimization service
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    pub base_url: String,

    /// Weights CSV to optimize (header: date + one column per asset); `-` reads stdin
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Flat table of parameter overrides (.toml or .json)
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Override one parameter, e.g. --set alpha=0.1 (repeatable, applied after --params)
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    pub set: Vec<String>,

    /// Ask the service to write an explanatory memo for the run
    #[arg(long)]
    pub memo: bool,

    /// Text-generation model for the memo (service default if omitted)
    #[arg(long)]
    pub memo_model: Option<String>,

    /// Print the result view as JSON instead of a text summary
    #[arg(long)]
    pub json: bool,

    /// Delay between status queries (must be non-zero)
    #[arg(long, default_value = "800ms", value_parser = parse_poll_interval)]
    pub poll_interval: humantime::Duration,

    /// How long to wait for a run without memo
    #[arg(long, default_value = "180s")]
    pub timeout: humantime::Duration,

    /// How long to wait for a run with memo
    #[arg(long, default_value = "240s")]
    pub memo_timeout: humantime::Duration,

    /// Timeout for each HTTP request
    #[arg(long, default_value = "30s")]
    pub request_timeout: humantime::Duration,

    /// Export the result view as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,

    /// Print the default parameter set and exit
    #[arg(long)]
    pub print_defaults: bool,
}

/// The poller waits a full interval before every query, so zero would mean busy polling.
fn parse_poll_interval(raw: &str) -> std::result::Result<humantime::Duration, String> {
    let interval: humantime::Duration = raw.parse().map_err(|e| format!("{e}"))?;
    if Duration::from(interval).is_zero() {
        return Err("poll interval must be greater than zero".into());
    }
    Ok(interval)
}

/// Build `ClientSettings` from CLI arguments.
pub fn build_settings(args: &Cli) -> ClientSettings {
    ClientSettings {
        base_url: args.base_url.clone(),
        poll_interval: Duration::from(args.poll_interval),
        run_deadline: Duration::from(args.timeout),
        memo_run_deadline: Duration::from(args.memo_timeout),
        request_timeout: Duration::from(args.request_timeout),
        ..ClientSettings::default()
    }
}

/// Defaults, then the params file, then each `--set` in order.
pub fn build_request(args: &Cli) -> Result<RunRequest> {
    let mut model = ConfigModel::new();
    if let Some(path) = args.params.as_deref() {
        model.apply_params(load_params(path)?)?;
    }
    for assignment in &args.set {
        model
            .apply_assignment(assignment)
            .with_context(|| format!("invalid --set `{assignment}`"))?;
    }
    tracing::debug!(config = ?model.config(), "run configuration");
    Ok(RunRequest {
        dataset: args.dataset.as_deref().map(dataset_handle).transpose()?,
        config: model.freeze(),
        make_memo: args.memo,
        memo_model: args.memo_model.clone(),
    })
}

fn dataset_handle(path: &std::path::Path) -> Result<DatasetHandle> {
    if path.as_os_str() != "-" {
        return Ok(DatasetHandle::File(path.to_path_buf()));
    }
    let mut contents = Vec::new();
    std::io::stdin()
        .read_to_end(&mut contents)
        .context("read dataset from stdin")?;
    Ok(DatasetHandle::Memory {
        file_name: "stdin.csv".into(),
        contents: contents.into(),
    })
}

/// Progress line for stderr, if the event has one.
fn progress_line(ev: &RunEvent) -> Option<String> {
    match ev {
        RunEvent::PhaseChanged { phase } => Some(format!("== {phase:?} ==")),
        RunEvent::StatusObserved { status } => {
            Some(format!("Status: {:?} ({} files)", status.state, status.files.len()))
        }
        RunEvent::Info(info) => Some(info.to_message()),
        RunEvent::RunFinished { .. } => None,
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.print_defaults {
        println!("{}", serde_json::to_string_pretty(&defaults_record())?);
        return Ok(());
    }

    let settings = build_settings(&args);
    let request = build_request(&args)?;
    let config = request.config.clone();
    let service = HttpRunService::new(&settings)?;

    let (out_tx, out_handle) = spawn_output_writer();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<RunEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let orchestrator = Arc::new(
        RunOrchestrator::new(Arc::new(service), settings).with_events(event_tx.clone()),
    );
    let base_url = orchestrator.settings().base_url.clone();
    let controller = tokio::spawn(run_controller(orchestrator, event_tx, cmd_rx));

    cmd_tx
        .send(UiCommand::Start(request))
        .map_err(|_| anyhow!("run controller stopped before the run started"))?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    loop {
        tokio::select! {
            ev = event_rx.recv() => match ev {
                Some(RunEvent::RunFinished { .. }) | None => break,
                Some(ev) => {
                    if let Some(line) = progress_line(&ev) {
                        let _ = out_tx.send(OutputLine::Stderr(line));
                    }
                }
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                let _ = cmd_tx.send(UiCommand::Quit);
            }
        }
    }
    let _ = cmd_tx.send(UiCommand::Quit);

    let outcome = controller.await.context("run controller task failed")??;
    let result = match outcome {
        Some(RunPhase::Completed(run)) => {
            let processed = process_run_completion(
                &base_url,
                &config,
                &run,
                args.auto_save,
                args.export_json.as_deref(),
            )?;
            if args.json {
                let out = serde_json::to_string_pretty(&processed.view)?;
                let _ = out_tx.send(OutputLine::Stdout(out));
            } else {
                let summary = crate::text_summary::build_text_summary(&processed.view);
                for line in summary.lines {
                    let _ = out_tx.send(OutputLine::Stdout(line));
                }
            }
            for msg in processed.export_messages {
                let _ = out_tx.send(OutputLine::Stderr(msg));
            }
            if let Some(p) = processed.auto_saved_path {
                let _ = out_tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
            }
            Ok(())
        }
        Some(phase) => {
            if let Some(handle) = phase.handle() {
                let _ = out_tx.send(OutputLine::Stderr(format!("Run: {handle}")));
            }
            Err(anyhow!(phase
                .failure_message()
                .unwrap_or("run ended without a result")
                .to_string()))
        }
        None => Err(anyhow!("run did not finish")),
    };

    drop(out_tx);
    let _ = out_handle.await;
    result
}
