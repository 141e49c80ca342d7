use crate::orchestrator::ResultView;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// `<data_local_dir>/cvar-run-cli/runs`.
pub fn runs_dir() -> Result<PathBuf> {
    let base = dirs::data_local_dir().context("no local data directory on this platform")?;
    Ok(base.join("cvar-run-cli").join("runs"))
}

/// Auto-save a result view under the platform data directory.
pub(crate) fn save_run(view: &ResultView) -> Result<PathBuf> {
    save_run_in(&runs_dir()?, view)
}

pub(crate) fn save_run_in(dir: &Path, view: &ResultView) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(file_name(view));
    write_json(&path, view)?;
    tracing::info!(path = %path.display(), "saved run");
    Ok(path)
}

pub(crate) fn export_json(path: &Path, view: &ResultView) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    write_json(path, view)
}

fn write_json(path: &Path, view: &ResultView) -> Result<()> {
    let json = serde_json::to_string_pretty(view).context("serialize run view")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))
}

/// `2024-05-01T12:30:00Z` + `run/42` -> `20240501T123000Z-run_42.json`.
fn file_name(view: &ResultView) -> String {
    let stamp: String = view
        .completed_utc
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let run_id: String = view
        .run_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{stamp}-{run_id}.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::reset;
    use crate::engine::fake::{sample_summary, status};
    use crate::model::{CompletedRun, MemoOutcome, RunHandle, RunState};

    fn view(run_id: &str) -> ResultView {
        let run = CompletedRun {
            handle: RunHandle::new(run_id),
            status: status(RunState::Done, &["summary.json"]),
            summary: sample_summary(),
            memo: MemoOutcome::NotRequested,
            plots: Vec::new(),
            links: Vec::new(),
        };
        let mut view = ResultView::build("http://svc:8000", &reset(), &run).unwrap();
        view.completed_utc = "2024-05-01T12:30:00Z".into();
        view
    }

    #[test]
    fn saved_file_is_named_by_time_and_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_run_in(dir.path(), &view("run/42")).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "20240501T123000Z-run_42.json"
        );
        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["run_id"], "run/42");
        assert_eq!(doc["config_version"], 1);
    }

    #[test]
    fn export_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/run.json");
        export_json(&path, &view("abc")).unwrap();
        assert!(path.exists());
    }
}
