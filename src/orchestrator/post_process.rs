//! Post-run processing utilities.
//!
//! Assembles the result view for a completed run and handles auto-save and export.

use crate::config::{RunConfig, DEFAULTS_VERSION};
use crate::engine::artifacts::artifact_url;
use crate::model::{CompletedRun, MemoOutcome, Summary};
use crate::storage;
use anyhow::Result;
use rand::Rng;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PlotView {
    pub title: String,
    pub path: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct LinkView {
    pub label: &'static str,
    pub path: String,
    pub url: String,
}

/// Consistent view of one completed run, as printed, saved and exported.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ResultView {
    pub run_id: String,
    pub completed_utc: String,
    pub config_version: u32,
    pub config: RunConfig,
    pub summary: Summary,
    pub memo: MemoOutcome,
    pub plots: Vec<PlotView>,
    pub links: Vec<LinkView>,
}

impl ResultView {
    /// Resolve artifact paths against the service. Plot URLs get a fresh cache-busting
    /// token so images from an earlier run with the same path are not served stale.
    pub fn build(base_url: &str, config: &RunConfig, run: &CompletedRun) -> Result<Self> {
        let token = rand::thread_rng().gen::<u64>().to_string();
        Self::build_with_token(base_url, config, run, &token)
    }

    fn build_with_token(
        base_url: &str,
        config: &RunConfig,
        run: &CompletedRun,
        token: &str,
    ) -> Result<Self> {
        let plots = run
            .plots
            .iter()
            .map(|p| {
                Ok(PlotView {
                    title: p.title.clone(),
                    path: p.path.clone(),
                    url: artifact_url(base_url, &run.handle, &p.path, Some(token))?.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let links = run
            .links
            .iter()
            .map(|l| {
                Ok(LinkView {
                    label: l.label,
                    path: l.path.clone(),
                    url: artifact_url(base_url, &run.handle, &l.path, None)?.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            run_id: run.handle.to_string(),
            completed_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            config_version: DEFAULTS_VERSION,
            config: config.clone(),
            summary: run.summary.clone(),
            memo: run.memo.clone(),
            plots,
            links,
        })
    }
}

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    pub view: ResultView,
    pub export_messages: Vec<String>,
    pub auto_saved_path: Option<PathBuf>,
}

/// Process a completed run: build its view, auto-save, and export.
pub(crate) fn process_run_completion(
    base_url: &str,
    config: &RunConfig,
    run: &CompletedRun,
    auto_save: bool,
    export_json: Option<&Path>,
) -> Result<ProcessedRun> {
    let view = ResultView::build(base_url, config, run)?;

    let auto_saved_path = if auto_save {
        match storage::save_run(&view) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!("auto-save failed: {e:#}");
                None
            }
        }
    } else {
        None
    };

    let mut export_messages = Vec::new();
    if let Some(export_path) = export_json {
        match storage::export_json(export_path, &view) {
            Ok(_) => export_messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    Ok(ProcessedRun {
        view,
        export_messages,
        auto_saved_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::reset;
    use crate::engine::artifacts::DEFAULT_POLICY;
    use crate::engine::fake::{sample_summary, status};
    use crate::model::{RunHandle, RunState};

    fn completed() -> CompletedRun {
        let s = status(
            RunState::Done,
            &[
                "figures/drawdown_chart.png",
                "weights_opt.csv",
                "figures/rolling_cvar.png",
                "returns_full.csv",
            ],
        );
        CompletedRun {
            handle: RunHandle::new("run-42"),
            plots: DEFAULT_POLICY.derive_plots(&s),
            links: DEFAULT_POLICY.derived_artifact_links(&s),
            status: s,
            summary: sample_summary(),
            memo: MemoOutcome::NotRequested,
        }
    }

    #[test]
    fn view_resolves_artifact_urls() {
        let view =
            ResultView::build_with_token("http://svc:8000", &reset(), &completed(), "99").unwrap();
        assert_eq!(view.run_id, "run-42");
        assert_eq!(
            view.plots[1].url,
            "http://svc:8000/runs/run-42/figures/rolling_cvar.png?v=99"
        );
        assert_eq!(view.plots[1].title, "Rolling Cvar");
        let links: Vec<_> = view.links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            links,
            vec![
                "http://svc:8000/runs/run-42/weights_opt.csv",
                "http://svc:8000/runs/run-42/returns_full.csv"
            ]
        );
    }

    #[test]
    fn each_view_gets_its_own_cache_token() {
        let run = completed();
        let a = ResultView::build("http://svc:8000", &reset(), &run).unwrap();
        let b = ResultView::build("http://svc:8000", &reset(), &run).unwrap();
        assert_ne!(a.plots[0].url, b.plots[0].url);
    }

    #[test]
    fn export_writes_view_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let processed =
            process_run_completion("http://svc:8000", &reset(), &completed(), false, Some(&path))
                .unwrap();

        assert!(processed.auto_saved_path.is_none());
        assert_eq!(processed.export_messages.len(), 1);
        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["run_id"], "run-42");
        assert_eq!(doc["memo"]["kind"], "not_requested");
        assert_eq!(doc["config"]["alpha"], 0.05);
    }
}
