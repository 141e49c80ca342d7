//! Text summary builder for CLI output.
//!
//! Formats a completed run's result view as human-readable lines for text mode.

use crate::model::{MemoOutcome, SplitMetrics};
use crate::orchestrator::ResultView;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn split_line(label: &str, m: &SplitMetrics) -> String {
    let mut line = format!("{label}: CVaR {:.4}  mean {:.4}", m.cvar, m.mean);
    for (k, v) in &m.extra {
        match v.as_f64() {
            Some(x) => line.push_str(&format!("  {k} {x:.4}")),
            None => line.push_str(&format!("  {k} {v}")),
        }
    }
    line
}

fn bullets(lines: &mut Vec<String>, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(format!("{heading}:"));
    lines.extend(items.iter().map(|i| format!("  - {i}")));
}

pub(crate) fn build_text_summary(view: &ResultView) -> TextSummary {
    let mut lines = Vec::new();
    let s = &view.summary;

    lines.push(format!("Run: {} ({})", view.run_id, view.completed_utc));
    lines.push(format!(
        "Objective: {} = {:.4}  (alpha {:.3}, turnover {:.3})",
        view.config.objective().as_str(),
        s.objective,
        s.alpha,
        s.turnover
    ));
    lines.push(split_line("Train", &s.train));
    lines.push(split_line("Test ", &s.test));

    match &view.memo {
        MemoOutcome::NotRequested => {}
        MemoOutcome::Unavailable { reason } => {
            lines.push(format!("Memo: unavailable ({reason})"));
        }
        MemoOutcome::Present(memo) => {
            lines.push(format!("Memo ({}): {}", memo.model, memo.headline));
            bullets(&mut lines, "Key findings", &memo.key_findings);
            for (heading, text) in [
                ("Risk", &memo.risk_story),
                ("Returns", &memo.return_story),
                ("Crash days", &memo.crash_days_commentary),
            ] {
                if !text.trim().is_empty() {
                    lines.push(format!("{heading}: {text}"));
                }
            }
            bullets(&mut lines, "Limitations", &memo.limitations);
            bullets(&mut lines, "Next experiments", &memo.next_experiments);
        }
    }

    if !view.plots.is_empty() {
        lines.push("Plots:".into());
        lines.extend(view.plots.iter().map(|p| format!("  {}: {}", p.title, p.url)));
    }
    if !view.links.is_empty() {
        lines.push("Artifacts:".into());
        lines.extend(view.links.iter().map(|l| format!("  {}: {}", l.label, l.url)));
    }

    TextSummary { lines }
}
