//! Artifact conventions: which files are plots, which are offered as links, and how to
//! address them on the service.

use crate::model::{ArtifactLink, PlotArtifact, RunHandle, RunStatus};
use anyhow::Context;

/// Policy for turning a status file listing into plots and links.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactPolicy {
    /// Directory prefix plots live under, with trailing slash.
    pub plot_dir: &'static str,
    /// Lowercase extensions without the dot.
    pub plot_extensions: &'static [&'static str],
    /// (label, file name) pairs offered as downloads, in display order.
    pub link_allow_list: &'static [(&'static str, &'static str)],
}

pub const DEFAULT_POLICY: ArtifactPolicy = ArtifactPolicy {
    plot_dir: "figures/",
    plot_extensions: &["png"],
    link_allow_list: &[
        ("Summary", "summary.json"),
        ("Weights", "weights_opt.csv"),
        ("Trades", "trades.csv"),
        ("Objective history", "objective_history.csv"),
        ("Returns (full series)", "returns_full.csv"),
    ],
};

impl Default for ArtifactPolicy {
    fn default() -> Self {
        DEFAULT_POLICY
    }
}

impl ArtifactPolicy {
    fn is_plot(&self, path: &str) -> bool {
        let Some(rest) = path.strip_prefix(self.plot_dir) else {
            return false;
        };
        rest.rsplit_once('.').is_some_and(|(stem, ext)| {
            !stem.is_empty()
                && self
                    .plot_extensions
                    .iter()
                    .any(|e| ext.eq_ignore_ascii_case(e))
        })
    }

    /// Plot files from the listing, in listing order.
    pub fn derive_plots(&self, status: &RunStatus) -> Vec<PlotArtifact> {
        status
            .files
            .iter()
            .filter(|f| self.is_plot(f))
            .map(|f| PlotArtifact {
                title: plot_title(f),
                path: f.clone(),
            })
            .collect()
    }

    /// Allow-listed files that are present in the listing, in allow-list order.
    ///
    /// An allow-listed name missing from the listing gets no link. Files outside the
    /// allow-list are never linked, even when listed.
    pub fn derived_artifact_links(&self, status: &RunStatus) -> Vec<ArtifactLink> {
        self.link_allow_list
            .iter()
            .filter(|(_, name)| status.files.iter().any(|f| f == name))
            .map(|(label, name)| ArtifactLink {
                label: *label,
                path: (*name).to_string(),
            })
            .collect()
    }
}

/// `figures/drawdown_chart.png` -> `Drawdown Chart`.
pub fn plot_title(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
    stem.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Absolute URL of a run artifact: `{base}/runs/{run_id}/{path}`, optionally with a
/// cache-busting `v` query parameter.
pub fn artifact_url(
    base_url: &str,
    handle: &RunHandle,
    path: &str,
    cache_bust: Option<&str>,
) -> anyhow::Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(base_url)
        .with_context(|| format!("invalid base URL `{base_url}`"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("base URL `{base_url}` cannot carry a path"))?
        .pop_if_empty()
        .push("runs")
        .push(handle.as_str())
        .extend(path.split('/').filter(|s| !s.is_empty()));
    if let Some(token) = cache_bust {
        url.query_pairs_mut().append_pair("v", token);
    }
    Ok(url)
}
