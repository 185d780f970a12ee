use crate::models::ScenarioOutcome;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Execution name for a run started at `started`
pub fn execution_name(started: DateTime<Utc>) -> String {
    format!("Execution-{}", started.format("%Y-%m-%d-%H-%M-%S"))
}

/// Durable destination for scenario outcomes
pub trait ReportStore: Send + Sync {
    /// Persist one scenario outcome, returning where it was written
    fn store(&self, outcome: &ScenarioOutcome) -> Result<PathBuf>;
}

/// Writes `{root}/{execution}/{scenario}.json`
pub struct DiskReportStore {
    root: PathBuf,
}

impl DiskReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn report_path(&self, outcome: &ScenarioOutcome) -> PathBuf {
        self.root
            .join(sanitize(&outcome.execution))
            .join(format!("{}.json", sanitize(&outcome.scenario)))
    }

    /// Ensure the directory for the report file exists
    fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        Ok(())
    }
}

impl ReportStore for DiskReportStore {
    fn store(&self, outcome: &ScenarioOutcome) -> Result<PathBuf> {
        let path = self.report_path(outcome);
        let json_content = serde_json::to_string_pretty(outcome)
            .context("Failed to serialize scenario report to JSON")?;

        self.ensure_directory_exists(&path)?;
        std::fs::write(&path, json_content)
            .with_context(|| format!("Failed to write report to: {}", path.display()))?;

        tracing::info!(path = %path.display(), "Report stored");
        Ok(path)
    }
}

/// Keep names usable as a single path component under the root
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();

    // empty, "." and ".." never name an entry inside the root
    if cleaned.trim_matches('.').is_empty() {
        "_".repeat(cleaned.len().max(1))
    } else {
        cleaned
    }
}
