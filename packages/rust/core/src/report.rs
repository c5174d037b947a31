//! End-of-run summary and the Markdown run report.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::info;

use presswork_shared::{PressworkError, Result};
use presswork_storage::StuckItem;

use crate::pipeline::ItemOutcome;

/// Counts for one pipeline run, plus per-item lines for the report.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub selected: usize,
    pub duplicates: usize,
    pub validation_failed: usize,
    pub generation_errored: usize,
    pub store_errors: usize,
    pub committed: usize,
    pub planned: usize,
    /// Items found in `writing` when the run started.
    pub stuck: Vec<StuckItem>,
    pub lines: Vec<String>,
}

impl RunSummary {
    /// Count one item outcome.
    pub fn record(&mut self, label: &str, outcome: &ItemOutcome) {
        self.selected += 1;
        match outcome {
            ItemOutcome::Committed { .. } => self.committed += 1,
            ItemOutcome::Duplicate => self.duplicates += 1,
            ItemOutcome::Rejected(_) => self.validation_failed += 1,
            ItemOutcome::Errored(_) => self.generation_errored += 1,
            ItemOutcome::StoreFailed(_) => self.store_errors += 1,
            ItemOutcome::Planned => self.planned += 1,
        }
        self.lines.push(format!("{label}: {outcome}"));
    }

    /// Fold another summary into this one.
    pub fn merge(&mut self, other: RunSummary) {
        self.selected += other.selected;
        self.duplicates += other.duplicates;
        self.validation_failed += other.validation_failed;
        self.generation_errored += other.generation_errored;
        self.store_errors += other.store_errors;
        self.committed += other.committed;
        self.planned += other.planned;
        self.stuck.extend(other.stuck);
        self.lines.extend(other.lines);
    }

    /// One-line count summary.
    pub fn headline(&self) -> String {
        let mut line = format!(
            "selected {}, duplicate-skipped {}, validation-failed {}, generation-errored {}, committed {}",
            self.selected,
            self.duplicates,
            self.validation_failed,
            self.generation_errored,
            self.committed
        );
        if self.store_errors > 0 {
            let _ = write!(line, ", store-errors {}", self.store_errors);
        }
        if self.planned > 0 {
            let _ = write!(line, ", planned {}", self.planned);
        }
        line
    }

    /// Render the Markdown report.
    pub fn render(&self, pipeline: &str, date: NaiveDate) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# {pipeline} run report ({date})\n");
        let _ = writeln!(out, "| Outcome | Count |");
        let _ = writeln!(out, "|---------|-------|");
        for (name, count) in [
            ("Selected", self.selected),
            ("Duplicate-skipped", self.duplicates),
            ("Validation-failed", self.validation_failed),
            ("Generation-errored", self.generation_errored),
            ("Store errors", self.store_errors),
            ("Committed", self.committed),
        ] {
            let _ = writeln!(out, "| {name} | {count} |");
        }

        if !self.lines.is_empty() {
            let _ = writeln!(out, "\n## Items\n");
            for line in &self.lines {
                let _ = writeln!(out, "- {line}");
            }
        }

        if !self.stuck.is_empty() {
            let _ = writeln!(out, "\n## Stuck in writing\n");
            for stuck in &self.stuck {
                let _ = writeln!(
                    out,
                    "- {} \"{}\" since {} (reset with `presswork requeue {} {}`)",
                    stuck.item, stuck.label, stuck.since, stuck.item.kind, stuck.item.id
                );
            }
        }
        out
    }
}

/// Write `{output_dir}/{pipeline}/report-{date}.md`, replacing an earlier
/// report from the same day.
pub fn write_report(
    output_dir: &Path,
    pipeline: &str,
    date: NaiveDate,
    summary: &RunSummary,
) -> Result<PathBuf> {
    let dir = output_dir.join(pipeline);
    std::fs::create_dir_all(&dir).map_err(|e| PressworkError::io(&dir, e))?;

    let path = dir.join(format!("report-{}.md", date.format("%Y-%m-%d")));
    std::fs::write(&path, summary.render(pipeline, date))
        .map_err(|e| PressworkError::io(&path, e))?;

    info!(path = %path.display(), "run report written");
    Ok(path)
}
