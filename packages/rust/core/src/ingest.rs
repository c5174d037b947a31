//! JSONL ingestion of work items produced by external feeds and miners.

use std::path::Path;

use tracing::{info, instrument, warn};

use presswork_shared::{
    NewFreshnessSignal, NewKeyword, NewNewsItem, NewPaaQuestion, NewWorkItem, PressworkError,
    Result, WorkItemKind,
};
use presswork_storage::Storage;

/// Counts from one ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub read: usize,
    pub inserted: usize,
    pub existing: usize,
    pub invalid: usize,
}

/// Parse one JSONL line as a work item of `kind`.
pub fn parse_line(kind: WorkItemKind, line: &str) -> Result<NewWorkItem> {
    let parsed = match kind {
        WorkItemKind::News => serde_json::from_str::<NewNewsItem>(line).map(NewWorkItem::News),
        WorkItemKind::Keyword => serde_json::from_str::<NewKeyword>(line).map(NewWorkItem::Keyword),
        WorkItemKind::Paa => serde_json::from_str::<NewPaaQuestion>(line).map(NewWorkItem::Paa),
        WorkItemKind::Freshness => {
            serde_json::from_str::<NewFreshnessSignal>(line).map(NewWorkItem::Freshness)
        }
    };
    parsed.map_err(|e| PressworkError::parse(format!("{kind}: {e}")))
}

/// Insert every valid line of `path` as a `kind` work item.
///
/// Lines that fail to parse are counted and skipped. Items whose natural key
/// already exists are left as they are.
#[instrument(skip_all, fields(kind = %kind, path = %path.display()))]
pub async fn ingest_jsonl(
    storage: &Storage,
    kind: WorkItemKind,
    path: &Path,
    dry_run: bool,
) -> Result<IngestSummary> {
    let text = std::fs::read_to_string(path).map_err(|e| PressworkError::io(path, e))?;
    let mut summary = IngestSummary::default();

    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.read += 1;

        let item = match parse_line(kind, line) {
            Ok(item) => item,
            Err(e) => {
                warn!(line = n + 1, error = %e, "invalid line, skipping");
                summary.invalid += 1;
                continue;
            }
        };
        if dry_run {
            continue;
        }
        match storage.upsert_work_item(&item).await? {
            Some(_) => summary.inserted += 1,
            None => summary.existing += 1,
        }
    }

    info!(
        read = summary.read,
        inserted = summary.inserted,
        existing = summary.existing,
        invalid = summary.invalid,
        dry_run,
        "ingestion complete"
    );
    Ok(summary)
}
