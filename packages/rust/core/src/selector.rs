//! Backlog Selector: picks the next batch of work items for a run.

use std::collections::HashMap;

use tracing::debug;

use presswork_shared::{Result, SelectorConfig, WorkItem, WorkItemKind};
use presswork_storage::Storage;

/// Bucket for items without a category.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Options for one [`select_batch`] call.
#[derive(Debug, Clone)]
pub struct SelectOptions {
    pub limit: usize,
    pub min_score: Option<f64>,
    /// Restrict to one extraction call; enables the diversity cap.
    pub extraction_batch: Option<String>,
    pub diversity_fraction: f64,
    /// Candidates fetched per slot when diversifying.
    pub candidate_window: usize,
}

impl SelectOptions {
    pub fn from_config(config: &SelectorConfig, limit: Option<usize>) -> Self {
        Self {
            limit: limit.unwrap_or(config.default_limit),
            min_score: None,
            extraction_batch: None,
            diversity_fraction: config.diversity_fraction,
            candidate_window: config.candidate_window,
        }
    }

    pub fn with_extraction_batch(mut self, batch: impl Into<String>) -> Self {
        self.extraction_batch = Some(batch.into());
        self
    }
}

/// Select up to `opts.limit` items by score descending (id ascending on ties).
///
/// Returns fewer items when the backlog is exhausted or the diversity cap
/// leaves slots unfilled.
pub async fn select_batch(
    storage: &Storage,
    kind: WorkItemKind,
    opts: &SelectOptions,
) -> Result<Vec<WorkItem>> {
    if opts.limit == 0 {
        return Ok(Vec::new());
    }

    let diversify = opts.extraction_batch.is_some();
    let fetch = if diversify {
        opts.limit.saturating_mul(opts.candidate_window.max(1))
    } else {
        opts.limit
    };

    let candidates = storage
        .query_backlog(kind, fetch, opts.min_score, opts.extraction_batch.as_deref())
        .await?;
    let fetched = candidates.len();

    let selected = if diversify {
        apply_diversity(candidates, opts.limit, opts.diversity_fraction)
    } else {
        candidates
    };

    debug!(kind = %kind, fetched, selected = selected.len(), diversify, "batch selected");
    Ok(selected)
}

/// Per-category cap for a batch: `ceil(limit * fraction)`, at least 1.
pub fn diversity_cap(limit: usize, fraction: f64) -> usize {
    ((limit as f64 * fraction).ceil() as usize).max(1)
}

/// Walk score-ordered candidates, skipping any whose category is already at
/// the cap, until `limit` items are taken. Order is preserved.
pub fn apply_diversity(candidates: Vec<WorkItem>, limit: usize, fraction: f64) -> Vec<WorkItem> {
    let cap = diversity_cap(limit, fraction);
    let mut per_category: HashMap<String, usize> = HashMap::new();
    let mut selected = Vec::with_capacity(limit.min(candidates.len()));

    for item in candidates {
        if selected.len() >= limit {
            break;
        }
        let category = item
            .category()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| UNCATEGORIZED.to_string());

        let count = per_category.entry(category).or_default();
        if *count >= cap {
            continue;
        }
        *count += 1;
        selected.push(item);
    }

    selected
}
