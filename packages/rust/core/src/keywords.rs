//! Keyword pipeline: Extract-Keyword over recent news, then the
//! backlog-item pipeline for a diversified batch.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveTime, Utc};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use presswork_shared::{
    ContentKind, Language, NewKeyword, NewWorkItem, NewsItem, PressworkError, Result, WorkItemKind,
};

use crate::pipeline::{BacklogJob, ProgressReporter, RunContext, json_slice, run_backlog_batch};
use crate::prompts;
use crate::report::RunSummary;
use crate::selector::{SelectOptions, select_batch};

/// How far back extraction looks for news.
pub const NEWS_WINDOW_HOURS: i64 = 48;
const MAX_NEWS_ITEMS: usize = 60;

/// One keyword proposed by the extraction call.
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordCandidate {
    pub keyword: String,
    #[serde(default)]
    pub keyword_zh: Option<String>,
    #[serde(rename = "type", default = "default_type")]
    pub content_type: String,
    #[serde(default = "default_rating")]
    pub relevance: f64,
    #[serde(default = "default_rating")]
    pub newness: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub news_ids: Vec<i64>,
}

fn default_type() -> String {
    "glossary".into()
}
fn default_rating() -> f64 {
    5.0
}

impl KeywordCandidate {
    /// Relevance times newness, each clamped to 1..=10.
    pub fn score(&self) -> f64 {
        self.relevance.clamp(1.0, 10.0) * self.newness.clamp(1.0, 10.0)
    }

    /// Content kind for the keyword; topic blogs are not produced from keywords.
    pub fn kind(&self) -> Option<ContentKind> {
        match ContentKind::from_str(self.content_type.trim()) {
            Ok(ContentKind::Blog) => Some(ContentKind::Tier2),
            Ok(kind) => Some(kind),
            Err(_) => None,
        }
    }
}

/// Parse the JSON array of candidates from raw extraction output.
pub fn parse_candidates(raw: &str) -> Result<Vec<KeywordCandidate>> {
    let json = json_slice(raw, '[', ']')?;
    serde_json::from_str(json).map_err(|e| PressworkError::parse(format!("keyword candidates: {e}")))
}

/// What one extraction call added to the backlog.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub batch_id: Option<String>,
    pub candidates: usize,
    pub inserted: usize,
    pub existing: usize,
    pub invalid: usize,
    /// Source news ids per keyword (lowercased).
    pub sources: HashMap<String, Vec<i64>>,
}

/// Options for one `keywords` run.
#[derive(Debug, Clone, Default)]
pub struct KeywordRunOptions {
    pub limit: Option<usize>,
    /// Work the existing backlog without a new extraction.
    pub skip_extract: bool,
}

/// Start of the news window ending with the run date.
pub(crate) fn window_start(ctx: &RunContext<'_>, hours: i64) -> DateTime<Utc> {
    let end = ctx
        .date
        .checked_add_days(Days::new(1))
        .unwrap_or(ctx.date)
        .and_time(NaiveTime::MIN)
        .and_utc();
    end - chrono::Duration::hours(hours)
}

/// Extract candidates from recent news and insert them under a fresh batch id.
#[instrument(skip_all)]
pub async fn extract_keywords(ctx: &RunContext<'_>) -> Result<Extraction> {
    let since = window_start(ctx, NEWS_WINDOW_HOURS);
    let news = ctx.storage.recent_news(since, MAX_NEWS_ITEMS).await?;
    if news.is_empty() {
        info!(since = %since, "no recent news, nothing to extract");
        return Ok(Extraction::default());
    }
    if ctx.dry_run {
        info!(dry_run = true, news = news.len(), "would extract keywords from recent news");
        return Ok(Extraction::default());
    }

    let stage = ctx.stage(&ctx.config.stages.extract)?;
    let raw = match stage.generate(&prompts::extract_keywords(&news)).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "keyword extraction failed");
            return Ok(Extraction::default());
        }
    };
    let candidates = match parse_candidates(&raw) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "keyword extraction returned unusable output");
            return Ok(Extraction::default());
        }
    };

    let batch_id = Uuid::now_v7().to_string();
    let known_news: Vec<i64> = news.iter().map(|n: &NewsItem| n.id).collect();
    let mut extraction = Extraction {
        batch_id: Some(batch_id.clone()),
        candidates: candidates.len(),
        ..Default::default()
    };

    for candidate in candidates {
        let keyword = candidate.keyword.trim().to_string();
        let Some(kind) = candidate.kind().filter(|_| !keyword.is_empty()) else {
            warn!(keyword = %candidate.keyword, kind = %candidate.content_type, "skipping invalid candidate");
            extraction.invalid += 1;
            continue;
        };

        let item = NewWorkItem::Keyword(NewKeyword {
            keyword: keyword.clone(),
            keyword_zh: candidate.keyword_zh.clone().filter(|z| !z.trim().is_empty()),
            language: Language::En,
            content_type: kind,
            category: candidate
                .category
                .as_deref()
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty()),
            score: candidate.score(),
            search_intent: None,
            parent_research_id: None,
            extraction_batch: Some(batch_id.clone()),
        });

        match ctx.storage.upsert_work_item(&item).await? {
            Some(_) => extraction.inserted += 1,
            None => extraction.existing += 1,
        }

        let sources: Vec<i64> = candidate
            .news_ids
            .iter()
            .copied()
            .filter(|id| known_news.contains(id))
            .collect();
        extraction.sources.insert(keyword.to_lowercase(), sources);
    }

    info!(
        batch = %batch_id,
        candidates = extraction.candidates,
        inserted = extraction.inserted,
        existing = extraction.existing,
        invalid = extraction.invalid,
        "keywords extracted"
    );
    Ok(extraction)
}

/// Run the keyword pipeline end to end.
#[instrument(skip_all, fields(skip_extract = opts.skip_extract))]
pub async fn run_keywords(
    ctx: &mut RunContext<'_>,
    opts: &KeywordRunOptions,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let write_stage = ctx.stage(&ctx.config.stages.write)?;
    let mut select = SelectOptions::from_config(&ctx.config.selector, opts.limit);

    let mut sources = HashMap::new();
    if !opts.skip_extract {
        progress.phase("Extracting keywords");
        let extraction = extract_keywords(ctx).await?;
        match extraction.batch_id {
            Some(batch) => {
                select = select.with_extraction_batch(batch);
                sources = extraction.sources;
            }
            // Dry-run previews the standing backlog; otherwise there is nothing new.
            None if ctx.dry_run => {}
            None => return Ok(RunSummary::default()),
        }
    }

    progress.phase("Selecting batch");
    let items = select_batch(ctx.storage, WorkItemKind::Keyword, &select).await?;
    let jobs: Vec<BacklogJob> = items
        .iter()
        .filter_map(BacklogJob::from_item)
        .map(|mut job| {
            if let Some(ids) = sources.get(&job.label.to_lowercase()) {
                job.source_news_ids = ids.clone();
            }
            job
        })
        .collect();
    info!(selected = jobs.len(), "keyword batch selected");

    progress.phase("Writing");
    Ok(run_backlog_batch(ctx, &write_stage, jobs, progress).await)
}
