//! Backlog-item pipeline: Selected → Generating → Validating →
//! {Committed | Rejected | Errored}, plus the run context shared by every
//! pipeline.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use presswork_gateway::{GatewaySet, GenerateOptions, Generator, SearchResult};
use presswork_markdown::{clean_document, normalize_slug};
use presswork_shared::{
    AppConfig, ContentKind, GatewayError, ItemRef, Language, PressworkError, Result, StageConfig,
    Status, WorkItem,
};
use presswork_storage::Storage;

use crate::committer::{CommitLinks, Committer, PreparedDocument};
use crate::dedup::DedupIndex;
use crate::prompts;
use crate::report::RunSummary;
use crate::validate::{ExpectedArtifact, Rejection, Verdict, validate};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before an item starts.
    fn item_started(&self, label: &str, current: usize, total: usize);
    /// Called when an item reaches its outcome.
    fn item_finished(&self, label: &str, outcome: &ItemOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_started(&self, _label: &str, _current: usize, _total: usize) {}
    fn item_finished(&self, _label: &str, _outcome: &ItemOutcome) {}
}

// ---------------------------------------------------------------------------
// Run context
// ---------------------------------------------------------------------------

/// Everything one pipeline invocation shares across its items.
pub struct RunContext<'a> {
    pub storage: &'a Storage,
    pub config: &'a AppConfig,
    pub gateways: &'a GatewaySet,
    /// Built once per run; grows as items commit.
    pub dedup: DedupIndex,
    pub committer: Committer,
    /// "Today" for naming and metadata.
    pub date: NaiveDate,
    /// Select, dedup and log only.
    pub dry_run: bool,
}

impl<'a> RunContext<'a> {
    pub async fn new(
        storage: &'a Storage,
        config: &'a AppConfig,
        gateways: &'a GatewaySet,
        date: NaiveDate,
        dry_run: bool,
    ) -> Result<Self> {
        let dedup = DedupIndex::build(storage, &config.paths.content_dir).await?;
        Ok(Self {
            storage,
            config,
            gateways,
            dedup,
            committer: Committer::new(config.paths.content_dir.clone()),
            date,
            dry_run,
        })
    }

    /// Resolve the generator for a stage.
    pub fn stage(&self, stage: &StageConfig) -> Result<StageGenerator> {
        let (generator, opts) = self.gateways.for_stage(stage)?;
        Ok(StageGenerator { generator, opts })
    }

    /// Resolve a terminal status for an item in `writing`. Failures are
    /// logged; the item is then surfaced as stuck on the next run.
    pub async fn resolve(&self, item: ItemRef, to: Status) {
        if let Err(e) = self
            .storage
            .transition_status(item.kind, item.id, Some(Status::Writing), to)
            .await
        {
            warn!(item = %item, to = %to, error = %e, "failed to resolve item status");
        }
    }
}

/// A generator bound to one stage's options.
#[derive(Clone)]
pub struct StageGenerator {
    pub generator: Arc<dyn Generator>,
    pub opts: GenerateOptions,
}

impl StageGenerator {
    pub async fn generate(&self, prompt: &str) -> std::result::Result<String, GatewayError> {
        self.generator.generate(prompt, &self.opts).await
    }
}

/// Call a stage, retrying transient failures up to `retries` more times with
/// a fixed delay between attempts.
pub async fn generate_with_retry(
    stage: &StageGenerator,
    prompt: &str,
    retries: u32,
    backoff: Duration,
) -> std::result::Result<String, GatewayError> {
    let mut attempt = 0;
    loop {
        match stage.generate(prompt).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                warn!(attempt, error = %e, backoff_secs = backoff.as_secs(), "transient generation failure, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// How one item ended.
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Committed { content_ids: Vec<i64> },
    Duplicate,
    Rejected(Vec<Rejection>),
    Errored(String),
    /// A store invariant refused the item (guard mismatch, slug collision).
    StoreFailed(String),
    /// Dry-run: would have been generated.
    Planned,
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Committed { content_ids } => write!(f, "committed {content_ids:?}"),
            Self::Duplicate => f.write_str("duplicate"),
            Self::Rejected(reasons) => {
                f.write_str("rejected: ")?;
                for (i, reason) in reasons.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{reason}")?;
                }
                Ok(())
            }
            Self::Errored(e) => write!(f, "error: {e}"),
            Self::StoreFailed(e) => write!(f, "store error: {e}"),
            Self::Planned => f.write_str("planned (dry run)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Backlog jobs
// ---------------------------------------------------------------------------

/// One backlog item, resolved into what to generate.
#[derive(Debug, Clone)]
pub struct BacklogJob {
    pub item: ItemRef,
    /// The candidate title used for dedup and the prompt subject.
    pub label: String,
    pub label_zh: Option<String>,
    pub kind: ContentKind,
    pub languages: Vec<Language>,
    pub slug_base: String,
    pub category: Option<String>,
    pub research_id: Option<i64>,
    pub source_news_ids: Vec<i64>,
    /// Search snippets added to the prompt.
    pub grounding: Vec<SearchResult>,
}

impl BacklogJob {
    /// Build a job for a keyword or PAA question. Other kinds are not
    /// produced through this pipeline.
    pub fn from_item(item: &WorkItem) -> Option<Self> {
        match item {
            WorkItem::Keyword(k) => {
                let languages = if k.content_type.is_bilingual() {
                    Language::BOTH.to_vec()
                } else {
                    vec![k.language]
                };
                Some(Self {
                    item: item.item_ref(),
                    label: k.keyword.clone(),
                    label_zh: k.keyword_zh.clone(),
                    kind: k.content_type,
                    languages,
                    slug_base: normalize_slug(&k.keyword),
                    category: k.category.clone(),
                    research_id: k.parent_research_id,
                    source_news_ids: Vec::new(),
                    grounding: Vec::new(),
                })
            }
            WorkItem::Paa(p) => Some(Self {
                item: item.item_ref(),
                label: p.question.clone(),
                label_zh: p.question_zh.clone(),
                kind: ContentKind::Faq,
                languages: Language::BOTH.to_vec(),
                slug_base: normalize_slug(&p.question),
                category: None,
                research_id: None,
                source_news_ids: Vec::new(),
                grounding: Vec::new(),
            }),
            WorkItem::News(_) | WorkItem::Freshness(_) => None,
        }
    }
}

/// Run a batch of jobs sequentially. Per-item failures are recorded and
/// never stop the batch.
pub async fn run_backlog_batch(
    ctx: &mut RunContext<'_>,
    stage: &StageGenerator,
    jobs: Vec<BacklogJob>,
    progress: &dyn ProgressReporter,
) -> RunSummary {
    let mut summary = RunSummary::default();
    let total = jobs.len();
    for (i, job) in jobs.iter().enumerate() {
        progress.item_started(&job.label, i + 1, total);
        let outcome = run_backlog_item(ctx, stage, job).await;
        progress.item_finished(&job.label, &outcome);
        summary.record(&job.label, &outcome);
    }
    summary
}

/// Run one backlog item to its outcome.
///
/// Dedup happens before the item enters `writing`, so a duplicate never
/// costs a generation call. All languages are generated and validated before
/// anything is written; the commit then lands as one store transaction.
#[instrument(skip_all, fields(item = %job.item, slug = %job.slug_base))]
pub async fn run_backlog_item(
    ctx: &mut RunContext<'_>,
    stage: &StageGenerator,
    job: &BacklogJob,
) -> ItemOutcome {
    let Some(initial) = job.item.kind.initial_status() else {
        return ItemOutcome::StoreFailed(format!("{} has no lifecycle", job.item.kind));
    };

    if job.slug_base.is_empty() {
        warn!(label = %job.label, "label normalizes to an empty slug");
        if !ctx.dry_run {
            mark_from(ctx, job.item, initial, Status::Skipped).await;
        }
        return ItemOutcome::Rejected(vec![Rejection::InvalidField {
            field: "slug",
            reason: format!("'{}' has no usable characters", job.label),
        }]);
    }

    // --- Dedup ---
    if ctx.dedup.is_duplicate(&job.slug_base, &job.label) {
        info!(dry_run = ctx.dry_run, "duplicate candidate, skipping");
        if !ctx.dry_run {
            mark_from(ctx, job.item, initial, Status::Duplicate).await;
        }
        return ItemOutcome::Duplicate;
    }

    if ctx.dry_run {
        info!(
            dry_run = true,
            kind = %job.kind,
            languages = ?job.languages,
            "would generate and publish"
        );
        return ItemOutcome::Planned;
    }

    // --- Writing ---
    if let Err(e) = ctx
        .storage
        .transition_status(job.item.kind, job.item.id, Some(initial), Status::Writing)
        .await
    {
        warn!(error = %e, "could not claim item");
        return ItemOutcome::StoreFailed(e.to_string());
    }

    // --- Generate + validate ---
    let mut prepared = Vec::with_capacity(job.languages.len());
    for &language in &job.languages {
        let prompt = prompts::backlog_document(job, language, ctx.date);
        let raw = match stage.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(language = %language, error = %e, transient = e.is_transient(), "generation failed");
                ctx.resolve(job.item, Status::Error).await;
                return ItemOutcome::Errored(e.to_string());
            }
        };

        let cleaned = clean_document(&raw);
        let expected = ExpectedArtifact::document(job.kind, language);
        match validate(&cleaned, &expected, &ctx.config.validation) {
            Verdict::Accepted(document) => prepared.push(PreparedDocument {
                kind: job.kind,
                language,
                slug_base: job.slug_base.clone(),
                document,
            }),
            Verdict::Rejected(reasons) => {
                for reason in &reasons {
                    warn!(language = %language, reason = %reason, "artifact rejected");
                }
                ctx.resolve(job.item, Status::Skipped).await;
                return ItemOutcome::Rejected(reasons);
            }
        }
    }

    let title = prepared
        .first()
        .and_then(|p| p.document.frontmatter.get_str("title"))
        .map(str::to_string);

    // --- Commit ---
    let links = CommitLinks {
        pair_with: None,
        source_news_ids: job.source_news_ids.clone(),
        resolves: Some(job.item),
        research_id: job.research_id,
    };
    match ctx.committer.commit(ctx.storage, prepared, links).await {
        Ok(committed) => {
            ctx.dedup.insert(&job.slug_base, &job.label);
            if let Some(title) = title {
                ctx.dedup.insert("", &title);
            }
            ItemOutcome::Committed {
                content_ids: committed.iter().map(|c| c.content_id).collect(),
            }
        }
        Err(e) => {
            warn!(error = %e, "commit failed");
            ctx.resolve(job.item, Status::Error).await;
            ItemOutcome::StoreFailed(e.to_string())
        }
    }
}

async fn mark_from(ctx: &RunContext<'_>, item: ItemRef, from: Status, to: Status) {
    if let Err(e) = ctx
        .storage
        .transition_status(item.kind, item.id, Some(from), to)
        .await
    {
        warn!(item = %item, to = %to, error = %e, "failed to record status");
    }
}

/// The first balanced JSON value starting with `open` in generator output,
/// tolerating fences and prose around it.
pub(crate) fn json_slice(raw: &str, open: char, close: char) -> Result<&str> {
    let start = raw
        .find(open)
        .ok_or_else(|| PressworkError::parse(format!("no '{open}' in generator output")))?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in raw[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                let end = start + offset + c.len_utf8();
                debug!(len = end - start, "json value located");
                return Ok(&raw[start..end]);
            }
        }
    }
    Err(PressworkError::parse(format!("unterminated '{open}' in generator output")))
}
