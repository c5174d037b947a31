//! Freshness: match recent news against published blog posts, then append
//! dated update sections to the posts that matched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use presswork_markdown::{clean_section, parse_document, strip_language_suffix};
use presswork_shared::{
    ContentKind, FreshnessSignal, ItemRef, Language, NewFreshnessSignal, NewWorkItem, NewsItem,
    Result, Status, WorkItem, WorkItemKind,
};

use crate::committer::SectionAppend;
use crate::keywords::window_start;
use crate::pipeline::{ItemOutcome, ProgressReporter, RunContext, StageGenerator};
use crate::prompts;
use crate::report::RunSummary;
use crate::validate::{ExpectedArtifact, Rejection, Verdict, validate};

const MAX_NEWS_ITEMS: usize = 200;
const MAX_PENDING_SIGNALS: usize = 500;

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// A published English blog post and the keywords it is indexed under.
#[derive(Debug, Clone)]
pub struct PublishedPost {
    pub slug: String,
    pub keywords: Vec<String>,
}

/// Counts from one detection pass.
#[derive(Debug, Clone, Default)]
pub struct DetectSummary {
    pub posts: usize,
    pub news: usize,
    pub matches: usize,
    pub inserted: usize,
}

/// Number of post keywords that overlap the news text in either direction.
pub fn match_score(news_text: &str, keywords: &[String]) -> i64 {
    let text = news_text.trim().to_lowercase();
    if text.is_empty() {
        return 0;
    }
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .filter(|k| text.contains(k.as_str()) || k.contains(text.as_str()))
        .count() as i64
}

fn news_text(item: &NewsItem) -> String {
    match &item.summary {
        Some(summary) => format!("{} {summary}", item.title),
        None => item.title.clone(),
    }
}

/// English blog posts under the content tree that carry keywords.
pub fn published_posts(content_dir: &Path) -> Vec<PublishedPost> {
    let dir = content_dir
        .join(ContentKind::Blog.dir_name())
        .join(Language::En.code());
    if !dir.exists() {
        return Vec::new();
    }

    let mut posts = Vec::new();
    for entry in WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "md"))
    {
        let path = entry.path();
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable post, skipping");
                continue;
            }
        };
        let Ok(document) = parse_document(&text) else {
            debug!(path = %path.display(), "post without metadata, skipping");
            continue;
        };
        let keywords = document.frontmatter.get_list("keywords").unwrap_or_default();
        if keywords.is_empty() {
            continue;
        }
        let slug = match document.frontmatter.get_str("slug") {
            Some(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => strip_language_suffix(stem).to_string(),
                None => continue,
            },
        };
        posts.push(PublishedPost { slug, keywords });
    }
    posts
}

/// Match recent news against published posts and record a signal per match.
#[instrument(skip_all)]
pub async fn detect(ctx: &RunContext<'_>) -> Result<DetectSummary> {
    let posts = published_posts(ctx.committer.content_dir());
    let since = window_start(ctx, ctx.config.freshness.lookback_hours);
    let news = ctx.storage.recent_news(since, MAX_NEWS_ITEMS).await?;
    let threshold = ctx.config.freshness.match_threshold;

    let mut summary = DetectSummary {
        posts: posts.len(),
        news: news.len(),
        ..Default::default()
    };

    for item in &news {
        let text = news_text(item);
        for post in &posts {
            let score = match_score(&text, &post.keywords);
            if score < threshold {
                continue;
            }
            summary.matches += 1;
            debug!(slug = %post.slug, news = item.id, score, "freshness match");
            if ctx.dry_run {
                continue;
            }
            let signal = NewWorkItem::Freshness(NewFreshnessSignal {
                content_slug: post.slug.clone(),
                content_type: ContentKind::Blog,
                news_item_id: item.id,
                match_score: score,
            });
            if ctx.storage.upsert_work_item(&signal).await?.is_some() {
                summary.inserted += 1;
            }
        }
    }

    info!(
        posts = summary.posts,
        news = summary.news,
        matches = summary.matches,
        inserted = summary.inserted,
        dry_run = ctx.dry_run,
        "freshness detection complete"
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// Pending signals for one published document.
#[derive(Debug, Clone)]
struct UpdateGroup {
    slug: String,
    kind: ContentKind,
    signals: Vec<FreshnessSignal>,
}

impl UpdateGroup {
    fn label(&self) -> String {
        format!("{} ({} signals)", self.slug, self.signals.len())
    }
}

/// Group detected signals by document, best match first.
fn group_signals(items: Vec<WorkItem>) -> Vec<UpdateGroup> {
    let mut groups: Vec<UpdateGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for item in items {
        let WorkItem::Freshness(signal) = item else {
            continue;
        };
        match index.get(&signal.content_slug) {
            Some(&i) => groups[i].signals.push(signal),
            None => {
                index.insert(signal.content_slug.clone(), groups.len());
                groups.push(UpdateGroup {
                    slug: signal.content_slug.clone(),
                    kind: signal.content_type,
                    signals: vec![signal],
                });
            }
        }
    }
    groups
}

/// The file for `slug` in one language: the canonical path, else any file
/// in the language directory whose metadata slug matches.
fn find_language_file(
    ctx: &RunContext<'_>,
    kind: ContentKind,
    language: Language,
    slug: &str,
) -> Option<PathBuf> {
    let canonical = ctx.committer.path_for(kind, language, slug);
    if canonical.exists() {
        return Some(canonical);
    }
    let dir = canonical.parent()?;
    WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
        .find(|p| {
            std::fs::read_to_string(p)
                .ok()
                .and_then(|t| parse_document(&t).ok())
                .and_then(|d| d.frontmatter.get_str("slug").map(|s| s.trim() == slug))
                .unwrap_or(false)
        })
}

/// Drop heading lines the generator put at the top of a section.
fn strip_leading_headings(section: &str) -> String {
    section
        .lines()
        .skip_while(|l| l.trim().is_empty() || l.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Append update sections for up to `limit` documents with pending signals.
#[instrument(skip_all)]
pub async fn update(
    ctx: &mut RunContext<'_>,
    limit: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let stage = ctx.stage(&ctx.config.stages.update)?;
    let limit = limit.unwrap_or(ctx.config.selector.default_limit);

    progress.phase("Selecting signals");
    let pending = ctx
        .storage
        .query_backlog(WorkItemKind::Freshness, MAX_PENDING_SIGNALS, None, None)
        .await?;
    let groups: Vec<UpdateGroup> = group_signals(pending).into_iter().take(limit).collect();
    info!(documents = groups.len(), "freshness updates selected");

    progress.phase("Updating");
    let mut summary = RunSummary::default();
    let total = groups.len();
    for (i, group) in groups.iter().enumerate() {
        let label = group.label();
        progress.item_started(&label, i + 1, total);
        let outcome = update_document(ctx, &stage, group).await;
        progress.item_finished(&label, &outcome);
        summary.record(&label, &outcome);
    }
    Ok(summary)
}

#[instrument(skip_all, fields(slug = %group.slug))]
async fn update_document(
    ctx: &RunContext<'_>,
    stage: &StageGenerator,
    group: &UpdateGroup,
) -> ItemOutcome {
    let files: Vec<(Language, PathBuf)> = Language::BOTH
        .iter()
        .filter_map(|&lang| find_language_file(ctx, group.kind, lang, &group.slug).map(|p| (lang, p)))
        .collect();

    if files.is_empty() {
        warn!("no published file for signal slug");
        if !ctx.dry_run {
            for signal in &group.signals {
                mark(ctx, signal.id, Status::Detected, Status::Skipped).await;
            }
        }
        return ItemOutcome::Rejected(vec![Rejection::InvalidField {
            field: "content_slug",
            reason: format!("no published file for '{}'", group.slug),
        }]);
    }

    if ctx.dry_run {
        info!(dry_run = true, files = files.len(), signals = group.signals.len(), "would append update");
        return ItemOutcome::Planned;
    }

    // --- Claim ---
    let mut claimed = Vec::with_capacity(group.signals.len());
    for signal in &group.signals {
        if let Err(e) = ctx
            .storage
            .transition_status(WorkItemKind::Freshness, signal.id, Some(Status::Detected), Status::Writing)
            .await
        {
            for &id in &claimed {
                mark(ctx, id, Status::Writing, Status::Error).await;
            }
            return ItemOutcome::StoreFailed(e.to_string());
        }
        claimed.push(signal.id);
    }

    let mut news = Vec::with_capacity(group.signals.len());
    for signal in &group.signals {
        match ctx.storage.get_work_item(WorkItemKind::News, signal.news_item_id).await {
            Ok(Some(WorkItem::News(item))) => news.push(item),
            Ok(_) => warn!(news = signal.news_item_id, "signal news item missing"),
            Err(e) => warn!(news = signal.news_item_id, error = %e, "failed to load news item"),
        }
    }

    // --- Generate + validate ---
    let mut sections = Vec::with_capacity(files.len());
    for (language, path) in files {
        let existing = match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|t| parse_document(&t).map_err(|e| e.to_string()))
        {
            Ok(doc) => doc,
            Err(e) => {
                resolve_all(ctx, &claimed, Status::Error).await;
                return ItemOutcome::Errored(format!("{}: {e}", path.display()));
            }
        };
        let title = existing
            .frontmatter
            .get_str("title")
            .unwrap_or(group.slug.as_str())
            .to_string();

        let prompt = prompts::update_section(&title, &existing.body, &news, language, ctx.date);
        let raw = match stage.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(language = %language, error = %e, "update generation failed");
                resolve_all(ctx, &claimed, Status::Error).await;
                return ItemOutcome::Errored(e.to_string());
            }
        };

        let section = strip_leading_headings(&clean_section(&raw));
        match validate(&section, &ExpectedArtifact::update_section(language), &ctx.config.validation) {
            Verdict::Accepted(_) => sections.push(SectionAppend {
                language,
                path,
                section,
            }),
            Verdict::Rejected(reasons) => {
                warn!(language = %language, reasons = reasons.len(), "update section rejected");
                resolve_all(ctx, &claimed, Status::Skipped).await;
                return ItemOutcome::Rejected(reasons);
            }
        }
    }

    // --- Persist ---
    match ctx
        .committer
        .append_update(ctx.storage, &group.slug, &sections, &claimed, ctx.date)
        .await
    {
        Ok(ids) => {
            info!(languages = sections.len(), "update appended");
            ItemOutcome::Committed { content_ids: ids }
        }
        Err(e) => {
            warn!(error = %e, "failed to record update");
            resolve_all(ctx, &claimed, Status::Error).await;
            ItemOutcome::StoreFailed(e.to_string())
        }
    }
}

async fn resolve_all(ctx: &RunContext<'_>, ids: &[i64], to: Status) {
    for &id in ids {
        ctx.resolve(ItemRef::new(WorkItemKind::Freshness, id), to).await;
    }
}

async fn mark(ctx: &RunContext<'_>, id: i64, from: Status, to: Status) {
    if let Err(e) = ctx
        .storage
        .transition_status(WorkItemKind::Freshness, id, Some(from), to)
        .await
    {
        warn!(signal = id, to = %to, error = %e, "failed to record signal status");
    }
}
