//! Topic pipeline: Init → Research → Narrative → {WriteEN, WriteZH} →
//! Validate → Persist, with `Failed(stage)` reachable from every stage.
//!
//! The two writes run concurrently and fail independently. Each language is
//! persisted as soon as it validates, so a topic may end up partially
//! published; that is a terminal outcome, not retried. The research record
//! is kept whatever happens later.

use std::fmt;
use std::pin::pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use presswork_markdown::{Document, clean_document, is_kebab_case, normalize_slug_max};
use presswork_shared::{
    ContentKind, GatewayError, Language, PressworkError, Result, ValidationConfig,
};
use presswork_storage::TopicIndexEntry;

use crate::committer::{CommitLinks, CommittedDocument, PreparedDocument};
use crate::pipeline::{
    ItemOutcome, ProgressReporter, RunContext, StageGenerator, generate_with_retry, json_slice,
};
use crate::prompts;
use crate::report::RunSummary;
use crate::validate::{ExpectedArtifact, Rejection, Verdict, validate};

/// Topic slugs are kept shorter than the general slug limit.
pub const TOPIC_SLUG_CHARS: usize = 60;

/// A topic to research and publish.
#[derive(Debug, Clone)]
pub struct TopicRequest {
    pub topic: String,
    /// News items the topic came from, recorded as provenance.
    pub source_news_ids: Vec<i64>,
}

/// Stages of the topic state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicStage {
    Init,
    Research,
    Narrative,
    Write(Language),
    Validate(Language),
    Persist(Language),
}

impl fmt::Display for TopicStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::Research => f.write_str("research"),
            Self::Narrative => f.write_str("narrative"),
            Self::Write(lang) => write!(f, "write-{lang}"),
            Self::Validate(lang) => write!(f, "validate-{lang}"),
            Self::Persist(lang) => write!(f, "persist-{lang}"),
        }
    }
}

/// Where a topic run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicStatus {
    Published,
    /// One language published, the other failed.
    Partial,
    Failed(TopicStage),
    Duplicate,
    Planned,
}

impl TopicStatus {
    /// Value stored in the topic index.
    pub fn as_index_status(&self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Partial => "partial",
            _ => "failed",
        }
    }
}

/// One stage failure.
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub stage: TopicStage,
    pub error: String,
}

/// Result of one topic run.
#[derive(Debug, Clone)]
pub struct TopicReport {
    pub topic: String,
    pub slug_base: String,
    pub status: TopicStatus,
    pub research_id: Option<i64>,
    pub published: Vec<CommittedDocument>,
    pub failures: Vec<StageFailure>,
    language_outcomes: Vec<(Language, ItemOutcome)>,
}

impl TopicReport {
    fn new(topic: &str, slug_base: String) -> Self {
        Self {
            topic: topic.to_string(),
            slug_base,
            status: TopicStatus::Planned,
            research_id: None,
            published: Vec::new(),
            failures: Vec::new(),
            language_outcomes: Vec::new(),
        }
    }

    fn fail(mut self, stage: TopicStage, error: impl fmt::Display) -> Self {
        warn!(stage = %stage, error = %error, "topic stage failed");
        self.failures.push(StageFailure {
            stage,
            error: error.to_string(),
        });
        self.status = TopicStatus::Failed(stage);
        self
    }

    /// Per-language counts in the common run summary shape.
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        match &self.status {
            TopicStatus::Duplicate => summary.record(&self.topic, &ItemOutcome::Duplicate),
            TopicStatus::Planned => summary.record(&self.topic, &ItemOutcome::Planned),
            _ if self.language_outcomes.is_empty() => {
                let error = self
                    .failures
                    .last()
                    .map(|f| format!("{}: {}", f.stage, f.error))
                    .unwrap_or_default();
                summary.record(&self.topic, &ItemOutcome::Errored(error));
            }
            _ => {
                for (language, outcome) in &self.language_outcomes {
                    summary.record(&format!("{} [{language}]", self.topic), outcome);
                }
            }
        }
        summary
    }
}

// ---------------------------------------------------------------------------
// Narrative
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NarrativeSeo {
    pub slug: String,
    #[serde(default)]
    pub keywords_en: Vec<String>,
    #[serde(default)]
    pub keywords_zh: Vec<String>,
    #[serde(default)]
    pub meta_description_en: Option<String>,
}

/// The core narrative both language writes share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Narrative {
    pub title: String,
    pub one_liner: String,
    pub key_points: Vec<String>,
    #[serde(default)]
    pub faq: Vec<FaqEntry>,
    #[serde(default)]
    pub references: Vec<serde_json::Value>,
    pub seo: NarrativeSeo,
}

/// Extract and check the narrative JSON from raw generator output.
pub fn parse_narrative(raw: &str) -> Result<Narrative> {
    let json = json_slice(raw, '{', '}')?;
    let narrative: Narrative = serde_json::from_str(json)
        .map_err(|e| PressworkError::parse(format!("narrative JSON: {e}")))?;

    let mut problems = Vec::new();
    if narrative.title.trim().is_empty() {
        problems.push("title is empty".to_string());
    }
    if narrative.one_liner.trim().is_empty() {
        problems.push("one_liner is empty".to_string());
    }
    let points = narrative
        .key_points
        .iter()
        .filter(|p| !p.trim().is_empty())
        .count();
    if points < 3 {
        problems.push(format!("key_points has {points} items, need at least 3"));
    }
    if !is_kebab_case(&narrative.seo.slug) {
        problems.push(format!("seo.slug '{}' is not kebab-case", narrative.seo.slug));
    }
    if narrative
        .faq
        .iter()
        .any(|f| f.question.trim().is_empty() || f.answer.trim().is_empty())
    {
        problems.push("faq has an empty question or answer".to_string());
    }

    if problems.is_empty() {
        Ok(narrative)
    } else {
        Err(PressworkError::validation(format!(
            "narrative rejected: {}",
            problems.join("; ")
        )))
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the topic pipeline. Only stage resolution errors are returned as
/// `Err`; stage failures end up in the report.
#[instrument(skip_all, fields(topic = %request.topic))]
pub async fn run_topic(
    ctx: &mut RunContext<'_>,
    request: &TopicRequest,
    progress: &dyn ProgressReporter,
) -> Result<TopicReport> {
    let slug_base = normalize_slug_max(&request.topic, TOPIC_SLUG_CHARS);
    let mut report = TopicReport::new(&request.topic, slug_base.clone());

    // --- Init ---
    progress.phase("Checking for duplicates");
    if slug_base.is_empty() {
        return Ok(report.fail(TopicStage::Init, "topic normalizes to an empty slug"));
    }
    if ctx.dedup.is_duplicate(&slug_base, &request.topic) {
        info!(slug = %slug_base, "topic already published, stopping");
        report.status = TopicStatus::Duplicate;
        return Ok(report);
    }
    if ctx.dry_run {
        info!(dry_run = true, slug = %slug_base, "would research, write and publish topic");
        return Ok(report);
    }

    let research_stage = ctx.stage(&ctx.config.stages.research)?;
    let narrative_stage = ctx.stage(&ctx.config.stages.narrative)?;
    let write_stage = ctx.stage(&ctx.config.stages.write)?;
    let retries = ctx.config.stages.retry_attempts;
    let backoff = Duration::from_secs(ctx.config.stages.retry_backoff_secs);

    // --- Research ---
    progress.phase("Researching");
    let research_id = match ctx.storage.insert_research(&request.topic).await {
        Ok(id) => id,
        Err(e) => return Ok(report.fail(TopicStage::Research, e)),
    };
    report.research_id = Some(research_id);

    let research = match generate_with_retry(
        &research_stage,
        &prompts::research(&request.topic, ctx.date),
        retries,
        backoff,
    )
    .await
    {
        Ok(text) => text,
        Err(e) => {
            let report = report.fail(TopicStage::Research, e);
            record_index(ctx, &report, &request.topic).await;
            return Ok(report);
        }
    };
    if let Err(e) = ctx.storage.set_research_report(research_id, &research).await {
        let report = report.fail(TopicStage::Research, e);
        record_index(ctx, &report, &request.topic).await;
        return Ok(report);
    }

    // --- Narrative ---
    progress.phase("Building narrative");
    let narrative = match generate_with_retry(
        &narrative_stage,
        &prompts::narrative(&request.topic, &research),
        retries,
        backoff,
    )
    .await
    .map_err(PressworkError::from)
    .and_then(|raw| parse_narrative(&raw))
    {
        Ok(narrative) => narrative,
        Err(e) => {
            let report = report.fail(TopicStage::Narrative, e);
            record_index(ctx, &report, &request.topic).await;
            return Ok(report);
        }
    };
    match serde_json::to_string_pretty(&narrative) {
        Ok(json) => {
            if let Err(e) = ctx.storage.set_research_narrative(research_id, &json).await {
                warn!(error = %e, "failed to store narrative, continuing");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode narrative, continuing"),
    }

    // --- Write + Validate, per language ---
    progress.phase("Writing EN and ZH");
    let config = ctx.config;
    let en_prompt = prompts::topic_article(&narrative, Language::En, &slug_base, ctx.date);
    let zh_prompt = prompts::topic_article(&narrative, Language::Zh, &slug_base, ctx.date);
    let mut en = pin!(write_draft(&write_stage, &en_prompt, Language::En, &config.validation));
    let mut zh = pin!(write_draft(&write_stage, &zh_prompt, Language::Zh, &config.validation));
    let (mut en_done, mut zh_done) = (false, false);

    // --- Persist, as each language lands ---
    let mut pair_with: Option<i64> = None;
    while !(en_done && zh_done) {
        let (language, draft) = tokio::select! {
            draft = &mut en, if !en_done => {
                en_done = true;
                (Language::En, draft)
            }
            draft = &mut zh, if !zh_done => {
                zh_done = true;
                (Language::Zh, draft)
            }
        };

        let document = match draft {
            Draft::Accepted(document) => document,
            Draft::Failed(e) => {
                warn!(language = %language, error = %e, "write failed");
                report.failures.push(StageFailure {
                    stage: TopicStage::Write(language),
                    error: e.to_string(),
                });
                report
                    .language_outcomes
                    .push((language, ItemOutcome::Errored(e.to_string())));
                continue;
            }
            Draft::Rejected(reasons) => {
                let joined = reasons
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                warn!(language = %language, reasons = %joined, "article rejected");
                report.failures.push(StageFailure {
                    stage: TopicStage::Validate(language),
                    error: joined,
                });
                report
                    .language_outcomes
                    .push((language, ItemOutcome::Rejected(reasons)));
                continue;
            }
        };

        progress.phase(&format!("Publishing {language}"));
        let links = CommitLinks {
            pair_with,
            source_news_ids: request.source_news_ids.clone(),
            resolves: None,
            research_id: Some(research_id),
        };
        let prepared = PreparedDocument {
            kind: ContentKind::Blog,
            language,
            slug_base: slug_base.clone(),
            document,
        };
        match ctx.committer.commit(ctx.storage, vec![prepared], links).await {
            Ok(mut committed) => {
                if let Some(doc) = committed.pop() {
                    pair_with.get_or_insert(doc.content_id);
                    report.language_outcomes.push((
                        language,
                        ItemOutcome::Committed {
                            content_ids: vec![doc.content_id],
                        },
                    ));
                    report.published.push(doc);
                }
            }
            Err(e) => {
                warn!(language = %language, error = %e, "persist failed");
                report.failures.push(StageFailure {
                    stage: TopicStage::Persist(language),
                    error: e.to_string(),
                });
                report
                    .language_outcomes
                    .push((language, ItemOutcome::StoreFailed(e.to_string())));
            }
        }
    }

    report.status = match report.published.len() {
        2 => TopicStatus::Published,
        1 => TopicStatus::Partial,
        _ => TopicStatus::Failed(
            report
                .failures
                .last()
                .map_or(TopicStage::Persist(Language::En), |f| f.stage),
        ),
    };

    if !report.published.is_empty() {
        ctx.dedup.insert(&slug_base, &request.topic);
        ctx.dedup.insert("", &narrative.title);
    }
    record_index(ctx, &report, &narrative.title).await;

    info!(status = ?report.status, published = report.published.len(), "topic finished");
    Ok(report)
}

/// A written article after the gate.
enum Draft {
    Accepted(Document),
    Rejected(Vec<Rejection>),
    Failed(GatewayError),
}

async fn write_draft(
    stage: &StageGenerator,
    prompt: &str,
    language: Language,
    config: &ValidationConfig,
) -> Draft {
    let raw = match stage.generate(prompt).await {
        Ok(raw) => raw,
        Err(e) => return Draft::Failed(e),
    };
    match validate(
        &clean_document(&raw),
        &ExpectedArtifact::document(ContentKind::Blog, language),
        config,
    ) {
        Verdict::Accepted(document) => Draft::Accepted(document),
        Verdict::Rejected(reasons) => Draft::Rejected(reasons),
    }
}

async fn record_index(ctx: &RunContext<'_>, report: &TopicReport, title: &str) {
    let content_id = |lang: Language| {
        report
            .published
            .iter()
            .find(|d| d.language == lang)
            .map(|d| d.content_id)
    };
    let entry = TopicIndexEntry {
        topic_slug: report.slug_base.clone(),
        title: title.to_string(),
        status: report.status.as_index_status().to_string(),
        research_id: report.research_id,
        en_content_id: content_id(Language::En),
        zh_content_id: content_id(Language::Zh),
    };
    if let Err(e) = ctx.storage.upsert_topic_index(&entry).await {
        warn!(error = %e, "failed to update topic index");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::test_support::{ScriptedGenerator, test_config, test_storage};
    use chrono::NaiveDate;
    use presswork_gateway::{GatewaySet, GenerateOptions, Generator};
    use presswork_shared::{GatewayError, GatewayMode};

    const NARRATIVE: &str = r#"Here is the narrative:
```json
{
  "title": "Agent Protocols Converge",
  "one_liner": "Two agent protocols merged into one spec.",
  "key_points": ["Merged spec", "Streaming support", "Vendor backing"],
  "faq": [{"question": "Is it stable?", "answer": "Yes, v1 is frozen."}],
  "references": [{"title": "Announcement", "url": "https://example.com", "source": "Blog", "date": "2026-02-28"}],
  "seo": {"slug": "agent-protocols-converge", "keywords_en": ["agents"], "keywords_zh": ["智能体"]}
}
```"#;

    fn topic_generator(
        zh_fails: bool,
    ) -> std::sync::Arc<ScriptedGenerator> {
        ScriptedGenerator::new(move |prompt| {
            if prompt.starts_with("Research the following topic") {
                Ok("# Research\n\nFindings about agent protocols.".into())
            } else if prompt.starts_with("Turn this research") {
                Ok(NARRATIVE.into())
            } else if zh_fails && prompt.contains("Simplified Chinese") {
                Err(GatewayError::Timeout {
                    after: Duration::from_millis(100),
                })
            } else {
                Ok(ScriptedGenerator::reply_for(prompt))
            }
        })
    }

    fn request(topic: &str) -> TopicRequest {
        TopicRequest {
            topic: topic.into(),
            source_news_ids: Vec::new(),
        }
    }

    #[test]
    fn narrative_needs_three_key_points_and_kebab_slug() {
        let ok = parse_narrative(NARRATIVE).unwrap();
        assert_eq!(ok.seo.slug, "agent-protocols-converge");
        assert_eq!(ok.faq.len(), 1);

        let bad = r#"{"title": "T", "one_liner": "O", "key_points": ["a"], "seo": {"slug": "Not Kebab"}}"#;
        let err = parse_narrative(bad).unwrap_err().to_string();
        assert!(err.contains("key_points has 1"));
        assert!(err.contains("not kebab-case"));

        assert!(parse_narrative("no json at all").is_err());
    }

    #[tokio::test]
    async fn full_topic_publishes_linked_pair() {
        let storage = test_storage().await;
        let tree = tempfile::tempdir().unwrap();
        let config = test_config(tree.path());
        let generator = topic_generator(false);
        let gateways = GatewaySet::single(generator.clone());
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        let mut ctx = RunContext::new(&storage, &config, &gateways, date, false).await.unwrap();
        let report = run_topic(&mut ctx, &request("Agent Protocols Converge"), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.status, TopicStatus::Published, "{:?}", report.failures);
        assert_eq!(generator.calls(), 4);
        assert!(tree.path().join("content/blogs/en/agent-protocols-converge.md").exists());

        let en = storage.get_content_by_slug("agent-protocols-converge-en").await.unwrap().unwrap();
        let zh = storage.get_content_by_slug("agent-protocols-converge-zh").await.unwrap().unwrap();
        assert_eq!(en.hreflang_pair_id, Some(zh.id));
        assert_eq!(zh.hreflang_pair_id, Some(en.id));

        let research = storage.get_research(report.research_id.unwrap()).await.unwrap().unwrap();
        assert!(research.research_report.unwrap().contains("Findings"));
        assert!(research.core_narrative.unwrap().contains("agent-protocols-converge"));
        assert_eq!(
            storage.topic_status("agent-protocols-converge").await.unwrap().as_deref(),
            Some("published")
        );
    }

    #[tokio::test]
    async fn zh_failure_leaves_en_published_as_partial() {
        let storage = test_storage().await;
        let tree = tempfile::tempdir().unwrap();
        let config = test_config(tree.path());
        let gateways = GatewaySet::single(topic_generator(true));
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        let mut ctx = RunContext::new(&storage, &config, &gateways, date, false).await.unwrap();
        let report = run_topic(&mut ctx, &request("Agent Protocols Converge"), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.status, TopicStatus::Partial);
        assert_eq!(report.failures[0].stage, TopicStage::Write(Language::Zh));
        let en = storage.get_content_by_slug("agent-protocols-converge-en").await.unwrap().unwrap();
        assert_eq!(en.hreflang_pair_id, None);
        assert!(storage.get_content_by_slug("agent-protocols-converge-zh").await.unwrap().is_none());
        assert_eq!(
            storage.topic_status("agent-protocols-converge").await.unwrap().as_deref(),
            Some("partial")
        );

        let summary = report.summary();
        assert_eq!(summary.committed, 1);
        assert_eq!(summary.generation_errored, 1);
    }

    /// Holds the ZH article back until the EN file is on disk.
    struct EnFirstGenerator {
        en_path: std::path::PathBuf,
    }

    #[async_trait::async_trait]
    impl Generator for EnFirstGenerator {
        async fn generate(
            &self,
            prompt: &str,
            _opts: &GenerateOptions,
        ) -> std::result::Result<String, GatewayError> {
            if prompt.starts_with("Research the following topic") {
                return Ok("# Research\n\nFindings about agent protocols.".into());
            }
            if prompt.starts_with("Turn this research") {
                return Ok(NARRATIVE.into());
            }
            if prompt.contains("Simplified Chinese") {
                for _ in 0..200 {
                    if self.en_path.exists() {
                        return Ok(ScriptedGenerator::reply_for(prompt));
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                return Err(GatewayError::Timeout {
                    after: Duration::from_secs(2),
                });
            }
            Ok(ScriptedGenerator::reply_for(prompt))
        }

        fn mode(&self) -> GatewayMode {
            GatewayMode::Subprocess
        }
    }

    #[tokio::test]
    async fn en_persists_while_zh_is_still_writing() {
        let storage = test_storage().await;
        let tree = tempfile::tempdir().unwrap();
        let config = test_config(tree.path());
        let gateways = GatewaySet::single(std::sync::Arc::new(EnFirstGenerator {
            en_path: tree.path().join("content/blogs/en/agent-protocols-converge.md"),
        }));
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        let mut ctx = RunContext::new(&storage, &config, &gateways, date, false).await.unwrap();
        let report = run_topic(&mut ctx, &request("Agent Protocols Converge"), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.status, TopicStatus::Published, "{:?}", report.failures);
        let en = storage.get_content_by_slug("agent-protocols-converge-en").await.unwrap().unwrap();
        let zh = storage.get_content_by_slug("agent-protocols-converge-zh").await.unwrap().unwrap();
        assert_eq!(zh.hreflang_pair_id, Some(en.id));
        assert_eq!(en.hreflang_pair_id, Some(zh.id));
    }

    #[tokio::test]
    async fn research_failure_keeps_record_and_fails_topic() {
        let storage = test_storage().await;
        let tree = tempfile::tempdir().unwrap();
        let mut config = test_config(tree.path());
        config.stages.retry_attempts = 2;
        let generator = ScriptedGenerator::new(|_| Err(GatewayError::RateLimited));
        let gateways = GatewaySet::single(generator.clone());
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        let mut ctx = RunContext::new(&storage, &config, &gateways, date, false).await.unwrap();
        let report = run_topic(&mut ctx, &request("Quantum Agents"), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.status, TopicStatus::Failed(TopicStage::Research));
        assert_eq!(generator.calls(), 3);
        assert!(storage.get_research(report.research_id.unwrap()).await.unwrap().is_some());
        assert_eq!(
            storage.topic_status("quantum-agents").await.unwrap().as_deref(),
            Some("failed")
        );
    }

    #[tokio::test]
    async fn published_topic_stops_at_init() {
        let storage = test_storage().await;
        let tree = tempfile::tempdir().unwrap();
        let config = test_config(tree.path());
        std::fs::create_dir_all(tree.path().join("content/blogs/en")).unwrap();
        std::fs::write(
            tree.path().join("content/blogs/en/agent-protocols-converge.md"),
            "---\ntitle: x\n---\nbody\n",
        )
        .unwrap();

        let generator = topic_generator(false);
        let gateways = GatewaySet::single(generator.clone());
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let mut ctx = RunContext::new(&storage, &config, &gateways, date, false).await.unwrap();
        let report = run_topic(&mut ctx, &request("Agent protocols converge"), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.status, TopicStatus::Duplicate);
        assert_eq!(generator.calls(), 0);
        assert!(report.research_id.is_none());
    }

    #[test]
    fn topic_slug_is_capped() {
        let long = "a very long topic title that keeps going well past the sixty character limit";
        let slug = normalize_slug_max(long, TOPIC_SLUG_CHARS);
        assert!(slug.chars().count() <= TOPIC_SLUG_CHARS);
        assert!(!slug.ends_with('-'));
    }
}
