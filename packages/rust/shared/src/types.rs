//! Core domain types: work items, their shared lifecycle, and published content.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PressworkError;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status shared by every mutable work-item kind.
///
/// Each kind enters at its own initial status (`backlog`, `discovered`,
/// `detected`), moves to `writing` right before a generation call, and ends in
/// one of the terminal statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Backlog,
    Discovered,
    Detected,
    Writing,
    Published,
    Skipped,
    Duplicate,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Discovered => "discovered",
            Self::Detected => "detected",
            Self::Writing => "writing",
            Self::Published => "published",
            Self::Skipped => "skipped",
            Self::Duplicate => "duplicate",
            Self::Error => "error",
        }
    }

    /// Terminal statuses never change without an explicit requeue.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Published | Self::Skipped | Self::Duplicate | Self::Error
        )
    }

    /// Whether the status is one of the entry statuses.
    pub fn is_initial(&self) -> bool {
        matches!(self, Self::Backlog | Self::Discovered | Self::Detected)
    }

    /// Legal edges of the shared lifecycle graph.
    ///
    /// Initial statuses may move to `writing`, or straight to `duplicate` /
    /// `skipped` when an item is rejected before generation. `writing` may
    /// resolve to any terminal status.
    pub fn can_transition_to(&self, to: Status) -> bool {
        match self {
            s if s.is_initial() => {
                matches!(to, Self::Writing | Self::Duplicate | Self::Skipped)
            }
            Self::Writing => to.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = PressworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(Self::Backlog),
            "discovered" => Ok(Self::Discovered),
            "detected" => Ok(Self::Detected),
            "writing" => Ok(Self::Writing),
            "published" => Ok(Self::Published),
            "skipped" => Ok(Self::Skipped),
            "duplicate" => Ok(Self::Duplicate),
            "error" => Ok(Self::Error),
            other => Err(PressworkError::parse(format!("unknown status '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkItemKind
// ---------------------------------------------------------------------------

/// The four work-item variants, each backed by its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkItemKind {
    News,
    Keyword,
    Paa,
    Freshness,
}

impl WorkItemKind {
    pub const ALL: [WorkItemKind; 4] = [Self::News, Self::Keyword, Self::Paa, Self::Freshness];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Keyword => "keyword",
            Self::Paa => "paa",
            Self::Freshness => "freshness",
        }
    }

    /// Backing table name.
    pub fn table(&self) -> &'static str {
        match self {
            Self::News => "news_items",
            Self::Keyword => "keywords",
            Self::Paa => "paa_questions",
            Self::Freshness => "freshness_signals",
        }
    }

    /// Column the backlog is ordered by.
    pub fn score_column(&self) -> &'static str {
        match self {
            Self::News | Self::Keyword => "score",
            Self::Paa => "result_count",
            Self::Freshness => "match_score",
        }
    }

    /// Entry status, or `None` for immutable news items.
    pub fn initial_status(&self) -> Option<Status> {
        match self {
            Self::News => None,
            Self::Keyword => Some(Status::Backlog),
            Self::Paa => Some(Status::Discovered),
            Self::Freshness => Some(Status::Detected),
        }
    }

    /// Whether `status` belongs to this kind's status domain.
    pub fn accepts(&self, status: Status) -> bool {
        match self.initial_status() {
            None => false,
            Some(initial) => status == initial || !status.is_initial(),
        }
    }
}

impl fmt::Display for WorkItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkItemKind {
    type Err = PressworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "news" => Ok(Self::News),
            "keyword" | "keywords" => Ok(Self::Keyword),
            "paa" => Ok(Self::Paa),
            "freshness" => Ok(Self::Freshness),
            other => Err(PressworkError::parse(format!(
                "unknown work item kind '{other}': expected news, keyword, paa, or freshness"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Language & content kinds
// ---------------------------------------------------------------------------

/// Output languages. English is primary, Chinese is the secondary script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Zh,
}

impl Language {
    pub const BOTH: [Language; 2] = [Self::En, Self::Zh];

    pub fn code(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }

    pub fn other(&self) -> Language {
        match self {
            Self::En => Self::Zh,
            Self::Zh => Self::En,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = PressworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" => Ok(Self::En),
            "zh" => Ok(Self::Zh),
            other => Err(PressworkError::parse(format!("unknown language '{other}'"))),
        }
    }
}

/// Document type, which also decides the content-tree directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Glossary,
    Compare,
    Faq,
    Tier2,
    Tier3,
    Blog,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Glossary => "glossary",
            Self::Compare => "compare",
            Self::Faq => "faq",
            Self::Tier2 => "tier2",
            Self::Tier3 => "tier3",
            Self::Blog => "blog",
        }
    }

    /// Directory under the content root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Glossary => "glossary",
            Self::Compare => "compare",
            Self::Faq => "faq",
            Self::Tier2 | Self::Tier3 | Self::Blog => "blogs",
        }
    }

    /// Glossary, compare, FAQ and topic blogs are produced as EN+ZH pairs.
    pub fn is_bilingual(&self) -> bool {
        !matches!(self, Self::Tier2 | Self::Tier3)
    }

    /// Kind-specific minimum body length in characters.
    pub fn min_body_chars(&self) -> usize {
        match self {
            Self::Tier2 | Self::Blog => 500,
            Self::Tier3 => 200,
            Self::Glossary | Self::Compare | Self::Faq => 0,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = PressworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "glossary" => Ok(Self::Glossary),
            "compare" => Ok(Self::Compare),
            "faq" => Ok(Self::Faq),
            "tier2" => Ok(Self::Tier2),
            "tier3" => Ok(Self::Tier3),
            "blog" | "blogs" => Ok(Self::Blog),
            other => Err(PressworkError::parse(format!("unknown content kind '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Work items
// ---------------------------------------------------------------------------

/// A detected news item. Immutable once inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: i64,
    /// Stable key assigned by the feed.
    pub news_key: String,
    pub url: String,
    pub title: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tier: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub detected_at: DateTime<Utc>,
}

/// A keyword waiting to become a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub id: i64,
    pub keyword: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_zh: Option<String>,
    pub language: Language,
    /// Content-type hint for the document this keyword turns into.
    pub content_type: ContentKind,
    /// Coarse topical category (models, tools, infra, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_volume: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_research_id: Option<i64>,
    /// Set when the keyword came out of a single extraction call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_batch: Option<String>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<i64>,
}

/// A "People Also Ask" question mined from search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaaQuestion {
    pub id: i64,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_zh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_query: Option<String>,
    /// Demand proxy.
    pub result_count: i64,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<i64>,
}

/// A match between a news item and an already-published document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessSignal {
    pub id: i64,
    pub content_slug: String,
    pub content_type: ContentKind,
    pub news_item_id: i64,
    /// Keyword-overlap count.
    pub match_score: i64,
    pub status: Status,
}

/// Tagged union over the work-item variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WorkItem {
    News(NewsItem),
    Keyword(Keyword),
    Paa(PaaQuestion),
    Freshness(FreshnessSignal),
}

impl WorkItem {
    pub fn kind(&self) -> WorkItemKind {
        match self {
            Self::News(_) => WorkItemKind::News,
            Self::Keyword(_) => WorkItemKind::Keyword,
            Self::Paa(_) => WorkItemKind::Paa,
            Self::Freshness(_) => WorkItemKind::Freshness,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Self::News(n) => n.id,
            Self::Keyword(k) => k.id,
            Self::Paa(p) => p.id,
            Self::Freshness(f) => f.id,
        }
    }

    pub fn item_ref(&self) -> ItemRef {
        ItemRef::new(self.kind(), self.id())
    }

    /// Relevance score used for backlog ordering.
    pub fn score(&self) -> f64 {
        match self {
            Self::News(n) => n.score,
            Self::Keyword(k) => k.score,
            Self::Paa(p) => p.result_count as f64,
            Self::Freshness(f) => f.match_score as f64,
        }
    }

    /// Current status; news items have none.
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::News(_) => None,
            Self::Keyword(k) => Some(k.status),
            Self::Paa(p) => Some(p.status),
            Self::Freshness(f) => Some(f.status),
        }
    }

    /// Coarse category used by the diversity cap.
    pub fn category(&self) -> Option<&str> {
        match self {
            Self::News(n) => n.category.as_deref(),
            Self::Keyword(k) => k.category.as_deref(),
            Self::Paa(_) | Self::Freshness(_) => None,
        }
    }

    /// Human-readable label for logs and reports.
    pub fn label(&self) -> String {
        match self {
            Self::News(n) => n.title.clone(),
            Self::Keyword(k) => k.keyword.clone(),
            Self::Paa(p) => p.question.clone(),
            Self::Freshness(f) => format!("{} <- news #{}", f.content_slug, f.news_item_id),
        }
    }
}

/// A lightweight reference to one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub kind: WorkItemKind,
    pub id: i64,
}

impl ItemRef {
    pub fn new(kind: WorkItemKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.kind, self.id)
    }
}

// ---------------------------------------------------------------------------
// New work items (ingestion shapes)
// ---------------------------------------------------------------------------

/// Fields for inserting a news item. Natural key: `url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNewsItem {
    pub news_key: String,
    pub url: String,
    pub title: String,
    pub source: String,
    #[serde(default)]
    pub source_tier: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
    pub score: f64,
    #[serde(default)]
    pub summary: Option<String>,
    pub detected_at: DateTime<Utc>,
}

/// Fields for inserting a keyword. Natural key: `keyword` + `language`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewKeyword {
    pub keyword: String,
    #[serde(default)]
    pub keyword_zh: Option<String>,
    #[serde(default = "default_language")]
    pub language: Language,
    pub content_type: ContentKind,
    #[serde(default)]
    pub category: Option<String>,
    pub score: f64,
    #[serde(default)]
    pub search_intent: Option<String>,
    #[serde(default)]
    pub parent_research_id: Option<i64>,
    #[serde(default)]
    pub extraction_batch: Option<String>,
}

fn default_language() -> Language {
    Language::En
}

/// Fields for inserting a PAA question. Natural key: `question`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPaaQuestion {
    pub question: String,
    #[serde(default)]
    pub question_zh: Option<String>,
    #[serde(default)]
    pub source_keyword: Option<String>,
    #[serde(default)]
    pub source_query: Option<String>,
    #[serde(default)]
    pub result_count: i64,
}

/// Fields for inserting a freshness signal. Natural key: slug + news item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFreshnessSignal {
    pub content_slug: String,
    pub content_type: ContentKind,
    pub news_item_id: i64,
    pub match_score: i64,
}

/// Any insertable work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NewWorkItem {
    News(NewNewsItem),
    Keyword(NewKeyword),
    Paa(NewPaaQuestion),
    Freshness(NewFreshnessSignal),
}

impl NewWorkItem {
    pub fn kind(&self) -> WorkItemKind {
        match self {
            Self::News(_) => WorkItemKind::News,
            Self::Keyword(_) => WorkItemKind::Keyword,
            Self::Paa(_) => WorkItemKind::Paa,
            Self::Freshness(_) => WorkItemKind::Freshness,
        }
    }

    /// The natural key the store deduplicates on.
    pub fn natural_key(&self) -> String {
        match self {
            Self::News(n) => n.url.clone(),
            Self::Keyword(k) => format!("{}:{}", k.language, k.keyword),
            Self::Paa(p) => p.question.clone(),
            Self::Freshness(f) => format!("{}:{}", f.content_slug, f.news_item_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Content & research
// ---------------------------------------------------------------------------

/// Publication state of a content record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Draft,
    Published,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

impl FromStr for ContentStatus {
    type Err = PressworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            other => Err(PressworkError::parse(format!("unknown content status '{other}'"))),
        }
    }
}

/// One persisted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: i64,
    pub kind: ContentKind,
    pub title: String,
    /// Globally unique across the store.
    pub slug: String,
    pub body: String,
    pub language: Language,
    pub status: ContentStatus,
    /// Id of the translation counterpart; always symmetric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hreflang_pair_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_id: Option<i64>,
    /// SHA-256 of the committed file contents.
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// Raw research and narrative text produced for one topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRecord {
    pub id: i64,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_narrative: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for s in [
            Status::Backlog,
            Status::Discovered,
            Status::Detected,
            Status::Writing,
            Status::Published,
            Status::Skipped,
            Status::Duplicate,
            Status::Error,
        ] {
            assert_eq!(s.as_str().parse::<Status>().unwrap(), s);
        }
        assert!("stuck".parse::<Status>().is_err());
    }

    #[test]
    fn lifecycle_edges() {
        assert!(Status::Backlog.can_transition_to(Status::Writing));
        assert!(Status::Discovered.can_transition_to(Status::Duplicate));
        assert!(Status::Writing.can_transition_to(Status::Published));
        assert!(Status::Writing.can_transition_to(Status::Error));
        assert!(!Status::Backlog.can_transition_to(Status::Published));
        assert!(!Status::Published.can_transition_to(Status::Backlog));
        assert!(!Status::Error.can_transition_to(Status::Writing));
    }

    #[test]
    fn kind_status_domains() {
        assert!(WorkItemKind::Keyword.accepts(Status::Backlog));
        assert!(!WorkItemKind::Keyword.accepts(Status::Discovered));
        assert!(WorkItemKind::Paa.accepts(Status::Writing));
        assert!(!WorkItemKind::News.accepts(Status::Writing));
        assert_eq!(WorkItemKind::Freshness.initial_status(), Some(Status::Detected));
    }

    #[test]
    fn content_kind_dirs() {
        assert_eq!(ContentKind::Tier2.dir_name(), "blogs");
        assert_eq!(ContentKind::Compare.dir_name(), "compare");
        assert!(ContentKind::Glossary.is_bilingual());
        assert!(!ContentKind::Tier3.is_bilingual());
        assert_eq!("blogs".parse::<ContentKind>().unwrap(), ContentKind::Blog);
    }

    #[test]
    fn new_work_item_from_json() {
        let json = r#"{"kind":"keyword","keyword":"mixture of experts","content_type":"glossary","score":42.0,"category":"models"}"#;
        let item: NewWorkItem = serde_json::from_str(json).expect("parse");
        assert_eq!(item.kind(), WorkItemKind::Keyword);
        assert_eq!(item.natural_key(), "en:mixture of experts");
    }

    #[test]
    fn work_item_accessors() {
        let item = WorkItem::Paa(PaaQuestion {
            id: 3,
            question: "What is RAG?".into(),
            question_zh: None,
            source_keyword: None,
            source_query: None,
            result_count: 1200,
            status: Status::Discovered,
            content_id: None,
        });
        assert_eq!(item.kind(), WorkItemKind::Paa);
        assert_eq!(item.score(), 1200.0);
        assert_eq!(item.item_ref().to_string(), "paa #3");
    }
}
