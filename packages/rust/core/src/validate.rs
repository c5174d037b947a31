//! Validation Gate: structural checks on generated artifacts before commit.
//!
//! Checks run in order: metadata block present, required fields, body
//! length, language ratio. A missing metadata block stops the gate
//! immediately; everything after it is collected so a rejection carries all
//! of its reasons.

use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use presswork_markdown::{Document, Frontmatter, parse_document, script_stats};
use presswork_shared::{ContentKind, Language, ValidationConfig};

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

const DOCUMENT_FIELDS: &[&str] = &["slug", "title", "description", "date", "lang"];

/// What the gate expects an artifact to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// A full document with a metadata block.
    Document(ContentKind),
    /// A bare Markdown section appended to an existing document.
    UpdateSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedArtifact {
    pub kind: ArtifactKind,
    pub language: Language,
}

impl ExpectedArtifact {
    pub fn document(kind: ContentKind, language: Language) -> Self {
        Self {
            kind: ArtifactKind::Document(kind),
            language,
        }
    }

    pub fn update_section(language: Language) -> Self {
        Self {
            kind: ArtifactKind::UpdateSection,
            language,
        }
    }

    fn required_fields(&self) -> Vec<&'static str> {
        match self.kind {
            ArtifactKind::Document(ContentKind::Blog) => {
                let mut fields = DOCUMENT_FIELDS.to_vec();
                fields.push("keywords");
                fields
            }
            ArtifactKind::Document(_) => DOCUMENT_FIELDS.to_vec(),
            ArtifactKind::UpdateSection => Vec::new(),
        }
    }

    fn min_body_chars(&self, config: &ValidationConfig) -> usize {
        let kind_min = match self.kind {
            ArtifactKind::Document(kind) => kind.min_body_chars(),
            ArtifactKind::UpdateSection => 0,
        };
        config.min_body_chars.max(kind_min)
    }
}

/// One reason an artifact was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    NoMetadata(String),
    MissingField(&'static str),
    InvalidField { field: &'static str, reason: String },
    TooShort { len: usize, min: usize },
    LanguageRatio { language: Language, ratio: f64, bound: f64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMetadata(detail) => write!(f, "no metadata block: {detail}"),
            Self::MissingField(field) => write!(f, "missing required field '{field}'"),
            Self::InvalidField { field, reason } => write!(f, "invalid '{field}': {reason}"),
            Self::TooShort { len, min } => {
                write!(f, "body too short: {len} chars, minimum {min}")
            }
            Self::LanguageRatio {
                language,
                ratio,
                bound,
            } => match language {
                Language::En => write!(
                    f,
                    "language ratio: {:.0}% CJK in English output (max {:.0}%)",
                    ratio * 100.0,
                    bound * 100.0
                ),
                Language::Zh => write!(
                    f,
                    "language ratio: {:.0}% CJK in Chinese output (min {:.0}%)",
                    ratio * 100.0,
                    bound * 100.0
                ),
            },
        }
    }
}

/// Gate outcome. Accepted artifacts carry their parsed form.
#[derive(Debug, Clone)]
pub enum Verdict {
    Accepted(Document),
    Rejected(Vec<Rejection>),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Validate one generated artifact.
pub fn validate(text: &str, expected: &ExpectedArtifact, config: &ValidationConfig) -> Verdict {
    let document = match expected.kind {
        ArtifactKind::Document(_) => match parse_document(text) {
            Ok(doc) => doc,
            Err(e) => return Verdict::Rejected(vec![Rejection::NoMetadata(e.to_string())]),
        },
        ArtifactKind::UpdateSection => Document {
            frontmatter: Frontmatter::new(),
            body: text.to_string(),
        },
    };

    let mut reasons = Vec::new();

    for field in expected.required_fields() {
        if !document.frontmatter.has(field) {
            reasons.push(Rejection::MissingField(field));
        }
    }

    if let Some(date) = document.frontmatter.get_str("date") {
        if let Some(reason) = check_date(date) {
            reasons.push(Rejection::InvalidField {
                field: "date",
                reason,
            });
        }
    }

    if let Some(lang) = document.frontmatter.get_str("lang") {
        if !lang_matches(lang, expected.language) {
            reasons.push(Rejection::InvalidField {
                field: "lang",
                reason: format!("expected '{}', found '{lang}'", expected.language),
            });
        }
    }

    let body = document.body.trim();
    let len = body.chars().count();
    let min = expected.min_body_chars(config);
    if len < min {
        reasons.push(Rejection::TooShort { len, min });
    }

    if let Some(rejection) = check_ratio(body, expected.language, config) {
        reasons.push(rejection);
    }

    if reasons.is_empty() {
        Verdict::Accepted(document)
    } else {
        Verdict::Rejected(reasons)
    }
}

fn check_date(date: &str) -> Option<String> {
    if !DATE_RE.is_match(date) {
        return Some(format!("'{date}' is not YYYY-MM-DD"));
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .err()
        .map(|e| format!("'{date}': {e}"))
}

fn lang_matches(value: &str, expected: Language) -> bool {
    let value = value.trim().to_ascii_lowercase();
    let code = expected.code();
    value == code
        || value
            .strip_prefix(code)
            .is_some_and(|rest| rest.starts_with('-') || rest.starts_with('_'))
}

/// EN output must stay at or below the CJK ceiling, ZH output must reach the
/// CJK floor. Bodies without letters are left to the length check.
fn check_ratio(body: &str, language: Language, config: &ValidationConfig) -> Option<Rejection> {
    let stats = script_stats(body);
    if stats.alphabetic == 0 {
        return None;
    }
    let ratio = stats.cjk_ratio();

    match language {
        Language::En if ratio > config.en_max_secondary_ratio => Some(Rejection::LanguageRatio {
            language,
            ratio,
            bound: config.en_max_secondary_ratio,
        }),
        Language::Zh if ratio < config.zh_min_secondary_ratio => Some(Rejection::LanguageRatio {
            language,
            ratio,
            bound: config.zh_min_secondary_ratio,
        }),
        _ => None,
    }
}
