//! Markdown utilities for generated documents.
//!
//! - [`frontmatter`]: metadata block parse/render
//! - [`cleanup`]: passes that normalize raw generator output
//! - [`slug`]: slug normalization used for dedup and file naming
//! - [`script`]: CJK/Latin character statistics for the language-ratio check

pub mod cleanup;
pub mod frontmatter;
pub mod script;
pub mod slug;

use std::sync::LazyLock;

use scraper::Html;

pub use cleanup::{clean_document, clean_section};
pub use frontmatter::{Document, FieldValue, Frontmatter, escape_yaml_string, parse_document};
pub use script::{ScriptStats, script_stats};
pub use slug::{MAX_SLUG_CHARS, is_kebab_case, normalize_slug, normalize_slug_max, strip_language_suffix};

/// Reduce an HTML snippet (as returned by search APIs) to plain text.
pub fn strip_html(snippet: &str) -> String {
    static WS_RE: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"\s+").expect("valid regex"));

    let fragment = Html::parse_fragment(snippet);
    let text: String = fragment.root_element().text().collect();
    WS_RE.replace_all(text.trim(), " ").to_string()
}

/// Count words in a Markdown body, excluding fenced code blocks.
///
/// CJK characters count as one word each.
pub fn count_words(md: &str) -> usize {
    let mut count = 0;
    let mut in_code_block = false;
    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            continue;
        }
        if in_code_block {
            continue;
        }
        for token in line.split_whitespace() {
            let cjk = token.chars().filter(|c| script::is_cjk(*c)).count();
            if cjk > 0 {
                count += cjk;
            } else if token.chars().any(char::is_alphanumeric) {
                count += 1;
            }
        }
    }
    count
}
