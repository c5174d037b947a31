//! Metadata block (frontmatter) parsing and rendering.
//!
//! Generated documents carry a small YAML-like header between `---` fences.
//! Only the subset the pipeline produces is understood: scalar strings
//! (bare, single- or double-quoted), inline lists (`[a, "b"]`), and block
//! lists (`key:` followed by `- item` lines). Key order is preserved so a
//! parsed file renders back in the same shape.

use std::fmt::Write as _;

use presswork_shared::{PressworkError, Result};

/// One metadata value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

/// Ordered key/value metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    entries: Vec<(String, FieldValue)>,
}

impl Frontmatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// A scalar value; lists are not coerced.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            FieldValue::Text(s) => Some(s.as_str()),
            FieldValue::List(_) => None,
        }
    }

    /// A list value. Scalars are split on commas, which is how some
    /// generators emit keyword lists.
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key)? {
            FieldValue::List(items) => Some(items.clone()),
            FieldValue::Text(s) => Some(
                s.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
            ),
        }
    }

    /// Whether `key` is present with a non-empty value.
    pub fn has(&self, key: &str) -> bool {
        match self.get(key) {
            Some(FieldValue::Text(s)) => !s.trim().is_empty(),
            Some(FieldValue::List(items)) => !items.is_empty(),
            None => false,
        }
    }

    /// Insert or replace a value, keeping the original position on replace.
    pub fn set(&mut self, key: &str, value: FieldValue) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn set_str(&mut self, key: &str, value: impl Into<String>) {
        self.set(key, FieldValue::Text(value.into()));
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Render as a `---` fenced block ending in a newline.
    pub fn render(&self) -> String {
        let mut out = String::from("---\n");
        for (key, value) in &self.entries {
            match value {
                FieldValue::Text(s) => {
                    let _ = writeln!(out, "{key}: \"{}\"", escape_yaml_string(s));
                }
                FieldValue::List(items) => {
                    let rendered: Vec<String> = items
                        .iter()
                        .map(|i| format!("\"{}\"", escape_yaml_string(i)))
                        .collect();
                    let _ = writeln!(out, "{key}: [{}]", rendered.join(", "));
                }
            }
        }
        out.push_str("---\n");
        out
    }
}

/// A metadata block plus Markdown body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub frontmatter: Frontmatter,
    pub body: String,
}

impl Document {
    /// Render back to file contents.
    pub fn render(&self) -> String {
        let body = self.body.trim_matches('\n');
        format!("{}\n{body}\n", self.frontmatter.render())
    }
}

/// Split text into metadata and body. Fails when no metadata block is found.
pub fn parse_document(text: &str) -> Result<Document> {
    let normalized = text.replace("\r\n", "\n");
    let text = normalized.trim_start_matches('\u{feff}').trim_start();
    let mut lines = text.lines();

    if lines.next().map(str::trim_end) != Some("---") {
        return Err(PressworkError::parse("no metadata block found"));
    }

    let mut header = Vec::new();
    let mut closed = false;
    let mut consumed = text.lines().next().map_or(0, |l| l.len() + 1);
    for line in lines.by_ref() {
        consumed += line.len() + 1;
        if line.trim_end() == "---" {
            closed = true;
            break;
        }
        header.push(line);
    }
    if !closed {
        return Err(PressworkError::parse("metadata block is not terminated"));
    }

    let frontmatter = parse_header(&header)?;
    let body = text.get(consumed.min(text.len())..).unwrap_or_default();

    Ok(Document {
        frontmatter,
        body: body.trim_start_matches(['\n', '\r']).to_string(),
    })
}

fn parse_header(lines: &[&str]) -> Result<Frontmatter> {
    let mut fm = Frontmatter::new();
    let mut pending_list: Option<(String, Vec<String>)> = None;

    for raw in lines {
        let line = raw.trim_end();
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }

        if let Some(item) = line.trim_start().strip_prefix("- ") {
            match pending_list.as_mut() {
                Some((_, items)) => {
                    items.push(unquote(item.trim()));
                    continue;
                }
                None => {
                    return Err(PressworkError::parse(format!(
                        "list item outside a key: '{line}'"
                    )));
                }
            }
        }

        if let Some((key, items)) = pending_list.take() {
            fm.set(&key, FieldValue::List(items));
        }

        let Some((key, value)) = line.split_once(':') else {
            return Err(PressworkError::parse(format!(
                "malformed metadata line: '{line}'"
            )));
        };
        let key = key.trim();
        let value = value.trim();

        if value.is_empty() {
            pending_list = Some((key.to_string(), Vec::new()));
        } else if value.starts_with('[') && value.ends_with(']') {
            fm.set(key, FieldValue::List(parse_inline_list(value)));
        } else {
            fm.set(key, FieldValue::Text(unquote(value)));
        }
    }

    if let Some((key, items)) = pending_list {
        if items.is_empty() {
            fm.set(&key, FieldValue::Text(String::new()));
        } else {
            fm.set(&key, FieldValue::List(items));
        }
    }

    Ok(fm)
}

fn parse_inline_list(value: &str) -> Vec<String> {
    let inner = &value[1..value.len() - 1];
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in inner.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match (c, quote) {
            ('\\', Some('"')) => {
                current.push(c);
                escaped = true;
            }
            ('"' | '\'', None) => {
                quote = Some(c);
                current.push(c);
            }
            (q, Some(open)) if q == open => {
                quote = None;
                current.push(c);
            }
            (',', None) => {
                items.push(unquote(current.trim()));
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        items.push(unquote(current.trim()));
    }
    items.retain(|i| !i.is_empty());
    items
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let inner = &value[1..value.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some(other) => out.push(other),
                    None => out.push('\\'),
                }
            } else {
                out.push(c);
            }
        }
        out
    } else if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        value[1..value.len() - 1].replace("''", "'")
    } else {
        value.to_string()
    }
}

/// Escape special characters in a double-quoted YAML string value.
pub fn escape_yaml_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "---\n\
slug: claude-5-launch\n\
title: \"Claude 5: What \\\"Changed\\\"\"\n\
description: 'It''s here'\n\
keywords: [claude, \"anthropic, inc\", llm]\n\
tags:\n  - ai\n  - models\n\
---\n\n# Heading\n\nBody text.\n";

    #[test]
    fn parse_scalars_and_lists() {
        let doc = parse_document(SAMPLE).unwrap();
        let fm = &doc.frontmatter;
        assert_eq!(fm.get_str("slug"), Some("claude-5-launch"));
        assert_eq!(fm.get_str("title"), Some("Claude 5: What \"Changed\""));
        assert_eq!(fm.get_str("description"), Some("It's here"));
        assert_eq!(
            fm.get_list("keywords").unwrap(),
            vec!["claude", "anthropic, inc", "llm"]
        );
        assert_eq!(fm.get_list("tags").unwrap(), vec!["ai", "models"]);
        assert!(doc.body.starts_with("# Heading"));
    }

    #[test]
    fn scalar_list_splits_on_commas() {
        let doc = parse_document("---\nkeywords: a, b ,c\n---\nx").unwrap();
        assert_eq!(doc.frontmatter.get_list("keywords").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn missing_block_is_rejected() {
        assert!(parse_document("# Just a heading\n\ntext").is_err());
        assert!(parse_document("---\ntitle: x\nno closing fence").is_err());
    }

    #[test]
    fn render_then_parse_keeps_fields() {
        let mut doc = parse_document(SAMPLE).unwrap();
        doc.frontmatter.set_str("updated", "2026-10-19");
        doc.frontmatter.set_str("slug", "renamed");

        let reparsed = parse_document(&doc.render()).unwrap();
        assert_eq!(reparsed.frontmatter, doc.frontmatter);
        assert_eq!(reparsed.body.trim(), doc.body.trim());
        // Replacing keeps position.
        assert_eq!(reparsed.frontmatter.keys().next(), Some("slug"));
    }

    #[test]
    fn has_ignores_blank_values() {
        let doc = parse_document("---\ntitle: \"\"\ndate: 2026-01-01\n---\n").unwrap();
        assert!(!doc.frontmatter.has("title"));
        assert!(doc.frontmatter.has("date"));
        assert!(!doc.frontmatter.has("lang"));
    }

    #[test]
    fn escape_yaml_string_quotes() {
        assert_eq!(escape_yaml_string(r#"a "b" \c"#), r#"a \"b\" \\c"#);
    }
}
