//! Cleanup passes for raw generator output.
//!
//! Each pass is a function `&str -> String` applied in sequence. Generators
//! tend to wrap documents in code fences, prepend a chatty preamble, or emit
//! ragged whitespace; these passes undo that before validation.

use std::sync::LazyLock;

use regex::Regex;

/// Clean a full document (metadata block + body).
pub fn clean_document(raw: &str) -> String {
    let mut result = strip_wrapping_fence(raw.trim());
    result = drop_preamble(&result);
    result = normalize_headings(&result);
    result = clean_blank_lines(&result);
    result = normalize_whitespace(&result);
    ensure_trailing_newline(&result)
}

/// Clean a bare Markdown section (no metadata block), e.g. an update.
///
/// A leading horizontal rule is dropped; the caller adds its own separator.
pub fn clean_section(raw: &str) -> String {
    let mut result = strip_wrapping_fence(raw.trim());
    result = strip_leading_rule(&result);
    result = clean_blank_lines(&result);
    result = normalize_whitespace(&result);
    ensure_trailing_newline(result.trim_start_matches('\n'))
}

// ---------------------------------------------------------------------------
// Pass 1: Strip a code fence wrapping the whole output
// ---------------------------------------------------------------------------

fn strip_wrapping_fence(text: &str) -> String {
    static OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^```(?:markdown|md|yaml)?\s*$").expect("valid regex")
    });

    let lines: Vec<&str> = text.lines().collect();
    if lines.len() >= 2
        && OPEN_RE.is_match(lines[0].trim())
        && lines[lines.len() - 1].trim() == "```"
    {
        return lines[1..lines.len() - 1].join("\n");
    }
    text.to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Drop chatter before the metadata block
// ---------------------------------------------------------------------------

/// Drop text before the first `---` line, provided a closing `---` follows.
fn drop_preamble(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let Some(open) = lines.iter().position(|l| l.trim_end() == "---") else {
        return text.to_string();
    };
    if open == 0 {
        return text.to_string();
    }
    let has_close = lines[open + 1..].iter().any(|l| l.trim_end() == "---");
    if !has_close {
        return text.to_string();
    }
    lines[open..].join("\n")
}

fn strip_leading_rule(text: &str) -> String {
    let trimmed = text.trim_start();
    match trimmed.strip_prefix("---") {
        Some(rest) if rest.starts_with('\n') || rest.is_empty() => rest.to_string(),
        _ => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Pass 3: Normalize heading levels
// ---------------------------------------------------------------------------

/// Ensure there's at most one H1 outside code blocks.
fn normalize_headings(md: &str) -> String {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^#\s+(.+)$").expect("valid regex"));

    let mut h1_count = 0;
    let mut in_code_block = false;
    let mut lines: Vec<String> = Vec::new();

    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
        }
        if !in_code_block {
            if let Some(caps) = H1_RE.captures(line) {
                h1_count += 1;
                if h1_count > 1 {
                    // Demote duplicate H1s to H2
                    lines.push(format!("## {}", &caps[1]));
                    continue;
                }
            }
        }
        lines.push(line.to_string());
    }

    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Pass 4: Whitespace
// ---------------------------------------------------------------------------

/// Collapse runs of 3+ blank lines into exactly 2.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{4,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n\n").to_string()
}

/// Trim trailing whitespace on every line.
fn normalize_whitespace(md: &str) -> String {
    md.lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ensure the text ends with exactly one newline.
fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    format!("{trimmed}\n")
}
