//! Slug normalization shared by the dedup index and the committer.

/// Maximum slug length in characters.
pub const MAX_SLUG_CHARS: usize = 80;

const QUOTES: &[char] = &['\'', '"', '`', '\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}'];

/// Normalize text into a slug capped at [`MAX_SLUG_CHARS`].
///
/// Lowercases, drops quote characters, keeps Unicode alphanumerics (so CJK
/// titles survive), maps everything else to `-`, collapses runs, and trims.
pub fn normalize_slug(text: &str) -> String {
    normalize_slug_max(text, MAX_SLUG_CHARS)
}

/// [`normalize_slug`] with an explicit length cap.
pub fn normalize_slug_max(text: &str, max_chars: usize) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_dash = true;

    for c in text.chars().flat_map(char::to_lowercase) {
        if QUOTES.contains(&c) {
            continue;
        }
        if c.is_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    let truncated: String = slug.chars().take(max_chars).collect();
    truncated.trim_matches('-').to_string()
}

/// Strip a trailing `-en` / `-zh` language suffix from a file stem.
pub fn strip_language_suffix(stem: &str) -> &str {
    stem.strip_suffix("-en")
        .or_else(|| stem.strip_suffix("-zh"))
        .unwrap_or(stem)
}

/// Whether `slug` is already in normalized kebab-case form.
pub fn is_kebab_case(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_and_case_collapse() {
        assert_eq!(normalize_slug("GPT-6 VS Claude 5!!"), "gpt-6-vs-claude-5");
        assert_eq!(normalize_slug("  What's  new -- in Rust?  "), "whats-new-in-rust");
    }

    #[test]
    fn unicode_alphanumerics_survive() {
        assert_eq!(normalize_slug("什么是 MCP 协议？"), "什么是-mcp-协议");
    }

    #[test]
    fn truncates_without_trailing_dash() {
        let long = "word ".repeat(40);
        let slug = normalize_slug(&long);
        assert!(slug.chars().count() <= MAX_SLUG_CHARS);
        assert!(!slug.ends_with('-'));
        assert_eq!(normalize_slug_max("abc def ghi", 4), "abc");
    }

    #[test]
    fn language_suffix() {
        assert_eq!(strip_language_suffix("gpt-6-vs-claude-5-en"), "gpt-6-vs-claude-5");
        assert_eq!(strip_language_suffix("mcp-zh"), "mcp");
        assert_eq!(strip_language_suffix("english"), "english");
    }

    #[test]
    fn kebab_case_check() {
        assert!(is_kebab_case("claude-5-launch"));
        assert!(!is_kebab_case("Claude-5"));
        assert!(!is_kebab_case("a--b"));
        assert!(!is_kebab_case(""));
    }
}
