//! Script statistics for the language-ratio check.

/// Character counts over prose, excluding fenced code blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptStats {
    /// Han and kana characters.
    pub cjk: usize,
    /// All alphabetic characters, CJK included.
    pub alphabetic: usize,
}

impl ScriptStats {
    /// Fraction of alphabetic characters in CJK script; 0 for empty text.
    pub fn cjk_ratio(&self) -> f64 {
        if self.alphabetic == 0 {
            0.0
        } else {
            self.cjk as f64 / self.alphabetic as f64
        }
    }
}

/// Count CJK and alphabetic characters outside fenced code blocks.
pub fn script_stats(text: &str) -> ScriptStats {
    let mut stats = ScriptStats::default();
    let mut in_code_block = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            continue;
        }
        if in_code_block {
            continue;
        }
        for c in line.chars() {
            if is_cjk(c) {
                stats.cjk += 1;
                stats.alphabetic += 1;
            } else if c.is_alphabetic() {
                stats.alphabetic += 1;
            }
        }
    }

    stats
}

/// Han ideographs (basic, extension A, compatibility) and Japanese kana.
pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF
        | 0x3400..=0x4DBF
        | 0xF900..=0xFAFF
        | 0x20000..=0x2A6DF
        | 0x3040..=0x30FF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_text_has_zero_ratio() {
        let stats = script_stats("Plain English prose, with digits 123.");
        assert_eq!(stats.cjk, 0);
        assert_eq!(stats.cjk_ratio(), 0.0);
    }

    #[test]
    fn mixed_text_ratio() {
        let stats = script_stats("模型发布 GPT6");
        assert_eq!(stats.cjk, 4);
        assert_eq!(stats.alphabetic, 7);
        let stats = script_stats("模型发布 abcd");
        assert!((stats.cjk_ratio() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn code_blocks_are_ignored() {
        let text = "English only.\n\n```\n中文注释中文注释\n```\n";
        assert_eq!(script_stats(text).cjk, 0);
    }

    #[test]
    fn punctuation_is_not_counted() {
        let stats = script_stats("，。！？");
        assert_eq!(stats.alphabetic, 0);
    }
}
