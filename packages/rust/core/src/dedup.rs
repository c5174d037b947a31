//! Dedup Index: in-memory slug/title sets built once per run.
//!
//! Sources are the store's content records and a scan of the published
//! content tree, which may hold hand-edited files the store never saw. The
//! index is derived and never written back anywhere.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use presswork_markdown::{normalize_slug, parse_document, strip_language_suffix};
use presswork_shared::Result;
use presswork_storage::Storage;

/// Normalized slugs and titles of everything already published.
#[derive(Debug, Default, Clone)]
pub struct DedupIndex {
    slugs: HashSet<String>,
    titles: HashSet<String>,
}

impl DedupIndex {
    /// Build from the store and the content tree under `content_dir`.
    ///
    /// A missing content directory is treated as empty.
    pub async fn build(storage: &Storage, content_dir: &Path) -> Result<Self> {
        let mut index = Self::default();

        let keys = storage.content_keys().await?;
        for (slug, title) in &keys {
            index.insert(slug, title);
        }

        let files = index.scan_tree(content_dir);
        info!(
            store_records = keys.len(),
            files,
            slugs = index.slugs.len(),
            titles = index.titles.len(),
            "dedup index built"
        );
        Ok(index)
    }

    /// Whether a candidate collides with published content by slug or title.
    pub fn is_duplicate(&self, candidate_key: &str, candidate_title: &str) -> bool {
        let key = normalize_key(candidate_key);
        let title = normalize_slug(candidate_title);

        (!key.is_empty() && self.slugs.contains(&key))
            || (!title.is_empty() && (self.titles.contains(&title) || self.slugs.contains(&title)))
    }

    /// Record a slug/title committed during the current run.
    pub fn insert(&mut self, slug: &str, title: &str) {
        let key = normalize_key(slug);
        if !key.is_empty() {
            self.slugs.insert(key);
        }
        let title = normalize_slug(title);
        if !title.is_empty() {
            self.titles.insert(title);
        }
    }

    pub fn len(&self) -> usize {
        self.slugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }

    /// Index every `.md` file under `content_dir`. Returns the file count.
    fn scan_tree(&mut self, content_dir: &Path) -> usize {
        if !content_dir.exists() {
            debug!(dir = %content_dir.display(), "content directory missing, skipping scan");
            return 0;
        }

        let mut files = 0;
        for entry in WalkDir::new(content_dir).into_iter().filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "skipping unreadable content path");
                None
            }
        }) {
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with('.') {
                continue;
            }

            files += 1;
            let key = normalize_key(stem);
            if !key.is_empty() {
                self.slugs.insert(key);
            }

            match std::fs::read_to_string(path) {
                Ok(text) => {
                    if let Ok(doc) = parse_document(&text) {
                        if let Some(title) = doc.frontmatter.get_str("title") {
                            self.insert("", title);
                        }
                        if let Some(slug) = doc.frontmatter.get_str("slug") {
                            self.insert(slug, "");
                        }
                    }
                }
                Err(e) => warn!(path = %path.display(), error = %e, "cannot read content file"),
            }
        }
        files
    }
}

/// Slug-side normalization: language suffix removed, then normalized.
fn normalize_key(raw: &str) -> String {
    let normalized = normalize_slug(raw);
    strip_language_suffix(&normalized).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_storage;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn legacy_filename_matches_normalized_candidate() {
        let storage = test_storage().await;
        let tree = tempfile::tempdir().unwrap();
        write(tree.path(), "compare/gpt-6-vs-claude-5-en.md", "no metadata here");

        let index = DedupIndex::build(&storage, tree.path()).await.unwrap();
        assert!(index.is_duplicate("GPT-6 VS Claude 5!!", "Something else"));
        assert!(index.is_duplicate("gpt-6-vs-claude-5", ""));
        assert!(!index.is_duplicate("gpt-7-vs-claude-6", "GPT-7 vs Claude 6"));
    }

    #[tokio::test]
    async fn canonical_layout_and_titles_are_indexed() {
        let storage = test_storage().await;
        let tree = tempfile::tempdir().unwrap();
        write(
            tree.path(),
            "blogs/en/agent-frameworks.md",
            "---\ntitle: \"What's New in Agent Frameworks\"\nslug: agent-frameworks\n---\n\nBody\n",
        );
        write(tree.path(), "blogs/en/.agent-draft.md.tmp", "ignored");

        let index = DedupIndex::build(&storage, tree.path()).await.unwrap();
        assert!(index.is_duplicate("agent-frameworks", ""));
        // Title collision with different phrasing of the slug, quotes dropped.
        assert!(index.is_duplicate("new-agent-frameworks-2026", "Whats new in agent frameworks"));
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn store_records_and_run_inserts() {
        let storage = test_storage().await;
        storage
            .commit_content(&presswork_storage::ContentCommit {
                documents: vec![presswork_storage::NewContent {
                    kind: presswork_shared::ContentKind::Glossary,
                    title: "Model Context Protocol".into(),
                    slug: "model-context-protocol-en".into(),
                    body: "Body".into(),
                    language: presswork_shared::Language::En,
                    status: presswork_shared::ContentStatus::Published,
                    seo_score: None,
                    research_id: None,
                    content_hash: "h".into(),
                }],
                ..Default::default()
            })
            .await
            .unwrap();

        let missing = std::env::temp_dir().join("presswork-no-such-content-dir");
        let mut index = DedupIndex::build(&storage, &missing).await.unwrap();
        assert!(index.is_duplicate("model-context-protocol", ""));
        assert!(index.is_duplicate("mcp", "model context protocol"));

        assert!(!index.is_duplicate("rag", "Retrieval-Augmented Generation"));
        index.insert("rag", "Retrieval-Augmented Generation");
        assert!(index.is_duplicate("RAG", ""));
    }

    #[test]
    fn empty_candidates_never_match() {
        let mut index = DedupIndex::default();
        index.insert("", "");
        assert!(index.is_empty());
        assert!(!index.is_duplicate("", "!!!"));
    }
}
