//! Publish Committer: writes validated artifacts to the content tree and
//! records them in the store.
//!
//! Files land at `{content_dir}/{kind_dir}/{lang}/{slug_base}.md`; the store
//! slug is `{slug_base}-{lang}` so both languages stay unique. Files are
//! written first (atomic rename), then one store transaction links
//! everything. When the store rejects the commit the new files are removed
//! again so the tree does not drift ahead of the store.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use presswork_markdown::{Document, FieldValue, count_words, parse_document};
use presswork_shared::{
    ContentKind, ContentStatus, ItemRef, Language, PressworkError, Result,
};
use presswork_storage::{ContentCommit, ContentUpdate, NewContent, Storage};

/// A validated document ready to be published.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub kind: ContentKind,
    pub language: Language,
    pub slug_base: String,
    pub document: Document,
}

/// Where one committed document ended up.
#[derive(Debug, Clone)]
pub struct CommittedDocument {
    pub content_id: i64,
    pub language: Language,
    pub slug: String,
    pub path: PathBuf,
}

/// Provenance and pairing for one commit.
#[derive(Debug, Clone, Default)]
pub struct CommitLinks {
    pub pair_with: Option<i64>,
    pub source_news_ids: Vec<i64>,
    pub resolves: Option<ItemRef>,
    pub research_id: Option<i64>,
}

/// One update section headed for an existing language file.
#[derive(Debug, Clone)]
pub struct SectionAppend {
    pub language: Language,
    pub path: PathBuf,
    pub section: String,
}

/// Writes into one content tree.
#[derive(Debug, Clone)]
pub struct Committer {
    content_dir: PathBuf,
}

impl Committer {
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
        }
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    /// Canonical file path for a document.
    pub fn path_for(&self, kind: ContentKind, language: Language, slug_base: &str) -> PathBuf {
        self.content_dir
            .join(kind.dir_name())
            .join(language.code())
            .join(format!("{slug_base}.md"))
    }

    /// Publish one document or one language pair.
    ///
    /// The item in `links.resolves` must be in `writing`; it moves to
    /// `published` in the same transaction as the content rows.
    #[instrument(skip_all, fields(documents = docs.len(), resolves = ?links.resolves))]
    pub async fn commit(
        &self,
        storage: &Storage,
        docs: Vec<PreparedDocument>,
        links: CommitLinks,
    ) -> Result<Vec<CommittedDocument>> {
        let mut written: Vec<PathBuf> = Vec::with_capacity(docs.len());
        let mut records = Vec::with_capacity(docs.len());

        for prepared in docs {
            let PreparedDocument {
                kind,
                language,
                slug_base,
                mut document,
            } = prepared;

            document.frontmatter.set_str("slug", slug_base.clone());
            document.frontmatter.set_str("lang", language.code());
            let rendered = document.render();

            let path = self.path_for(kind, language, &slug_base);
            if path.exists() {
                remove_files(&written);
                return Err(PressworkError::validation(format!(
                    "refusing to overwrite existing file {}",
                    path.display()
                )));
            }
            if let Err(e) = write_atomic(&path, &rendered) {
                remove_files(&written);
                return Err(e);
            }
            written.push(path.clone());

            debug!(
                path = %path.display(),
                words = count_words(&document.body),
                "document written"
            );

            let title = document
                .frontmatter
                .get_str("title")
                .unwrap_or(slug_base.as_str())
                .to_string();
            records.push((
                NewContent {
                    kind,
                    title,
                    slug: format!("{slug_base}-{}", language.code()),
                    body: document.body.clone(),
                    language,
                    status: ContentStatus::Published,
                    seo_score: None,
                    research_id: links.research_id,
                    content_hash: content_hash(&rendered),
                },
                path,
            ));
        }

        let commit = ContentCommit {
            documents: records.iter().map(|(c, _)| c.clone()).collect(),
            pair_with: links.pair_with,
            source_news_ids: links.source_news_ids,
            resolves: links.resolves,
        };

        let ids = match storage.commit_content(&commit).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, files = written.len(), "store commit failed, removing written files");
                remove_files(&written);
                return Err(e);
            }
        };

        let committed: Vec<CommittedDocument> = records
            .into_iter()
            .zip(ids)
            .map(|((record, path), content_id)| CommittedDocument {
                content_id,
                language: record.language,
                slug: record.slug,
                path,
            })
            .collect();

        for doc in &committed {
            info!(content_id = doc.content_id, slug = %doc.slug, "published");
        }
        Ok(committed)
    }

    /// Append a dated update section to existing files and record it.
    ///
    /// Each file gets a heading in its own language, the section, and an
    /// `updated` metadata field. The store rows and the signal resolution
    /// are written in one transaction once every file is rewritten. If any
    /// write or the transaction fails, every file gets its original text back.
    #[instrument(skip_all, fields(slug = %slug_base, sections = sections.len()))]
    pub async fn append_update(
        &self,
        storage: &Storage,
        slug_base: &str,
        sections: &[SectionAppend],
        signal_ids: &[i64],
        date: NaiveDate,
    ) -> Result<Vec<i64>> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let mut updates = Vec::with_capacity(sections.len());
        let mut originals: Vec<(PathBuf, String)> = Vec::with_capacity(sections.len());

        for append in sections {
            let text = match std::fs::read_to_string(&append.path) {
                Ok(text) => text,
                Err(e) => {
                    restore_files(&originals);
                    return Err(PressworkError::io(&append.path, e));
                }
            };
            let mut document = match parse_document(&text) {
                Ok(document) => document,
                Err(e) => {
                    restore_files(&originals);
                    return Err(e);
                }
            };

            let heading = match append.language {
                Language::En => format!("## Latest Update ({date_str})"),
                Language::Zh => format!("## 最新动态（{date_str}）"),
            };
            let body = document.body.trim_end();
            document.body = format!("{body}\n\n{heading}\n\n{}", append.section.trim());
            document
                .frontmatter
                .set("updated", FieldValue::Text(date_str.clone()));

            if let Err(e) = write_atomic(&append.path, &document.render()) {
                restore_files(&originals);
                return Err(e);
            }
            originals.push((append.path.clone(), text));
            debug!(path = %append.path.display(), "update section appended");

            updates.push(ContentUpdate {
                content_slug: slug_base.to_string(),
                language: append.language,
                section: append.section.clone(),
            });
        }

        match storage.record_content_updates(&updates, signal_ids).await {
            Ok(ids) => Ok(ids),
            Err(e) => {
                warn!(error = %e, files = originals.len(), "store update failed, restoring files");
                restore_files(&originals);
                Err(e)
            }
        }
    }
}

/// Hex SHA-256 of the committed file contents.
pub fn content_hash(contents: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Write via a hidden temp file in the target directory, then rename.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| PressworkError::validation(format!("no parent for {}", path.display())))?;
    std::fs::create_dir_all(dir).map_err(|e| PressworkError::io(dir, e))?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PressworkError::validation(format!("bad file name {}", path.display())))?;
    let temp = dir.join(format!(".{name}.tmp"));

    std::fs::write(&temp, contents).map_err(|e| PressworkError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| PressworkError::io(path, e))?;
    Ok(())
}

fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to remove written file");
        }
    }
}

fn restore_files(originals: &[(PathBuf, String)]) {
    for (path, text) in originals {
        if let Err(e) = write_atomic(path, text) {
            warn!(path = %path.display(), error = %e, "failed to restore file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{keyword, test_storage};
    use crate::validate::{ExpectedArtifact, Verdict, validate};
    use presswork_shared::{NewWorkItem, Status, ValidationConfig, WorkItemKind};

    fn doc(lang: Language, title: &str, body: &str) -> Document {
        let text = format!(
            "---\nslug: \"draft-slug\"\ntitle: \"{title}\"\ndescription: \"About {title}\"\ndate: \"2026-03-01\"\nlang: \"{}\"\n---\n\n{body}\n",
            lang.code()
        );
        parse_document(&text).unwrap()
    }

    async fn writing_keyword(storage: &Storage, text: &str) -> i64 {
        let id = storage
            .upsert_work_item(&NewWorkItem::Keyword(keyword(text, Some("tools"), 5.0)))
            .await
            .unwrap()
            .unwrap();
        storage
            .transition_status(WorkItemKind::Keyword, id, Some(Status::Backlog), Status::Writing)
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn commit_pair_writes_files_and_links_records() {
        let storage = test_storage().await;
        let tree = tempfile::tempdir().unwrap();
        let committer = Committer::new(tree.path());
        let id = writing_keyword(&storage, "vector database").await;

        let docs = vec![
            PreparedDocument {
                kind: ContentKind::Glossary,
                language: Language::En,
                slug_base: "vector-database".into(),
                document: doc(Language::En, "Vector Database", "A database for embeddings."),
            },
            PreparedDocument {
                kind: ContentKind::Glossary,
                language: Language::Zh,
                slug_base: "vector-database".into(),
                document: doc(Language::Zh, "向量数据库", "用于存储向量嵌入的数据库。"),
            },
        ];
        let committed = committer
            .commit(
                &storage,
                docs,
                CommitLinks {
                    resolves: Some(ItemRef::new(WorkItemKind::Keyword, id)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(committed.len(), 2);
        assert_eq!(committed[0].slug, "vector-database-en");
        assert_eq!(
            committed[1].path,
            tree.path().join("glossary/zh/vector-database.md")
        );

        let en = storage.get_content(committed[0].content_id).await.unwrap().unwrap();
        let zh = storage.get_content(committed[1].content_id).await.unwrap().unwrap();
        assert_eq!(en.hreflang_pair_id, Some(zh.id));
        assert_eq!(zh.hreflang_pair_id, Some(en.id));

        let on_disk = std::fs::read_to_string(&committed[0].path).unwrap();
        assert_eq!(en.content_hash, content_hash(&on_disk));

        assert_eq!(
            storage.current_status(WorkItemKind::Keyword, id).await.unwrap(),
            Some(Status::Published)
        );
    }

    #[tokio::test]
    async fn committed_artifact_reparses_with_required_fields() {
        let storage = test_storage().await;
        let tree = tempfile::tempdir().unwrap();
        let committer = Committer::new(tree.path());

        let body = "Speculative decoding drafts tokens with a small model and verifies them \
                    with the large one, cutting latency without changing outputs.";
        let committed = committer
            .commit(
                &storage,
                vec![PreparedDocument {
                    kind: ContentKind::Glossary,
                    language: Language::En,
                    slug_base: "speculative-decoding".into(),
                    document: doc(Language::En, "Speculative Decoding", body),
                }],
                CommitLinks::default(),
            )
            .await
            .unwrap();

        let text = std::fs::read_to_string(&committed[0].path).unwrap();
        match validate(
            &text,
            &ExpectedArtifact::document(ContentKind::Glossary, Language::En),
            &ValidationConfig::default(),
        ) {
            Verdict::Accepted(reparsed) => {
                assert_eq!(reparsed.frontmatter.get_str("slug"), Some("speculative-decoding"));
                assert_eq!(reparsed.frontmatter.get_str("title"), Some("Speculative Decoding"));
                assert_eq!(reparsed.body.trim(), body);
            }
            Verdict::Rejected(r) => panic!("re-read artifact rejected: {r:?}"),
        }
    }

    #[tokio::test]
    async fn store_failure_removes_written_files() {
        let storage = test_storage().await;
        let tree = tempfile::tempdir().unwrap();
        let committer = Committer::new(tree.path());

        // Item is still in backlog, so resolving it fails inside the transaction.
        let id = storage
            .upsert_work_item(&NewWorkItem::Keyword(keyword("kv cache", None, 1.0)))
            .await
            .unwrap()
            .unwrap();

        let result = committer
            .commit(
                &storage,
                vec![PreparedDocument {
                    kind: ContentKind::Glossary,
                    language: Language::En,
                    slug_base: "kv-cache".into(),
                    document: doc(Language::En, "KV Cache", "Cached attention keys and values."),
                }],
                CommitLinks {
                    resolves: Some(ItemRef::new(WorkItemKind::Keyword, id)),
                    ..Default::default()
                },
            )
            .await;

        assert!(result.is_err());
        assert!(!committer.path_for(ContentKind::Glossary, Language::En, "kv-cache").exists());
        assert!(storage.get_content_by_slug("kv-cache-en").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_update_adds_dated_sections() {
        let storage = test_storage().await;
        let tree = tempfile::tempdir().unwrap();
        let committer = Committer::new(tree.path());

        let en_path = committer.path_for(ContentKind::Blog, Language::En, "agent-protocols");
        let zh_path = committer.path_for(ContentKind::Blog, Language::Zh, "agent-protocols");
        write_atomic(&en_path, &doc(Language::En, "Agent Protocols", "Original body.").render()).unwrap();
        write_atomic(&zh_path, &doc(Language::Zh, "智能体协议", "原始正文。").render()).unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let ids = committer
            .append_update(
                &storage,
                "agent-protocols",
                &[
                    SectionAppend {
                        language: Language::En,
                        path: en_path.clone(),
                        section: "Version 2 adds streaming.".into(),
                    },
                    SectionAppend {
                        language: Language::Zh,
                        path: zh_path.clone(),
                        section: "第二版增加了流式传输。".into(),
                    },
                ],
                &[],
                date,
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let en = parse_document(&std::fs::read_to_string(&en_path).unwrap()).unwrap();
        assert_eq!(en.frontmatter.get_str("updated"), Some("2026-03-02"));
        assert!(en.body.contains("Original body.\n\n## Latest Update (2026-03-02)\n\nVersion 2 adds streaming."));

        let zh = std::fs::read_to_string(&zh_path).unwrap();
        assert!(zh.contains("## 最新动态（2026-03-02）"));
        assert_eq!(storage.content_update_count("agent-protocols").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn append_update_restores_files_when_store_rejects() {
        let storage = test_storage().await;
        let tree = tempfile::tempdir().unwrap();
        let committer = Committer::new(tree.path());

        let en_path = committer.path_for(ContentKind::Blog, Language::En, "agent-protocols");
        let zh_path = committer.path_for(ContentKind::Blog, Language::Zh, "agent-protocols");
        let en_before = doc(Language::En, "Agent Protocols", "Body.").render();
        let zh_before = doc(Language::Zh, "智能体协议", "正文。").render();
        write_atomic(&en_path, &en_before).unwrap();
        write_atomic(&zh_path, &zh_before).unwrap();

        // Signal 999 does not exist, so resolving it fails inside the transaction.
        let result = committer
            .append_update(
                &storage,
                "agent-protocols",
                &[
                    SectionAppend {
                        language: Language::En,
                        path: en_path.clone(),
                        section: "New facts.".into(),
                    },
                    SectionAppend {
                        language: Language::Zh,
                        path: zh_path.clone(),
                        section: "新的事实。".into(),
                    },
                ],
                &[999],
                NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&en_path).unwrap(), en_before);
        assert_eq!(std::fs::read_to_string(&zh_path).unwrap(), zh_before);
        assert_eq!(storage.content_update_count("agent-protocols").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn append_update_restores_earlier_files_when_a_later_one_is_missing() {
        let storage = test_storage().await;
        let tree = tempfile::tempdir().unwrap();
        let committer = Committer::new(tree.path());

        let en_path = committer.path_for(ContentKind::Blog, Language::En, "agent-protocols");
        let en_before = doc(Language::En, "Agent Protocols", "Body.").render();
        write_atomic(&en_path, &en_before).unwrap();

        let result = committer
            .append_update(
                &storage,
                "agent-protocols",
                &[
                    SectionAppend {
                        language: Language::En,
                        path: en_path.clone(),
                        section: "New facts.".into(),
                    },
                    SectionAppend {
                        language: Language::Zh,
                        path: committer.path_for(ContentKind::Blog, Language::Zh, "agent-protocols"),
                        section: "新的事实。".into(),
                    },
                ],
                &[],
                NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&en_path).unwrap(), en_before);
    }
}
