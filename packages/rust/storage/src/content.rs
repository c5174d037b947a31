//! Content records, research blobs, topic index, and append-only updates.
//!
//! Every multi-row write here runs in one transaction so that a crash leaves
//! at most the in-flight item inconsistent.

use libsql::{Connection, params};
use tracing::{debug, info, instrument, warn};

use presswork_shared::{
    ContentKind, ContentRecord, ContentStatus, ItemRef, Language, PressworkError, ResearchRecord,
    Result, Status, WorkItemKind,
};

use crate::{Storage, get_i64, get_parsed, get_string, now_ts, parse_ts, storage_err};

const CONTENT_COLS: &str = "id, type, title, slug, body, language, status, hreflang_pair_id, \
     seo_score, research_id, content_hash, published_at";

/// A document about to be persisted.
#[derive(Debug, Clone)]
pub struct NewContent {
    pub kind: ContentKind,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub language: Language,
    pub status: ContentStatus,
    pub seo_score: Option<f64>,
    pub research_id: Option<i64>,
    pub content_hash: String,
}

/// Everything persisted for one committed item, applied atomically.
#[derive(Debug, Clone, Default)]
pub struct ContentCommit {
    /// One document, or an EN/ZH pair which is linked as hreflang partners.
    pub documents: Vec<NewContent>,
    /// Existing record to pair a single document with.
    pub pair_with: Option<i64>,
    /// News items the documents were derived from.
    pub source_news_ids: Vec<i64>,
    /// Work item resolved to `published` by this commit (must be `writing`).
    pub resolves: Option<ItemRef>,
}

/// Outcome row for one topic pipeline run.
#[derive(Debug, Clone)]
pub struct TopicIndexEntry {
    pub topic_slug: String,
    pub title: String,
    /// `published`, `partial`, or `failed`.
    pub status: String,
    pub research_id: Option<i64>,
    pub en_content_id: Option<i64>,
    pub zh_content_id: Option<i64>,
}

/// An update section appended to a published document.
#[derive(Debug, Clone)]
pub struct ContentUpdate {
    pub content_slug: String,
    pub language: Language,
    pub section: String,
}

impl Storage {
    // -----------------------------------------------------------------------
    // Content commit
    // -----------------------------------------------------------------------

    /// Persist documents, hreflang links, provenance, and item resolution in
    /// one transaction. Returns the new content ids in input order.
    #[instrument(skip_all, fields(documents = commit.documents.len(), resolves = ?commit.resolves))]
    pub async fn commit_content(&self, commit: &ContentCommit) -> Result<Vec<i64>> {
        self.check_writable()?;

        if commit.documents.is_empty() || commit.documents.len() > 2 {
            return Err(PressworkError::validation(format!(
                "a commit carries one document or one language pair, got {}",
                commit.documents.len()
            )));
        }
        if commit.documents.len() == 2 && commit.pair_with.is_some() {
            return Err(PressworkError::validation(
                "pair_with only applies to single-document commits",
            ));
        }

        let tx = self.conn.transaction().await.map_err(storage_err)?;
        match apply_commit(&tx, commit).await {
            Ok(ids) => {
                tx.commit().await.map_err(storage_err)?;
                info!(ids = ?ids, "content committed");
                Ok(ids)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Get a content record by id.
    pub async fn get_content(&self, id: i64) -> Result<Option<ContentRecord>> {
        let sql = format!("SELECT {CONTENT_COLS} FROM content WHERE id = ?1");
        let mut rows = self.conn.query(&sql, params![id]).await.map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_content(&row)?)),
            None => Ok(None),
        }
    }

    /// Get a content record by its store slug.
    pub async fn get_content_by_slug(&self, slug: &str) -> Result<Option<ContentRecord>> {
        let sql = format!("SELECT {CONTENT_COLS} FROM content WHERE slug = ?1");
        let mut rows = self.conn.query(&sql, params![slug]).await.map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_content(&row)?)),
            None => Ok(None),
        }
    }

    /// All `(slug, title)` pairs, for building the dedup index.
    pub async fn content_keys(&self) -> Result<Vec<(String, String)>> {
        let mut rows = self
            .conn
            .query("SELECT slug, title FROM content ORDER BY id", params![])
            .await
            .map_err(storage_err)?;

        let mut keys = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            keys.push((get_string(&row, 0)?, get_string(&row, 1)?));
        }
        Ok(keys)
    }

    /// News ids linked to a content record.
    pub async fn content_sources(&self, content_id: i64) -> Result<Vec<i64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT news_item_id FROM content_sources WHERE content_id = ?1 ORDER BY news_item_id",
                params![content_id],
            )
            .await
            .map_err(storage_err)?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            ids.push(get_i64(&row, 0)?);
        }
        Ok(ids)
    }

    // -----------------------------------------------------------------------
    // Research
    // -----------------------------------------------------------------------

    /// Create a research record for a topic.
    pub async fn insert_research(&self, topic: &str) -> Result<i64> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO research (topic, created_at) VALUES (?1, ?2)",
                params![topic, now_ts()],
            )
            .await
            .map_err(storage_err)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Store the raw research report.
    pub async fn set_research_report(&self, id: i64, report: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE research SET research_report = ?1 WHERE id = ?2",
                params![report, id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Store the narrative JSON.
    pub async fn set_research_narrative(&self, id: i64, narrative: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE research SET core_narrative = ?1 WHERE id = ?2",
                params![narrative, id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Get a research record by id.
    pub async fn get_research(&self, id: i64) -> Result<Option<ResearchRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, topic, research_report, core_narrative, created_at FROM research WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(ResearchRecord {
                id: get_i64(&row, 0)?,
                topic: get_string(&row, 1)?,
                research_report: row.get::<String>(2).ok(),
                core_narrative: row.get::<String>(3).ok(),
                created_at: parse_ts(&get_string(&row, 4)?)?,
            })),
            None => Ok(None),
        }
    }

    /// Insert or update the topic index row for a topic slug.
    pub async fn upsert_topic_index(&self, entry: &TopicIndexEntry) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO topic_index
                   (topic_slug, title, status, research_id, en_content_id, zh_content_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(topic_slug) DO UPDATE SET
                   title = excluded.title,
                   status = excluded.status,
                   research_id = excluded.research_id,
                   en_content_id = COALESCE(excluded.en_content_id, topic_index.en_content_id),
                   zh_content_id = COALESCE(excluded.zh_content_id, topic_index.zh_content_id),
                   updated_at = excluded.updated_at",
                params![
                    entry.topic_slug.as_str(),
                    entry.title.as_str(),
                    entry.status.as_str(),
                    entry.research_id,
                    entry.en_content_id,
                    entry.zh_content_id,
                    now_ts(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Status recorded for a topic slug.
    pub async fn topic_status(&self, topic_slug: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT status FROM topic_index WHERE topic_slug = ?1",
                params![topic_slug],
            )
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(get_string(&row, 0)?)),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Content updates
    // -----------------------------------------------------------------------

    /// Append one update row per touched language file and resolve the
    /// freshness signals behind them.
    ///
    /// Signals must be in `writing`; any mismatch rolls the whole update back.
    pub async fn record_content_updates(
        &self,
        updates: &[ContentUpdate],
        signal_ids: &[i64],
    ) -> Result<Vec<i64>> {
        self.check_writable()?;
        if updates.is_empty() {
            return Err(PressworkError::validation("no update sections to record"));
        }
        let ids_json = serde_json::to_string(signal_ids)
            .map_err(|e| PressworkError::Storage(format!("encode signal ids: {e}")))?;

        let tx = self.conn.transaction().await.map_err(storage_err)?;
        let result: Result<Vec<i64>> = async {
            let now = now_ts();
            let mut ids = Vec::with_capacity(updates.len());
            for update in updates {
                tx.execute(
                    "INSERT INTO content_updates (content_slug, language, section, signal_ids, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        update.content_slug.as_str(),
                        update.language.code(),
                        update.section.as_str(),
                        ids_json.as_str(),
                        now.as_str(),
                    ],
                )
                .await
                .map_err(storage_err)?;
                ids.push(tx.last_insert_rowid());
            }

            for &signal_id in signal_ids {
                resolve_item(
                    &tx,
                    ItemRef::new(WorkItemKind::Freshness, signal_id),
                    None,
                    &now,
                )
                .await?;
            }
            Ok(ids)
        }
        .await;

        match result {
            Ok(ids) => {
                tx.commit().await.map_err(storage_err)?;
                debug!(rows = ids.len(), signals = signal_ids.len(), "content updates recorded");
                Ok(ids)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Number of update sections recorded for a slug.
    pub async fn content_update_count(&self, content_slug: &str) -> Result<i64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM content_updates WHERE content_slug = ?1",
                params![content_slug],
            )
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => get_i64(&row, 0),
            None => Ok(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction bodies
// ---------------------------------------------------------------------------

async fn apply_commit(conn: &Connection, commit: &ContentCommit) -> Result<Vec<i64>> {
    let now = now_ts();
    let mut ids = Vec::with_capacity(commit.documents.len());

    for doc in &commit.documents {
        let published_at = (doc.status == ContentStatus::Published).then(|| now.clone());
        conn.execute(
            "INSERT INTO content
               (type, title, slug, body, language, status, seo_score, research_id,
                content_hash, published_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                doc.kind.as_str(),
                doc.title.as_str(),
                doc.slug.as_str(),
                doc.body.as_str(),
                doc.language.code(),
                doc.status.as_str(),
                doc.seo_score,
                doc.research_id,
                doc.content_hash.as_str(),
                published_at,
                now.as_str(),
            ],
        )
        .await
        .map_err(|e| PressworkError::Storage(format!("insert content '{}': {e}", doc.slug)))?;
        ids.push(conn.last_insert_rowid());
    }

    match (ids.as_slice(), commit.pair_with) {
        ([a, b], None) => link_pair(conn, *a, *b).await?,
        ([a], Some(partner)) => link_pair(conn, *a, partner).await?,
        _ => {}
    }

    for &content_id in &ids {
        for &news_id in &commit.source_news_ids {
            conn.execute(
                "INSERT OR IGNORE INTO content_sources (content_id, news_item_id) VALUES (?1, ?2)",
                params![content_id, news_id],
            )
            .await
            .map_err(storage_err)?;
        }
    }

    if let Some(item) = commit.resolves {
        resolve_item(conn, item, ids.first().copied(), &now).await?;
    }

    Ok(ids)
}

/// Set both directions of an hreflang pair.
async fn link_pair(conn: &Connection, a: i64, b: i64) -> Result<()> {
    for (id, partner) in [(a, b), (b, a)] {
        let changed = conn
            .execute(
                "UPDATE content SET hreflang_pair_id = ?1 WHERE id = ?2",
                params![partner, id],
            )
            .await
            .map_err(storage_err)?;
        if changed == 0 {
            return Err(PressworkError::NotFound {
                kind: "content".into(),
                id,
            });
        }
    }
    Ok(())
}

/// Guarded `writing -> published` for the item behind a commit.
async fn resolve_item(
    conn: &Connection,
    item: ItemRef,
    content_id: Option<i64>,
    now: &str,
) -> Result<()> {
    let changed = match item.kind {
        WorkItemKind::Keyword | WorkItemKind::Paa => conn
            .execute(
                &format!(
                    "UPDATE {} SET status = 'published', content_id = ?1, updated_at = ?2
                     WHERE id = ?3 AND status = 'writing'",
                    item.kind.table()
                ),
                params![content_id, now, item.id],
            )
            .await
            .map_err(storage_err)?,
        WorkItemKind::Freshness => conn
            .execute(
                "UPDATE freshness_signals SET status = 'published', updated_at = ?1
                 WHERE id = ?2 AND status = 'writing'",
                params![now, item.id],
            )
            .await
            .map_err(storage_err)?,
        WorkItemKind::News => 0,
    };

    if changed == 0 {
        return Err(PressworkError::invalid_transition(
            item.kind,
            item.id,
            Status::Writing,
            None,
        ));
    }
    Ok(())
}

fn row_to_content(row: &libsql::Row) -> Result<ContentRecord> {
    Ok(ContentRecord {
        id: get_i64(row, 0)?,
        kind: get_parsed(row, 1)?,
        title: get_string(row, 2)?,
        slug: get_string(row, 3)?,
        body: get_string(row, 4)?,
        language: get_parsed(row, 5)?,
        status: get_parsed(row, 6)?,
        hreflang_pair_id: row.get::<i64>(7).ok(),
        seo_score: row.get::<f64>(8).ok(),
        research_id: row.get::<i64>(9).ok(),
        content_hash: get_string(row, 10)?,
        published_at: match row.get::<String>(11).ok() {
            Some(s) => Some(parse_ts(&s)?),
            None => None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_storage;
    use chrono::Utc;
    use presswork_shared::{NewFreshnessSignal, NewKeyword, NewNewsItem, NewWorkItem};

    fn doc(slug: &str, language: Language) -> NewContent {
        NewContent {
            kind: ContentKind::Glossary,
            title: format!("Title of {slug}"),
            slug: slug.into(),
            body: "Body text".into(),
            language,
            status: ContentStatus::Published,
            seo_score: None,
            research_id: None,
            content_hash: "abc".into(),
        }
    }

    async fn writing_keyword(storage: &Storage, text: &str) -> i64 {
        let id = storage
            .upsert_work_item(&NewWorkItem::Keyword(NewKeyword {
                keyword: text.into(),
                keyword_zh: None,
                language: Language::En,
                content_type: ContentKind::Glossary,
                category: None,
                score: 1.0,
                search_intent: None,
                parent_research_id: None,
                extraction_batch: None,
            }))
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
    async fn pair_commit_is_symmetric_and_resolves_item() {
        let storage = test_storage().await;
        let kw = writing_keyword(&storage, "tokenizer").await;
        let news_id = storage
            .upsert_work_item(&NewWorkItem::News(NewNewsItem {
                news_key: "n1".into(),
                url: "https://news.test/1".into(),
                title: "Tokenizers".into(),
                source: "wire".into(),
                source_tier: None,
                category: None,
                score: 1.0,
                summary: None,
                detected_at: Utc::now(),
            }))
            .await
            .unwrap()
            .unwrap();

        let ids = storage
            .commit_content(&ContentCommit {
                documents: vec![doc("tokenizer-en", Language::En), doc("tokenizer-zh", Language::Zh)],
                pair_with: None,
                source_news_ids: vec![news_id],
                resolves: Some(ItemRef::new(WorkItemKind::Keyword, kw)),
            })
            .await
            .expect("commit");
        assert_eq!(ids.len(), 2);

        let en = storage.get_content(ids[0]).await.unwrap().unwrap();
        let zh = storage.get_content(ids[1]).await.unwrap().unwrap();
        assert_eq!(en.hreflang_pair_id, Some(zh.id));
        assert_eq!(zh.hreflang_pair_id, Some(en.id));
        assert!(en.published_at.is_some());
        assert_eq!(storage.content_sources(en.id).await.unwrap(), vec![news_id]);

        assert_eq!(
            storage.current_status(WorkItemKind::Keyword, kw).await.unwrap(),
            Some(Status::Published)
        );
    }

    #[tokio::test]
    async fn single_commit_pairs_with_existing_record() {
        let storage = test_storage().await;
        let first = storage
            .commit_content(&ContentCommit {
                documents: vec![doc("topic-en", Language::En)],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(
            storage.get_content(first[0]).await.unwrap().unwrap().hreflang_pair_id,
            None
        );

        let second = storage
            .commit_content(&ContentCommit {
                documents: vec![doc("topic-zh", Language::Zh)],
                pair_with: Some(first[0]),
                ..Default::default()
            })
            .await
            .unwrap();

        let en = storage.get_content(first[0]).await.unwrap().unwrap();
        let zh = storage.get_content_by_slug("topic-zh").await.unwrap().unwrap();
        assert_eq!(zh.id, second[0]);
        assert_eq!(en.hreflang_pair_id, Some(zh.id));
        assert_eq!(zh.hreflang_pair_id, Some(en.id));
    }

    #[tokio::test]
    async fn duplicate_slug_rolls_back_whole_commit() {
        let storage = test_storage().await;
        storage
            .commit_content(&ContentCommit {
                documents: vec![doc("taken-en", Language::En)],
                ..Default::default()
            })
            .await
            .unwrap();

        let kw = writing_keyword(&storage, "taken").await;
        let result = storage
            .commit_content(&ContentCommit {
                documents: vec![doc("fresh-zh", Language::Zh), doc("taken-en", Language::En)],
                pair_with: None,
                source_news_ids: vec![],
                resolves: Some(ItemRef::new(WorkItemKind::Keyword, kw)),
            })
            .await;
        assert!(result.is_err());

        // Nothing from the failed commit is visible.
        assert!(storage.get_content_by_slug("fresh-zh").await.unwrap().is_none());
        assert_eq!(
            storage.current_status(WorkItemKind::Keyword, kw).await.unwrap(),
            Some(Status::Writing)
        );
        assert_eq!(storage.content_keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resolve_requires_writing_status() {
        let storage = test_storage().await;
        let kw = writing_keyword(&storage, "embedding").await;
        storage
            .transition_status(WorkItemKind::Keyword, kw, Some(Status::Writing), Status::Error)
            .await
            .unwrap();

        let err = storage
            .commit_content(&ContentCommit {
                documents: vec![doc("embedding-en", Language::En)],
                resolves: Some(ItemRef::new(WorkItemKind::Keyword, kw)),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PressworkError::InvalidTransition { .. }));
        assert!(storage.get_content_by_slug("embedding-en").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn research_and_topic_index() {
        let storage = test_storage().await;
        let id = storage.insert_research("Claude 5 launch").await.unwrap();
        storage.set_research_report(id, "report text").await.unwrap();
        storage.set_research_narrative(id, "{\"title\":\"x\"}").await.unwrap();

        let research = storage.get_research(id).await.unwrap().unwrap();
        assert_eq!(research.topic, "Claude 5 launch");
        assert_eq!(research.research_report.as_deref(), Some("report text"));
        assert!(research.core_narrative.is_some());

        let mut entry = TopicIndexEntry {
            topic_slug: "claude-5-launch".into(),
            title: "Claude 5 launch".into(),
            status: "partial".into(),
            research_id: Some(id),
            en_content_id: None,
            zh_content_id: None,
        };
        storage.upsert_topic_index(&entry).await.unwrap();
        entry.status = "published".into();
        storage.upsert_topic_index(&entry).await.unwrap();
        assert_eq!(
            storage.topic_status("claude-5-launch").await.unwrap().as_deref(),
            Some("published")
        );
    }

    #[tokio::test]
    async fn content_updates_resolve_signals_atomically() {
        let storage = test_storage().await;
        let news_id = storage
            .upsert_work_item(&NewWorkItem::News(NewNewsItem {
                news_key: "n2".into(),
                url: "https://news.test/2".into(),
                title: "Agents everywhere".into(),
                source: "wire".into(),
                source_tier: None,
                category: None,
                score: 1.0,
                summary: None,
                detected_at: Utc::now(),
            }))
            .await
            .unwrap()
            .unwrap();
        let signal = storage
            .upsert_work_item(&NewWorkItem::Freshness(NewFreshnessSignal {
                content_slug: "agents".into(),
                content_type: ContentKind::Blog,
                news_item_id: news_id,
                match_score: 3,
            }))
            .await
            .unwrap()
            .unwrap();

        let updates = [
            ContentUpdate {
                content_slug: "agents".into(),
                language: Language::En,
                section: "New agent releases.".into(),
            },
            ContentUpdate {
                content_slug: "agents".into(),
                language: Language::Zh,
                section: "新的智能体发布。".into(),
            },
        ];

        // Still `detected`: the guard rejects and nothing is appended.
        assert!(storage.record_content_updates(&updates, &[signal]).await.is_err());
        assert_eq!(storage.content_update_count("agents").await.unwrap(), 0);

        storage
            .transition_status(WorkItemKind::Freshness, signal, Some(Status::Detected), Status::Writing)
            .await
            .unwrap();
        let ids = storage.record_content_updates(&updates, &[signal]).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(storage.content_update_count("agents").await.unwrap(), 2);
        assert_eq!(
            storage.current_status(WorkItemKind::Freshness, signal).await.unwrap(),
            Some(Status::Published)
        );
    }
}
