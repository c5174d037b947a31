//! Work-item operations: idempotent insert, guarded status transitions,
//! backlog queries, and operator helpers.

use chrono::{DateTime, Utc};
use libsql::params;
use tracing::{debug, instrument, warn};

use presswork_shared::{
    FreshnessSignal, ItemRef, Keyword, NewWorkItem, NewsItem, PaaQuestion, PressworkError,
    Result, Status, WorkItem, WorkItemKind,
};

use crate::{Storage, get_f64, get_i64, get_parsed, get_string, now_ts, parse_ts, storage_err};

const NEWS_COLS: &str =
    "id, news_key, url, title, source, source_tier, category, score, summary, detected_at";
const KEYWORD_COLS: &str = "id, keyword, keyword_zh, language, content_type, category, score, \
     search_volume, difficulty, parent_research_id, extraction_batch, status, content_id";
const PAA_COLS: &str =
    "id, question, question_zh, source_keyword, source_query, result_count, status, content_id";
const FRESHNESS_COLS: &str = "id, content_slug, content_type, news_item_id, match_score, status";

/// An item left in `writing` by an earlier run.
#[derive(Debug, Clone)]
pub struct StuckItem {
    pub item: ItemRef,
    pub label: String,
    /// When the item entered `writing`.
    pub since: String,
}

impl Storage {
    // -----------------------------------------------------------------------
    // Insert
    // -----------------------------------------------------------------------

    /// Insert a work item, ignoring it if its natural key already exists.
    ///
    /// Returns the new row id, or `None` when the insert was a no-op.
    pub async fn upsert_work_item(&self, item: &NewWorkItem) -> Result<Option<i64>> {
        self.check_writable()?;
        let now = now_ts();

        let changed = match item {
            NewWorkItem::News(n) => {
                self.conn
                    .execute(
                        "INSERT OR IGNORE INTO news_items
                           (news_key, url, title, source, source_tier, category, score, summary, detected_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        params![
                            n.news_key.as_str(),
                            n.url.as_str(),
                            n.title.as_str(),
                            n.source.as_str(),
                            n.source_tier,
                            n.category.as_deref(),
                            n.score,
                            n.summary.as_deref(),
                            n.detected_at.to_rfc3339(),
                        ],
                    )
                    .await
            }
            NewWorkItem::Keyword(k) => {
                self.conn
                    .execute(
                        "INSERT OR IGNORE INTO keywords
                           (keyword, keyword_zh, language, content_type, category, score,
                            search_intent, parent_research_id, extraction_batch, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                        params![
                            k.keyword.as_str(),
                            k.keyword_zh.as_deref(),
                            k.language.code(),
                            k.content_type.as_str(),
                            k.category.as_deref(),
                            k.score,
                            k.search_intent.as_deref(),
                            k.parent_research_id,
                            k.extraction_batch.as_deref(),
                            now.as_str(),
                        ],
                    )
                    .await
            }
            NewWorkItem::Paa(p) => {
                self.conn
                    .execute(
                        "INSERT OR IGNORE INTO paa_questions
                           (question, question_zh, source_keyword, source_query, result_count,
                            created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                        params![
                            p.question.as_str(),
                            p.question_zh.as_deref(),
                            p.source_keyword.as_deref(),
                            p.source_query.as_deref(),
                            p.result_count,
                            now.as_str(),
                        ],
                    )
                    .await
            }
            NewWorkItem::Freshness(f) => {
                self.conn
                    .execute(
                        "INSERT OR IGNORE INTO freshness_signals
                           (content_slug, content_type, news_item_id, match_score, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                        params![
                            f.content_slug.as_str(),
                            f.content_type.as_str(),
                            f.news_item_id,
                            f.match_score,
                            now.as_str(),
                        ],
                    )
                    .await
            }
        }
        .map_err(storage_err)?;

        if changed == 0 {
            debug!(kind = %item.kind(), key = %item.natural_key(), "natural key exists, insert ignored");
            return Ok(None);
        }
        Ok(Some(self.conn.last_insert_rowid()))
    }

    // -----------------------------------------------------------------------
    // Status transitions
    // -----------------------------------------------------------------------

    /// Move a work item to `to`.
    ///
    /// With `from` supplied the update is guarded: it only applies when the
    /// current status equals `from` and `from -> to` is a lifecycle edge.
    /// Without `from` it applies unconditionally, provided `to` belongs to the
    /// kind's status domain.
    #[instrument(skip_all, fields(kind = %kind, id = id, to = %to))]
    pub async fn transition_status(
        &self,
        kind: WorkItemKind,
        id: i64,
        from: Option<Status>,
        to: Status,
    ) -> Result<()> {
        self.check_writable()?;

        if !kind.accepts(to) {
            return Err(PressworkError::invalid_transition(
                kind,
                id,
                format!("a {kind} status"),
                Some(to),
            ));
        }

        let now = now_ts();
        match from {
            Some(from) => {
                if !from.can_transition_to(to) {
                    return Err(PressworkError::invalid_transition(
                        kind,
                        id,
                        format!("a legal edge {from} -> {to}"),
                        Some(from),
                    ));
                }
                let sql = format!(
                    "UPDATE {} SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                    kind.table()
                );
                let changed = self
                    .conn
                    .execute(&sql, params![to.as_str(), now.as_str(), id, from.as_str()])
                    .await
                    .map_err(storage_err)?;

                if changed == 0 {
                    return match self.current_status(kind, id).await? {
                        Some(actual) => Err(PressworkError::invalid_transition(
                            kind,
                            id,
                            from,
                            Some(actual),
                        )),
                        None => Err(PressworkError::NotFound {
                            kind: kind.to_string(),
                            id,
                        }),
                    };
                }
            }
            None => {
                let sql = format!(
                    "UPDATE {} SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    kind.table()
                );
                let changed = self
                    .conn
                    .execute(&sql, params![to.as_str(), now.as_str(), id])
                    .await
                    .map_err(storage_err)?;
                if changed == 0 {
                    return Err(PressworkError::NotFound {
                        kind: kind.to_string(),
                        id,
                    });
                }
            }
        }

        debug!(from = ?from, "status transitioned");
        Ok(())
    }

    /// Current status of a mutable work item, or `None` if it does not exist.
    pub async fn current_status(&self, kind: WorkItemKind, id: i64) -> Result<Option<Status>> {
        if kind == WorkItemKind::News {
            return Ok(None);
        }
        let sql = format!("SELECT status FROM {} WHERE id = ?1", kind.table());
        let mut rows = self.conn.query(&sql, params![id]).await.map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(get_parsed(&row, 0)?)),
            None => Ok(None),
        }
    }

    /// Explicitly put an item back into its initial status.
    ///
    /// This is the only path from a terminal status (or a stuck `writing`)
    /// back to the backlog; pipelines never call it.
    pub async fn requeue(&self, kind: WorkItemKind, id: i64) -> Result<Status> {
        self.check_writable()?;
        let initial = kind.initial_status().ok_or_else(|| {
            PressworkError::invalid_transition(kind, id, "a mutable work item", None)
        })?;
        let previous = self.current_status(kind, id).await?.ok_or_else(|| {
            PressworkError::NotFound {
                kind: kind.to_string(),
                id,
            }
        })?;

        self.transition_status(kind, id, None, initial).await?;
        warn!(%kind, id, %previous, to = %initial, "work item requeued by operator");
        Ok(previous)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Items in the kind's initial status ordered by score desc, id asc.
    ///
    /// News items have no status; every news item is a candidate.
    /// `extraction_batch` restricts keywords to one extraction call.
    pub async fn query_backlog(
        &self,
        kind: WorkItemKind,
        limit: usize,
        min_score: Option<f64>,
        extraction_batch: Option<&str>,
    ) -> Result<Vec<WorkItem>> {
        let min_score = min_score.unwrap_or(f64::MIN);
        let limit = limit as i64;

        let mut rows = match kind {
            WorkItemKind::News => {
                let sql = format!(
                    "SELECT {NEWS_COLS} FROM news_items
                     WHERE score >= ?1 ORDER BY score DESC, id ASC LIMIT ?2"
                );
                self.conn.query(&sql, params![min_score, limit]).await
            }
            WorkItemKind::Keyword => {
                let sql = format!(
                    "SELECT {KEYWORD_COLS} FROM keywords
                     WHERE status = 'backlog' AND score >= ?1
                       AND (?2 IS NULL OR extraction_batch = ?2)
                     ORDER BY score DESC, id ASC LIMIT ?3"
                );
                self.conn
                    .query(&sql, params![min_score, extraction_batch, limit])
                    .await
            }
            WorkItemKind::Paa => {
                let sql = format!(
                    "SELECT {PAA_COLS} FROM paa_questions
                     WHERE status = 'discovered' AND result_count >= ?1
                     ORDER BY result_count DESC, id ASC LIMIT ?2"
                );
                self.conn.query(&sql, params![min_score, limit]).await
            }
            WorkItemKind::Freshness => {
                let sql = format!(
                    "SELECT {FRESHNESS_COLS} FROM freshness_signals
                     WHERE status = 'detected' AND match_score >= ?1
                     ORDER BY match_score DESC, id ASC LIMIT ?2"
                );
                self.conn.query(&sql, params![min_score, limit]).await
            }
        }
        .map_err(storage_err)?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            items.push(row_to_work_item(kind, &row)?);
        }
        Ok(items)
    }

    /// Fetch one work item by id.
    pub async fn get_work_item(&self, kind: WorkItemKind, id: i64) -> Result<Option<WorkItem>> {
        let cols = match kind {
            WorkItemKind::News => NEWS_COLS,
            WorkItemKind::Keyword => KEYWORD_COLS,
            WorkItemKind::Paa => PAA_COLS,
            WorkItemKind::Freshness => FRESHNESS_COLS,
        };
        let sql = format!("SELECT {cols} FROM {} WHERE id = ?1", kind.table());
        let mut rows = self.conn.query(&sql, params![id]).await.map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_work_item(kind, &row)?)),
            None => Ok(None),
        }
    }

    /// News detected at or after `since`, best first.
    pub async fn recent_news(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<NewsItem>> {
        let sql = format!(
            "SELECT {NEWS_COLS} FROM news_items
             WHERE detected_at >= ?1 ORDER BY score DESC, id ASC LIMIT ?2"
        );
        let mut rows = self
            .conn
            .query(&sql, params![since.to_rfc3339(), limit as i64])
            .await
            .map_err(storage_err)?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            items.push(row_to_news(&row)?);
        }
        Ok(items)
    }

    /// Items currently in `writing`, across all mutable kinds.
    pub async fn stuck_writing(&self) -> Result<Vec<StuckItem>> {
        let mut stuck = Vec::new();
        for (kind, label_col) in [
            (WorkItemKind::Keyword, "keyword"),
            (WorkItemKind::Paa, "question"),
            (WorkItemKind::Freshness, "content_slug"),
        ] {
            let sql = format!(
                "SELECT id, {label_col}, updated_at FROM {} WHERE status = 'writing' ORDER BY id",
                kind.table()
            );
            let mut rows = self.conn.query(&sql, params![]).await.map_err(storage_err)?;
            while let Some(row) = rows.next().await.map_err(storage_err)? {
                stuck.push(StuckItem {
                    item: ItemRef::new(kind, get_i64(&row, 0)?),
                    label: get_string(&row, 1)?,
                    since: get_string(&row, 2)?,
                });
            }
        }
        Ok(stuck)
    }

    /// Count of items per status for one kind (`total` for news).
    pub async fn status_counts(&self, kind: WorkItemKind) -> Result<Vec<(String, i64)>> {
        let sql = match kind {
            WorkItemKind::News => "SELECT 'total', COUNT(*) FROM news_items".to_string(),
            _ => format!(
                "SELECT status, COUNT(*) FROM {} GROUP BY status ORDER BY status",
                kind.table()
            ),
        };
        let mut rows = self.conn.query(&sql, params![]).await.map_err(storage_err)?;
        let mut counts = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            counts.push((get_string(&row, 0)?, get_i64(&row, 1)?));
        }
        Ok(counts)
    }

    // -----------------------------------------------------------------------
    // Keyword demand
    // -----------------------------------------------------------------------

    /// Backlog keywords that have not been through demand enrichment yet.
    pub async fn keywords_missing_demand(&self, limit: usize) -> Result<Vec<Keyword>> {
        let sql = format!(
            "SELECT {KEYWORD_COLS} FROM keywords
             WHERE status = 'backlog' AND search_volume IS NULL
             ORDER BY score DESC, id ASC LIMIT ?1"
        );
        let mut rows = self
            .conn
            .query(&sql, params![limit as i64])
            .await
            .map_err(storage_err)?;

        let mut keywords = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            keywords.push(row_to_keyword(&row)?);
        }
        Ok(keywords)
    }

    /// Record demand proxies for a keyword.
    pub async fn set_keyword_demand(&self, id: i64, volume: i64, difficulty: i64) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE keywords SET search_volume = ?1, difficulty = ?2, updated_at = ?3 WHERE id = ?4",
                params![volume, difficulty, now_ts(), id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

fn row_to_work_item(kind: WorkItemKind, row: &libsql::Row) -> Result<WorkItem> {
    Ok(match kind {
        WorkItemKind::News => WorkItem::News(row_to_news(row)?),
        WorkItemKind::Keyword => WorkItem::Keyword(row_to_keyword(row)?),
        WorkItemKind::Paa => WorkItem::Paa(row_to_paa(row)?),
        WorkItemKind::Freshness => WorkItem::Freshness(row_to_freshness(row)?),
    })
}

fn row_to_news(row: &libsql::Row) -> Result<NewsItem> {
    Ok(NewsItem {
        id: get_i64(row, 0)?,
        news_key: get_string(row, 1)?,
        url: get_string(row, 2)?,
        title: get_string(row, 3)?,
        source: get_string(row, 4)?,
        source_tier: row.get::<i64>(5).ok(),
        category: row.get::<String>(6).ok(),
        score: get_f64(row, 7)?,
        summary: row.get::<String>(8).ok(),
        detected_at: parse_ts(&get_string(row, 9)?)?,
    })
}

fn row_to_keyword(row: &libsql::Row) -> Result<Keyword> {
    Ok(Keyword {
        id: get_i64(row, 0)?,
        keyword: get_string(row, 1)?,
        keyword_zh: row.get::<String>(2).ok(),
        language: get_parsed(row, 3)?,
        content_type: get_parsed(row, 4)?,
        category: row.get::<String>(5).ok(),
        score: get_f64(row, 6)?,
        search_volume: row.get::<i64>(7).ok(),
        difficulty: row.get::<i64>(8).ok(),
        parent_research_id: row.get::<i64>(9).ok(),
        extraction_batch: row.get::<String>(10).ok(),
        status: get_parsed(row, 11)?,
        content_id: row.get::<i64>(12).ok(),
    })
}

fn row_to_paa(row: &libsql::Row) -> Result<PaaQuestion> {
    Ok(PaaQuestion {
        id: get_i64(row, 0)?,
        question: get_string(row, 1)?,
        question_zh: row.get::<String>(2).ok(),
        source_keyword: row.get::<String>(3).ok(),
        source_query: row.get::<String>(4).ok(),
        result_count: get_i64(row, 5)?,
        status: get_parsed(row, 6)?,
        content_id: row.get::<i64>(7).ok(),
    })
}

fn row_to_freshness(row: &libsql::Row) -> Result<FreshnessSignal> {
    Ok(FreshnessSignal {
        id: get_i64(row, 0)?,
        content_slug: get_string(row, 1)?,
        content_type: get_parsed(row, 2)?,
        news_item_id: get_i64(row, 3)?,
        match_score: get_i64(row, 4)?,
        status: get_parsed(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_storage;
    use presswork_shared::{
        ContentKind, Language, NewFreshnessSignal, NewKeyword, NewNewsItem, NewPaaQuestion,
    };

    fn keyword(text: &str, score: f64, category: &str) -> NewWorkItem {
        NewWorkItem::Keyword(NewKeyword {
            keyword: text.into(),
            keyword_zh: None,
            language: Language::En,
            content_type: ContentKind::Glossary,
            category: Some(category.into()),
            score,
            search_intent: None,
            parent_research_id: None,
            extraction_batch: None,
        })
    }

    fn news(url: &str, score: f64) -> NewWorkItem {
        NewWorkItem::News(NewNewsItem {
            news_key: format!("key-{url}"),
            url: url.into(),
            title: format!("Story at {url}"),
            source: "wire".into(),
            source_tier: Some(1),
            category: Some("models".into()),
            score,
            summary: None,
            detected_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_natural_key() {
        let storage = test_storage().await;

        let first = storage
            .upsert_work_item(&keyword("vector database", 50.0, "infra"))
            .await
            .expect("first insert");
        assert!(first.is_some());

        let second = storage
            .upsert_work_item(&keyword("vector database", 99.0, "tools"))
            .await
            .expect("second insert is a no-op");
        assert!(second.is_none());

        let backlog = storage
            .query_backlog(WorkItemKind::Keyword, 10, None, None)
            .await
            .unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].score(), 50.0);

        let n1 = storage.upsert_work_item(&news("https://a.test/1", 5.0)).await.unwrap();
        let n2 = storage.upsert_work_item(&news("https://a.test/1", 5.0)).await.unwrap();
        assert!(n1.is_some());
        assert!(n2.is_none());
    }

    #[tokio::test]
    async fn backlog_orders_by_score_then_id() {
        let storage = test_storage().await;
        for (text, score) in [("a", 10.0), ("b", 30.0), ("c", 30.0), ("d", 20.0)] {
            storage.upsert_work_item(&keyword(text, score, "models")).await.unwrap();
        }

        let backlog = storage
            .query_backlog(WorkItemKind::Keyword, 10, None, None)
            .await
            .unwrap();
        let labels: Vec<String> = backlog.iter().map(|i| i.label()).collect();
        assert_eq!(labels, vec!["b", "c", "d", "a"]);

        let filtered = storage
            .query_backlog(WorkItemKind::Keyword, 10, Some(20.0), None)
            .await
            .unwrap();
        assert_eq!(filtered.len(), 3);
    }

    #[tokio::test]
    async fn guarded_transition_checks_current_status() {
        let storage = test_storage().await;
        let id = storage
            .upsert_work_item(&keyword("agents", 1.0, "applications"))
            .await
            .unwrap()
            .unwrap();

        storage
            .transition_status(WorkItemKind::Keyword, id, Some(Status::Backlog), Status::Writing)
            .await
            .expect("backlog -> writing");

        let err = storage
            .transition_status(WorkItemKind::Keyword, id, Some(Status::Backlog), Status::Writing)
            .await
            .unwrap_err();
        assert!(matches!(err, PressworkError::InvalidTransition { .. }));
        assert!(err.to_string().contains("found writing"));

        storage
            .transition_status(WorkItemKind::Keyword, id, Some(Status::Writing), Status::Published)
            .await
            .expect("writing -> published");

        // Terminal statuses are not left through guarded transitions.
        let err = storage
            .transition_status(WorkItemKind::Keyword, id, Some(Status::Published), Status::Backlog)
            .await
            .unwrap_err();
        assert!(matches!(err, PressworkError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn unguarded_transition_respects_status_domain() {
        let storage = test_storage().await;
        let id = storage
            .upsert_work_item(&NewWorkItem::Paa(NewPaaQuestion {
                question: "Is GPT-5 open source?".into(),
                question_zh: None,
                source_keyword: Some("gpt-5".into()),
                source_query: None,
                result_count: 300,
            }))
            .await
            .unwrap()
            .unwrap();

        storage
            .transition_status(WorkItemKind::Paa, id, None, Status::Error)
            .await
            .expect("unguarded transition");
        assert_eq!(
            storage.current_status(WorkItemKind::Paa, id).await.unwrap(),
            Some(Status::Error)
        );

        let err = storage
            .transition_status(WorkItemKind::Paa, id, None, Status::Backlog)
            .await
            .unwrap_err();
        assert!(matches!(err, PressworkError::InvalidTransition { .. }));

        let missing = storage
            .transition_status(WorkItemKind::Paa, 9999, None, Status::Skipped)
            .await
            .unwrap_err();
        assert!(matches!(missing, PressworkError::NotFound { .. }));
    }

    #[tokio::test]
    async fn news_items_are_immutable() {
        let storage = test_storage().await;
        let id = storage
            .upsert_work_item(&news("https://a.test/n", 1.0))
            .await
            .unwrap()
            .unwrap();
        let err = storage
            .transition_status(WorkItemKind::News, id, None, Status::Published)
            .await
            .unwrap_err();
        assert!(matches!(err, PressworkError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn stuck_and_requeue() {
        let storage = test_storage().await;
        let id = storage
            .upsert_work_item(&keyword("long context", 3.0, "models"))
            .await
            .unwrap()
            .unwrap();
        storage
            .transition_status(WorkItemKind::Keyword, id, Some(Status::Backlog), Status::Writing)
            .await
            .unwrap();

        let stuck = storage.stuck_writing().await.unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].item, ItemRef::new(WorkItemKind::Keyword, id));
        assert_eq!(stuck[0].label, "long context");

        let previous = storage.requeue(WorkItemKind::Keyword, id).await.unwrap();
        assert_eq!(previous, Status::Writing);
        assert!(storage.stuck_writing().await.unwrap().is_empty());
        assert_eq!(
            storage.current_status(WorkItemKind::Keyword, id).await.unwrap(),
            Some(Status::Backlog)
        );
    }

    #[tokio::test]
    async fn extraction_batch_filter_and_demand() {
        let storage = test_storage().await;
        let mut batched = keyword("fine-tuning", 8.0, "tools");
        if let NewWorkItem::Keyword(k) = &mut batched {
            k.extraction_batch = Some("batch-1".into());
        }
        storage.upsert_work_item(&batched).await.unwrap();
        storage.upsert_work_item(&keyword("quantization", 9.0, "infra")).await.unwrap();

        let only_batch = storage
            .query_backlog(WorkItemKind::Keyword, 10, None, Some("batch-1"))
            .await
            .unwrap();
        assert_eq!(only_batch.len(), 1);
        assert_eq!(only_batch[0].label(), "fine-tuning");

        let missing = storage.keywords_missing_demand(10).await.unwrap();
        assert_eq!(missing.len(), 2);
        storage.set_keyword_demand(missing[0].id, 60, 40).await.unwrap();
        assert_eq!(storage.keywords_missing_demand(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn freshness_signal_key_and_counts() {
        let storage = test_storage().await;
        let news_id = storage
            .upsert_work_item(&news("https://a.test/f", 2.0))
            .await
            .unwrap()
            .unwrap();
        let signal = NewWorkItem::Freshness(NewFreshnessSignal {
            content_slug: "what-is-rag".into(),
            content_type: ContentKind::Blog,
            news_item_id: news_id,
            match_score: 3,
        });
        assert!(storage.upsert_work_item(&signal).await.unwrap().is_some());
        assert!(storage.upsert_work_item(&signal).await.unwrap().is_none());

        let counts = storage.status_counts(WorkItemKind::Freshness).await.unwrap();
        assert_eq!(counts, vec![("detected".to_string(), 1)]);

        let recent = storage
            .recent_news(Utc::now() - chrono::Duration::hours(1), 10)
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
    }
}
