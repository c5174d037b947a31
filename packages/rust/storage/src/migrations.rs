//! SQL migration definitions for the Presswork work-item store.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: work items, content, research, topic index, updates",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- News items (immutable once inserted)
CREATE TABLE IF NOT EXISTS news_items (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    news_key    TEXT NOT NULL UNIQUE,
    url         TEXT NOT NULL UNIQUE,
    title       TEXT NOT NULL,
    source      TEXT NOT NULL,
    source_tier INTEGER,
    category    TEXT,
    score       REAL NOT NULL DEFAULT 0,
    summary     TEXT,
    detected_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_news_detected_at ON news_items(detected_at);

-- Keyword backlog
CREATE TABLE IF NOT EXISTS keywords (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    keyword            TEXT NOT NULL,
    keyword_zh         TEXT,
    language           TEXT NOT NULL DEFAULT 'en',
    content_type       TEXT NOT NULL,
    category           TEXT,
    score              REAL NOT NULL DEFAULT 0,
    search_volume      INTEGER,
    difficulty         INTEGER,
    search_intent      TEXT,
    status             TEXT NOT NULL DEFAULT 'backlog',
    content_id         INTEGER REFERENCES content(id),
    parent_research_id INTEGER REFERENCES research(id),
    extraction_batch   TEXT,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL,
    UNIQUE(keyword, language)
);

CREATE INDEX IF NOT EXISTS idx_keywords_status ON keywords(status, score);
CREATE INDEX IF NOT EXISTS idx_keywords_batch ON keywords(extraction_batch);

-- PAA question backlog
CREATE TABLE IF NOT EXISTS paa_questions (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    question       TEXT NOT NULL UNIQUE,
    question_zh    TEXT,
    source_keyword TEXT,
    source_query   TEXT,
    result_count   INTEGER NOT NULL DEFAULT 0,
    status         TEXT NOT NULL DEFAULT 'discovered',
    content_id     INTEGER REFERENCES content(id),
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_paa_status ON paa_questions(status, result_count);

-- Freshness signals (news matched against published documents)
CREATE TABLE IF NOT EXISTS freshness_signals (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    content_slug TEXT NOT NULL,
    content_type TEXT NOT NULL,
    news_item_id INTEGER NOT NULL REFERENCES news_items(id),
    match_score  INTEGER NOT NULL DEFAULT 0,
    status       TEXT NOT NULL DEFAULT 'detected',
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    UNIQUE(content_slug, news_item_id)
);

CREATE INDEX IF NOT EXISTS idx_freshness_status ON freshness_signals(status, match_score);

-- Published documents (never deleted)
CREATE TABLE IF NOT EXISTS content (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    type             TEXT NOT NULL,
    title            TEXT NOT NULL,
    slug             TEXT NOT NULL UNIQUE,
    body             TEXT NOT NULL,
    language         TEXT NOT NULL,
    status           TEXT NOT NULL DEFAULT 'draft',
    hreflang_pair_id INTEGER REFERENCES content(id),
    seo_score        REAL,
    research_id      INTEGER REFERENCES research(id),
    content_hash     TEXT NOT NULL,
    published_at     TEXT,
    created_at       TEXT NOT NULL
);

-- Provenance: content <-> news items
CREATE TABLE IF NOT EXISTS content_sources (
    content_id   INTEGER NOT NULL REFERENCES content(id),
    news_item_id INTEGER NOT NULL REFERENCES news_items(id),
    PRIMARY KEY (content_id, news_item_id)
);

-- Research and narrative blobs per topic
CREATE TABLE IF NOT EXISTS research (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    topic           TEXT NOT NULL,
    research_report TEXT,
    core_narrative  TEXT,
    created_at      TEXT NOT NULL
);

-- Topic pipeline outcomes
CREATE TABLE IF NOT EXISTS topic_index (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    topic_slug    TEXT NOT NULL UNIQUE,
    title         TEXT NOT NULL,
    status        TEXT NOT NULL,
    research_id   INTEGER REFERENCES research(id),
    en_content_id INTEGER REFERENCES content(id),
    zh_content_id INTEGER REFERENCES content(id),
    updated_at    TEXT NOT NULL
);

-- Append-only log of update sections added to published documents
CREATE TABLE IF NOT EXISTS content_updates (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    content_slug TEXT NOT NULL,
    language     TEXT NOT NULL,
    section      TEXT NOT NULL,
    signal_ids   TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_content_updates_slug ON content_updates(content_slug);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
