//! SQL migration definitions for the catalog database.
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
        description: "Initial schema: spirits, crawl_runs, spirit_index (FTS5)",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Canonical catalog entries. `seq` records first-insertion order and
-- survives upserts; it is also the rowid of the matching index row.
CREATE TABLE IF NOT EXISTS spirits (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    id          TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    distiller   TEXT NOT NULL,
    bottler     TEXT NOT NULL,
    type        TEXT NOT NULL,
    abv         REAL NOT NULL,
    age         TEXT NOT NULL,
    description TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- Per-category crawl history
CREATE TABLE IF NOT EXISTS crawl_runs (
    id          TEXT PRIMARY KEY,
    category    TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    status      TEXT NOT NULL DEFAULT 'running',
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_runs_category ON crawl_runs(category);

-- Derived full-text index over the searchable fields. Maintained explicitly
-- by the indexer, never by triggers: it can always be rebuilt from `spirits`.
CREATE VIRTUAL TABLE IF NOT EXISTS spirit_index USING fts5(
    id UNINDEXED,
    name,
    distiller,
    bottler,
    type,
    tokenize = 'unicode61 remove_diacritics 2'
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
