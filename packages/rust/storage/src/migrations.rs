//! SQL migration definitions for the Newswatch database.
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
    vec![
        Migration {
            version: 1,
            description: "Initial schema: sources, title_memory",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Accepted articles
CREATE TABLE IF NOT EXISTS sources (
    id                       INTEGER PRIMARY KEY AUTOINCREMENT,
    title                    TEXT NOT NULL,
    link                     TEXT NOT NULL UNIQUE,
    date                     TEXT NOT NULL,
    summary                  TEXT NOT NULL DEFAULT '',
    importance_bool          INTEGER NOT NULL DEFAULT 0,
    importance_reasoning     TEXT NOT NULL DEFAULT '',
    processed                INTEGER NOT NULL DEFAULT 0,
    relevant_per_human_check TEXT NOT NULL DEFAULT 'maybe',
    created_at               TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sources_upper_title ON sources(UPPER(title));
CREATE INDEX IF NOT EXISTS idx_sources_queue ON sources(processed, date);

-- Fuzzy-dedup corpus, append-only
CREATE TABLE IF NOT EXISTS title_memory (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    original_title TEXT NOT NULL,
    cleaned_title  TEXT NOT NULL UNIQUE,
    link           TEXT NOT NULL,
    first_seen_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_title_memory_seen ON title_memory(first_seen_at);
CREATE INDEX IF NOT EXISTS idx_title_memory_link ON title_memory(link);
CREATE INDEX IF NOT EXISTS idx_title_memory_upper_original ON title_memory(UPPER(original_title));

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Record which ingestion source produced each article",
            sql: r#"
ALTER TABLE sources ADD COLUMN origin TEXT;

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
        Migration {
            version: 3,
            description: "Unicode case-folded title keys for exact matching",
            sql: r#"
-- Filled from Rust on insert; existing rows are backfilled on open.
ALTER TABLE sources ADD COLUMN title_key TEXT;
ALTER TABLE title_memory ADD COLUMN original_title_key TEXT;

DROP INDEX IF EXISTS idx_sources_upper_title;
DROP INDEX IF EXISTS idx_title_memory_upper_original;
CREATE INDEX IF NOT EXISTS idx_sources_title_key ON sources(title_key);
CREATE INDEX IF NOT EXISTS idx_title_memory_original_key ON title_memory(original_title_key);

INSERT INTO schema_migrations (version) VALUES (3);
"#,
        },
    ]
}
