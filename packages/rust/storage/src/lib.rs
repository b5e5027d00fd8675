//! libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding the durable article
//! store (`sources`) and the fuzzy-dedup corpus (`title_memory`).
//!
//! **Access rules:**
//! - Ingestion runs and triage writes: read-write via [`Storage::open`]
//! - `stats` and other inspection commands: read-only via [`Storage::open_readonly`]
//!
//! Several ingestion processes may write the same file at once. Correctness
//! relies on the `UNIQUE` constraints (`sources.link`,
//! `title_memory.cleaned_title`) together with conflict-ignoring inserts.

mod migrations;

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, params};
use newswatch_shared::{
    NewSource, NewswatchError, Relevance, Result, SourceRecord, TitleMemoryEntry, title_key,
};

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Row counts reported by `newswatch stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub sources: u64,
    pub unprocessed: u64,
    pub important: u64,
    pub relevant: u64,
    pub remembered_titles: u64,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NewswatchError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.set_busy_timeout().await?;
        storage.run_migrations().await?;
        storage.backfill_title_keys().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NewswatchError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: true,
        };
        storage.set_busy_timeout().await?;
        Ok(storage)
    }

    async fn set_busy_timeout(&self) -> Result<()> {
        // PRAGMA busy_timeout echoes the new value back as a row.
        self.conn
            .query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"), params![])
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        NewswatchError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Fill `title_key` / `original_title_key` for rows written before those
    /// columns existed.
    async fn backfill_title_keys(&self) -> Result<()> {
        for (table, key_col, title_col) in [
            ("sources", "title_key", "title"),
            ("title_memory", "original_title_key", "original_title"),
        ] {
            let mut rows = self
                .conn
                .query(
                    &format!("SELECT id, {title_col} FROM {table} WHERE {key_col} IS NULL"),
                    params![],
                )
                .await
                .map_err(db_err)?;

            let mut pending = Vec::new();
            while let Some(row) = rows.next().await.map_err(db_err)? {
                let id = row.get::<i64>(0).map_err(db_err)?;
                let title = row.get::<String>(1).map_err(db_err)?;
                pending.push((id, title_key(&title)));
            }
            if pending.is_empty() {
                continue;
            }

            tracing::info!(table, rows = pending.len(), "backfilling title keys");
            for (id, key) in pending {
                self.conn
                    .execute(
                        &format!("UPDATE {table} SET {key_col} = ?1 WHERE id = ?2"),
                        params![key.as_str(), id],
                    )
                    .await
                    .map_err(db_err)?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(NewswatchError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Duplicate detection
    // -----------------------------------------------------------------------

    /// Whether `title` (case-insensitively, see [`title_key`]) or `link`
    /// (exactly) is already known, either as an accepted article or as a
    /// remembered candidate.
    pub async fn exact_match_exists(&self, title: &str, link: &str) -> Result<bool> {
        let key = title_key(title);
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM sources WHERE title_key = ?1 OR link = ?2)
                     OR EXISTS(SELECT 1 FROM title_memory
                               WHERE original_title_key = ?1 OR link = ?2)",
                params![key.as_str(), link],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)? != 0),
            None => Ok(false),
        }
    }

    /// Most recent title-memory entries whose cleaned title starts with
    /// `prefix`, newest first, at most `limit` rows.
    ///
    /// Uses a half-open range over the unique `cleaned_title` index rather
    /// than `LIKE`, so the scan stays bounded as the table grows.
    pub async fn recent_titles_with_prefix(
        &self,
        prefix: &str,
        limit: u32,
    ) -> Result<Vec<TitleMemoryEntry>> {
        let upper = format!("{prefix}\u{10FFFF}");
        let mut rows = self
            .conn
            .query(
                "SELECT id, original_title, cleaned_title, link, first_seen_at
                 FROM title_memory
                 WHERE cleaned_title >= ?1 AND cleaned_title < ?2
                 ORDER BY first_seen_at DESC, id DESC
                 LIMIT ?3",
                params![prefix, upper.as_str(), i64::from(limit)],
            )
            .await
            .map_err(db_err)?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            entries.push(row_to_memory_entry(&row)?);
        }
        Ok(entries)
    }

    /// Append a title to the dedup corpus. Returns `false` if an entry with
    /// the same cleaned title already existed (the existing row is kept).
    pub async fn remember_title(
        &self,
        original_title: &str,
        cleaned_title: &str,
        link: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.check_writable()?;
        let seen = format_ts(seen_at);
        let inserted = self
            .conn
            .execute(
                "INSERT INTO title_memory
                     (original_title, original_title_key, cleaned_title, link, first_seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(cleaned_title) DO NOTHING",
                params![
                    original_title,
                    title_key(original_title),
                    cleaned_title,
                    link,
                    seen.as_str()
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(inserted > 0)
    }

    // -----------------------------------------------------------------------
    // Sources
    // -----------------------------------------------------------------------

    /// Persist an accepted article. Returns `false` if the link was already
    /// stored, possibly by a concurrent ingestion run.
    pub async fn insert_source(&self, source: &NewSource) -> Result<bool> {
        self.check_writable()?;
        let date = format_ts(source.date);
        let now = format_ts(Utc::now());
        let inserted = self
            .conn
            .execute(
                "INSERT INTO sources
                     (title, link, date, summary, importance_bool, importance_reasoning,
                      origin, created_at, title_key)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(link) DO NOTHING",
                params![
                    source.title.as_str(),
                    source.link.as_str(),
                    date.as_str(),
                    source.summary.as_str(),
                    i64::from(source.importance),
                    source.importance_reasoning.as_str(),
                    source.origin.as_deref(),
                    now.as_str(),
                    title_key(&source.title)
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(inserted > 0)
    }

    /// Get a source by ID.
    pub async fn get_source(&self, id: i64) -> Result<Option<SourceRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_source(&row)?)),
            None => Ok(None),
        }
    }

    /// Get a source by its link.
    pub async fn get_source_by_link(&self, link: &str) -> Result<Option<SourceRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE link = ?1"),
                params![link],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_source(&row)?)),
            None => Ok(None),
        }
    }

    /// Unprocessed sources, oldest first.
    pub async fn list_unprocessed(&self, limit: Option<u32>) -> Result<Vec<SourceRecord>> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map(i64::from).unwrap_or(-1);
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {SOURCE_COLUMNS} FROM sources
                     WHERE processed = 0
                     ORDER BY date ASC, id ASC
                     LIMIT ?1"
                ),
                params![limit],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_source(&row)?);
        }
        Ok(results)
    }

    /// Set the processed flag. Returns `false` if no such source exists.
    pub async fn set_processed(&self, id: i64, processed: bool) -> Result<bool> {
        self.check_writable()?;
        let updated = self
            .conn
            .execute(
                "UPDATE sources SET processed = ?1 WHERE id = ?2",
                params![i64::from(processed), id],
            )
            .await
            .map_err(db_err)?;
        Ok(updated > 0)
    }

    /// Record the human relevance verdict. Returns `false` if no such source exists.
    pub async fn set_relevance(&self, id: i64, relevance: Relevance) -> Result<bool> {
        self.check_writable()?;
        let updated = self
            .conn
            .execute(
                "UPDATE sources SET relevant_per_human_check = ?1 WHERE id = ?2",
                params![relevance.as_str(), id],
            )
            .await
            .map_err(db_err)?;
        Ok(updated > 0)
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub async fn stats(&self) -> Result<StoreStats> {
        let mut rows = self
            .conn
            .query(
                "SELECT
                     (SELECT COUNT(*) FROM sources),
                     (SELECT COUNT(*) FROM sources WHERE processed = 0),
                     (SELECT COUNT(*) FROM sources WHERE importance_bool != 0),
                     (SELECT COUNT(*) FROM sources WHERE relevant_per_human_check = 'yes'),
                     (SELECT COUNT(*) FROM title_memory)",
                params![],
            )
            .await
            .map_err(db_err)?;

        let Some(row) = rows.next().await.map_err(db_err)? else {
            return Ok(StoreStats::default());
        };
        let count = |i: i32| -> Result<u64> {
            Ok(row.get::<i64>(i).map_err(db_err)?.max(0) as u64)
        };
        Ok(StoreStats {
            sources: count(0)?,
            unprocessed: count(1)?,
            important: count(2)?,
            relevant: count(3)?,
            remembered_titles: count(4)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Ingestion-path store seam
// ---------------------------------------------------------------------------

/// The store operations ingestion needs: duplicate lookups, the title
/// memory, and persisting accepted articles.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn exact_match_exists(&self, title: &str, link: &str) -> Result<bool>;

    async fn recent_titles_with_prefix(
        &self,
        prefix: &str,
        limit: u32,
    ) -> Result<Vec<TitleMemoryEntry>>;

    async fn remember_title(
        &self,
        original_title: &str,
        cleaned_title: &str,
        link: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn insert_source(&self, source: &NewSource) -> Result<bool>;
}

#[async_trait]
impl ArticleStore for Storage {
    async fn exact_match_exists(&self, title: &str, link: &str) -> Result<bool> {
        Storage::exact_match_exists(self, title, link).await
    }

    async fn recent_titles_with_prefix(
        &self,
        prefix: &str,
        limit: u32,
    ) -> Result<Vec<TitleMemoryEntry>> {
        Storage::recent_titles_with_prefix(self, prefix, limit).await
    }

    async fn remember_title(
        &self,
        original_title: &str,
        cleaned_title: &str,
        link: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<bool> {
        Storage::remember_title(self, original_title, cleaned_title, link, seen_at).await
    }

    async fn insert_source(&self, source: &NewSource) -> Result<bool> {
        Storage::insert_source(self, source).await
    }
}

/// Run the store call `fut` under `limit`. Expiry is reported as
/// [`NewswatchError::Storage`] naming `op`.
pub async fn with_timeout<T>(
    op: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        NewswatchError::Storage(format!("{op} timed out after {}ms", limit.as_millis()))
    })?
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const SOURCE_COLUMNS: &str = "id, title, link, date, summary, importance_bool, \
     importance_reasoning, processed, relevant_per_human_check, origin, created_at";

fn db_err(e: libsql::Error) -> NewswatchError {
    NewswatchError::Storage(e.to_string())
}

/// Timestamps are stored as fixed-width RFC 3339 so they sort lexically.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| NewswatchError::Storage(format!("invalid date '{raw}': {e}")))
}

fn row_to_memory_entry(row: &libsql::Row) -> Result<TitleMemoryEntry> {
    Ok(TitleMemoryEntry {
        id: row.get::<i64>(0).map_err(db_err)?,
        original_title: row.get::<String>(1).map_err(db_err)?,
        cleaned_title: row.get::<String>(2).map_err(db_err)?,
        link: row.get::<String>(3).map_err(db_err)?,
        first_seen_at: parse_ts(&row.get::<String>(4).map_err(db_err)?)?,
    })
}

fn row_to_source(row: &libsql::Row) -> Result<SourceRecord> {
    let relevance = row
        .get::<String>(8)
        .map_err(db_err)?
        .parse::<Relevance>()
        .unwrap_or_default();

    Ok(SourceRecord {
        id: row.get::<i64>(0).map_err(db_err)?,
        title: row.get::<String>(1).map_err(db_err)?,
        link: row.get::<String>(2).map_err(db_err)?,
        date: parse_ts(&row.get::<String>(3).map_err(db_err)?)?,
        summary: row.get::<String>(4).map_err(db_err)?,
        importance: row.get::<i64>(5).map_err(db_err)? != 0,
        importance_reasoning: row.get::<String>(6).map_err(db_err)?,
        processed: row.get::<i64>(7).map_err(db_err)? != 0,
        relevance,
        origin: row.get::<Option<String>>(9).map_err(db_err)?,
        created_at: parse_ts(&row.get::<String>(10).map_err(db_err)?)?,
    })
}
