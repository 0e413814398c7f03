use anyhow::{Context, Result};
use sqlx::{
    Pool, Row, Sqlite, Transaction,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

use crate::model::temperature::{self, Checkpoint, TemperatureParams};
use crate::model::{
    ChangeKind, ChangeRecord, EntryKind, LineDelta, PathKind, RevisionCounts, RevisionInfo,
};

use super::SCHEMA_VERSION;
use super::paths::PathRegistry;

/// A change record as stored, with path ids resolved back to strings.
#[derive(Debug, Clone)]
pub struct StoredChangeRecord {
    pub revno: i64,
    pub path: String,
    pub change_kind: ChangeKind,
    pub path_kind: PathKind,
    pub copy_from: Option<(String, i64)>,
    pub lines: LineDelta,
    pub lc_updated: bool,
    pub entry_kind: EntryKind,
}

/// A revision row as stored.
#[derive(Debug, Clone)]
pub struct StoredRevision {
    pub revno: i64,
    pub commit_ts: i64,
    pub author: Option<String>,
    pub message: Option<String>,
    pub counts: RevisionCounts,
}

/// Database abstraction for SQLite operations
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Configure connection options with PRAGMAs applied to every connection
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .pragma("temp_store", "MEMORY")
            .pragma("cache_size", "-64000"); // 64MB cache

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        Ok(Self { pool })
    }

    /// Initialize database schema, returns true if schema was rebuilt
    pub async fn init_schema(&self) -> Result<bool> {
        // Create metadata table first (needed to check version)
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        // Check schema version
        let stored_version: Option<String> =
            sqlx::query("SELECT value FROM metadata WHERE key = 'schema_version'")
                .fetch_optional(&self.pool)
                .await?
                .map(|row| row.get("value"));

        let needs_rebuild = stored_version.as_deref() != Some(SCHEMA_VERSION);

        if needs_rebuild {
            if stored_version.is_some() {
                tracing::warn!(
                    from = stored_version.as_deref().unwrap_or_default(),
                    to = SCHEMA_VERSION,
                    "schema version changed, rebuilding store"
                );
            }
            sqlx::query("DROP TABLE IF EXISTS change_records").execute(&self.pool).await?;
            sqlx::query("DROP TABLE IF EXISTS revisions").execute(&self.pool).await?;
            sqlx::query("DROP TABLE IF EXISTS paths").execute(&self.pool).await?;
            sqlx::query("DROP TABLE IF EXISTS file_activity").execute(&self.pool).await?;
            sqlx::query("DROP TABLE IF EXISTS author_activity").execute(&self.pool).await?;
            sqlx::query("DELETE FROM metadata").execute(&self.pool).await?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS revisions (
                revno INTEGER PRIMARY KEY,
                commit_ts INTEGER NOT NULL,
                author TEXT,
                message TEXT,
                added_count INTEGER NOT NULL DEFAULT 0,
                changed_count INTEGER NOT NULL DEFAULT 0,
                deleted_count INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS paths (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS change_records (
                revno INTEGER NOT NULL,
                path_id INTEGER NOT NULL,
                change_kind TEXT NOT NULL,
                path_kind TEXT NOT NULL,
                copyfrom_path_id INTEGER,
                copyfrom_revno INTEGER,
                lines_added INTEGER NOT NULL,
                lines_deleted INTEGER NOT NULL,
                lc_updated INTEGER NOT NULL,
                entry_kind TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS file_activity (
                path_id INTEGER PRIMARY KEY,
                last_ts INTEGER NOT NULL,
                temperature REAL NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS author_activity (
                author TEXT PRIMARY KEY,
                last_ts INTEGER NOT NULL,
                temperature REAL NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        // One record per (revno, path): Real records come first and Dummy
        // candidates are suppressed before insert, so a violation here is a
        // reconciliation bug, not data.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_change_records_revno_path
             ON change_records (revno, path_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_change_records_revno ON change_records (revno ASC)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_change_records_path ON change_records (path_id ASC)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_change_records_copy_path
             ON change_records (copyfrom_path_id ASC)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_paths_path ON paths (path ASC)")
            .execute(&self.pool)
            .await?;

        // Store current schema version
        if needs_rebuild {
            sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?)")
                .bind(SCHEMA_VERSION)
                .execute(&self.pool)
                .await?;
        }

        Ok(needs_rebuild)
    }

    /// Get metadata value by key
    pub async fn get_metadata(&self, key: &str) -> Option<String> {
        sqlx::query("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .map(|row| row.get("value"))
    }

    /// Set metadata value
    pub async fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Highest fully committed revision, 0 when the store is empty.
    ///
    /// Because every revision commits atomically and in increasing order,
    /// this doubles as the resume checkpoint: a new run starts at the next
    /// revision and never rewrites historic rows.
    pub async fn last_committed_revno(&self) -> Result<i64> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(revno) FROM revisions")
            .fetch_one(&self.pool)
            .await?;
        Ok(max.unwrap_or(0))
    }

    /// Registry id for a path, if it was ever recorded.
    pub async fn lookup_path_id(&self, path: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar("SELECT id FROM paths WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    /// Resolve (or assign) the registry id for a path inside a transaction.
    async fn path_id_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        registry: &mut PathRegistry,
        path: &str,
    ) -> Result<i64> {
        if let Some(id) = registry.get(path) {
            return Ok(id);
        }
        sqlx::query("INSERT OR IGNORE INTO paths (path) VALUES (?)")
            .bind(path)
            .execute(&mut **tx)
            .await?;
        let id: i64 = sqlx::query_scalar("SELECT id FROM paths WHERE path = ?")
            .bind(path)
            .fetch_one(&mut **tx)
            .await?;
        registry.insert(path, id);
        Ok(id)
    }

    /// Commit one ingested revision atomically: the revision row, every
    /// change record, any new path-registry rows and the temperature
    /// checkpoints become visible together or not at all.
    pub async fn commit_revision(
        &self,
        info: &RevisionInfo,
        counts: RevisionCounts,
        records: &[ChangeRecord],
        registry: &mut PathRegistry,
        temp: &TemperatureParams,
    ) -> Result<()> {
        let commit_ts = info.commit_ts.context("revision has no commit date")?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO revisions
                (revno, commit_ts, author, message, added_count, changed_count, deleted_count)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(info.revno)
        .bind(commit_ts)
        .bind(&info.author)
        .bind(&info.message)
        .bind(counts.added)
        .bind(counts.changed)
        .bind(counts.deleted)
        .execute(&mut *tx)
        .await?;

        for record in records {
            let entry = &record.entry;
            let path_id = self.path_id_in_tx(&mut tx, registry, &entry.path).await?;
            let (copy_path_id, copy_rev) = match &entry.copy_from {
                Some((path, rev)) => {
                    (Some(self.path_id_in_tx(&mut tx, registry, path).await?), Some(*rev))
                }
                None => (None, None),
            };

            sqlx::query(
                "INSERT INTO change_records
                    (revno, path_id, change_kind, path_kind, copyfrom_path_id, copyfrom_revno,
                     lines_added, lines_deleted, lc_updated, entry_kind)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(info.revno)
            .bind(path_id)
            .bind(entry.kind.as_code())
            .bind(entry.path_kind.as_code())
            .bind(copy_path_id)
            .bind(copy_rev)
            .bind(entry.lines.added)
            .bind(entry.lines.deleted)
            .bind(entry.lc_updated)
            .bind(record.entry_kind.as_code())
            .execute(&mut *tx)
            .await?;

            if entry.path_kind == PathKind::File {
                self.heat_file_in_tx(&mut tx, path_id, commit_ts, temp).await?;
            }
        }

        if let Some(author) = &info.author {
            self.heat_author_in_tx(&mut tx, author, commit_ts, temp).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn heat_file_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        path_id: i64,
        ts: i64,
        temp: &TemperatureParams,
    ) -> Result<()> {
        let checkpoint: Option<(i64, f64)> =
            sqlx::query_as("SELECT last_ts, temperature FROM file_activity WHERE path_id = ?")
                .bind(path_id)
                .fetch_optional(&mut **tx)
                .await?;
        let next = temperature::heat(
            checkpoint.map(|(last_ts, temperature)| Checkpoint { last_ts, temperature }),
            ts,
            temp,
        );
        sqlx::query(
            "INSERT INTO file_activity (path_id, last_ts, temperature) VALUES (?, ?, ?)
             ON CONFLICT(path_id) DO UPDATE SET
                last_ts = excluded.last_ts, temperature = excluded.temperature",
        )
        .bind(path_id)
        .bind(next.last_ts)
        .bind(next.temperature)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn heat_author_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        author: &str,
        ts: i64,
        temp: &TemperatureParams,
    ) -> Result<()> {
        let checkpoint: Option<(i64, f64)> =
            sqlx::query_as("SELECT last_ts, temperature FROM author_activity WHERE author = ?")
                .bind(author)
                .fetch_optional(&mut **tx)
                .await?;
        let next = temperature::heat(
            checkpoint.map(|(last_ts, temperature)| Checkpoint { last_ts, temperature }),
            ts,
            temp,
        );
        sqlx::query(
            "INSERT INTO author_activity (author, last_ts, temperature) VALUES (?, ?, ?)
             ON CONFLICT(author) DO UPDATE SET
                last_ts = excluded.last_ts, temperature = excluded.temperature",
        )
        .bind(author)
        .bind(next.last_ts)
        .bind(next.temperature)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Distinct files ever Added or Replaced under a directory prefix at or
    /// below `up_to`, with the revision that added them. Used by the
    /// reconciliation replay; includes synthesized records so files that
    /// only exist through an earlier directory copy are still found.
    pub async fn files_added_under(&self, prefix: &str, up_to: i64) -> Result<Vec<(String, i64)>> {
        debug_assert!(prefix.ends_with('/'));
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT DISTINCT p.path, c.revno
             FROM change_records c JOIN paths p ON c.path_id = p.id
             WHERE c.path_kind = 'F' AND c.revno <= ?
               AND c.change_kind IN ('A', 'R')
               AND p.path LIKE ? AND p.path != ?",
        )
        .bind(up_to)
        .bind(format!("{}%", prefix))
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Distinct files deleted under a directory prefix at or below `up_to`,
    /// with the revision that deleted them.
    pub async fn files_deleted_under(
        &self,
        prefix: &str,
        up_to: i64,
    ) -> Result<Vec<(String, i64)>> {
        debug_assert!(prefix.ends_with('/'));
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT DISTINCT p.path, c.revno
             FROM change_records c JOIN paths p ON c.path_id = p.id
             WHERE c.path_kind = 'F' AND c.revno <= ?
               AND c.change_kind = 'D'
               AND p.path LIKE ? AND p.path != ?",
        )
        .bind(up_to)
        .bind(format!("{}%", prefix))
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Net line count accumulated by a path's history at or below `up_to`.
    /// Zero when the path has no recorded history.
    pub async fn net_line_count(&self, path: &str, up_to: i64) -> Result<LineDelta> {
        let (added, deleted): (i64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(c.lines_added), 0), COALESCE(SUM(c.lines_deleted), 0)
             FROM change_records c JOIN paths p ON c.path_id = p.id
             WHERE p.path = ? AND c.revno <= ?",
        )
        .bind(path)
        .bind(up_to)
        .fetch_one(&self.pool)
        .await?;
        Ok(LineDelta::new(added, deleted))
    }

    /// One stored revision row.
    pub async fn revision(&self, revno: i64) -> Result<Option<StoredRevision>> {
        let row = sqlx::query(
            "SELECT revno, commit_ts, author, message, added_count, changed_count, deleted_count
             FROM revisions WHERE revno = ?",
        )
        .bind(revno)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| StoredRevision {
            revno: row.get("revno"),
            commit_ts: row.get("commit_ts"),
            author: row.get("author"),
            message: row.get("message"),
            counts: RevisionCounts {
                added: row.get("added_count"),
                changed: row.get("changed_count"),
                deleted: row.get("deleted_count"),
            },
        }))
    }

    /// Every change record of one revision, paths resolved, ordered by path.
    pub async fn records_for_revision(&self, revno: i64) -> Result<Vec<StoredChangeRecord>> {
        let rows = sqlx::query(
            "SELECT c.revno, p.path, c.change_kind, c.path_kind,
                    cp.path AS copy_path, c.copyfrom_revno,
                    c.lines_added, c.lines_deleted, c.lc_updated, c.entry_kind
             FROM change_records c
             JOIN paths p ON c.path_id = p.id
             LEFT JOIN paths cp ON c.copyfrom_path_id = cp.id
             WHERE c.revno = ?
             ORDER BY p.path",
        )
        .bind(revno)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let change_kind: String = row.get("change_kind");
                let path_kind: String = row.get("path_kind");
                let entry_kind: String = row.get("entry_kind");
                let copy_path: Option<String> = row.get("copy_path");
                let copy_rev: Option<i64> = row.get("copyfrom_revno");
                Ok(StoredChangeRecord {
                    revno: row.get("revno"),
                    path: row.get("path"),
                    change_kind: ChangeKind::from_code(&change_kind)
                        .context("bad change kind code")?,
                    path_kind: PathKind::from_code(&path_kind).context("bad path kind code")?,
                    copy_from: copy_path.zip(copy_rev),
                    lines: LineDelta::new(row.get("lines_added"), row.get("lines_deleted")),
                    lc_updated: row.get("lc_updated"),
                    entry_kind: EntryKind::from_code(&entry_kind).context("bad entry kind code")?,
                })
            })
            .collect()
    }

    /// Records whose line counts were skipped during ingestion and still
    /// await backfill, oldest revision first.
    pub async fn records_pending_line_count(
        &self,
    ) -> Result<Vec<(i64, String, ChangeKind, PathKind)>> {
        let rows = sqlx::query_as::<_, (i64, String, String, String)>(
            "SELECT c.revno, p.path, c.change_kind, c.path_kind
             FROM change_records c JOIN paths p ON c.path_id = p.id
             WHERE c.lc_updated = 0
             ORDER BY c.revno, p.path",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(revno, path, change_kind, path_kind)| {
                Ok((
                    revno,
                    path,
                    ChangeKind::from_code(&change_kind).context("bad change kind code")?,
                    PathKind::from_code(&path_kind).context("bad path kind code")?,
                ))
            })
            .collect()
    }

    /// Backfill the line counts of one record and clear its pending flag.
    ///
    /// The single sanctioned rewrite of a historic row.
    pub async fn update_line_count(&self, revno: i64, path: &str, lines: LineDelta) -> Result<()> {
        sqlx::query(
            "UPDATE change_records SET lines_added = ?, lines_deleted = ?, lc_updated = 1
             WHERE revno = ? AND path_id = (SELECT id FROM paths WHERE path = ?)",
        )
        .bind(lines.added)
        .bind(lines.deleted)
        .bind(revno)
        .bind(path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Total number of change records in the store.
    pub async fn count_change_records(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM change_records")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Cumulative net line count over time for paths under a prefix:
    /// (commit timestamp, running total) per revision that touched the
    /// prefix, in revision order.
    pub async fn line_count_series(&self, prefix: &str) -> Result<Vec<(i64, i64)>> {
        let rows = sqlx::query_as::<_, (i64, i64)>(
            "SELECT r.commit_ts, SUM(c.lines_added - c.lines_deleted)
             FROM change_records c
             JOIN paths p ON c.path_id = p.id
             JOIN revisions r ON r.revno = c.revno
             WHERE p.path LIKE ?
             GROUP BY r.revno
             ORDER BY r.revno",
        )
        .bind(format!("{}%", prefix))
        .fetch_all(&self.pool)
        .await?;

        let mut total = 0i64;
        Ok(rows
            .into_iter()
            .map(|(ts, delta)| {
                total += delta;
                (ts, total)
            })
            .collect())
    }

    /// Top N files by activity temperature as of `at_ts`.
    ///
    /// Checkpoints are decayed to the query time on the fly; no event
    /// replay happens.
    pub async fn top_hot_files(
        &self,
        limit: usize,
        at_ts: i64,
        temp: &TemperatureParams,
    ) -> Result<Vec<(String, f64)>> {
        let rows = sqlx::query_as::<_, (String, i64, f64)>(
            "SELECT p.path, a.last_ts, a.temperature
             FROM file_activity a JOIN paths p ON a.path_id = p.id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hot: Vec<(String, f64)> = rows
            .into_iter()
            .map(|(path, last_ts, temperature)| {
                let cp = Checkpoint { last_ts, temperature };
                (path, temperature::temperature_at(cp, at_ts, temp.cooling_rate))
            })
            .collect();
        hot.sort_by(|a, b| b.1.total_cmp(&a.1));
        hot.truncate(limit);
        Ok(hot)
    }

    /// Top N authors by activity temperature as of `at_ts`.
    pub async fn top_hot_authors(
        &self,
        limit: usize,
        at_ts: i64,
        temp: &TemperatureParams,
    ) -> Result<Vec<(String, f64)>> {
        let rows = sqlx::query_as::<_, (String, i64, f64)>(
            "SELECT author, last_ts, temperature FROM author_activity",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hot: Vec<(String, f64)> = rows
            .into_iter()
            .map(|(author, last_ts, temperature)| {
                let cp = Checkpoint { last_ts, temperature };
                (author, temperature::temperature_at(cp, at_ts, temp.cooling_rate))
            })
            .collect();
        hot.sort_by(|a, b| b.1.total_cmp(&a.1));
        hot.truncate(limit);
        Ok(hot)
    }

    /// Commit counts per author in `[start_ts, end_ts)`, most active first.
    pub async fn author_commits_between(
        &self,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT author, COUNT(*) FROM revisions
             WHERE author IS NOT NULL AND commit_ts >= ? AND commit_ts < ?
             GROUP BY author
             ORDER BY COUNT(*) DESC, author",
        )
        .bind(start_ts)
        .bind(end_ts)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
