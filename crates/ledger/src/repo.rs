//! Repository for sessions, processed files, cached albums and history.
//!
//! All ledger access funnels through [`Ledger`]. The batch dispatcher is the
//! only component that writes during a run, which keeps per-path writes
//! strictly ordered without any locking beyond SQLite's own.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{
    AlbumRow, CachedAlbum, ChangeSource, FileOutcome, FileRecord, FileRow, FileStatus, HistoryEntry, HistoryRow,
    Session, SessionConfig, SessionDelta, SessionRow, SessionStatus,
};
use exn::{OptionExt, ResultExt};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use time::{Duration, UtcDateTime};
use tome_catalog::MetadataRecord;

/// Default lifetime for cached album records: a week. Album pages change
/// rarely; the cost of a stale record is one wrong field until re-fetch.
pub const DEFAULT_ALBUM_TTL: Duration = Duration::days(7);

/// Aggregate statistics over recently recorded files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub total_files: u32,
    pub files_successful: u32,
    pub files_manual: u32,
    pub files_failed: u32,
    pub files_skipped: u32,
    pub unique_series: u32,
    pub unique_publishers: u32,
    pub avg_duration_ms: u32,
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    total_files: i64,
    files_successful: Option<i64>,
    files_manual: Option<i64>,
    files_failed: Option<i64>,
    files_skipped: Option<i64>,
    unique_series: i64,
    unique_publishers: i64,
    avg_duration_ms: i64,
}

/// Repository over the ledger database.
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: SqlitePool,
    album_ttl: Duration,
}

impl From<&Database> for Ledger {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone(), album_ttl: DEFAULT_ALBUM_TTL }
    }
}

impl Ledger {
    /// Create a repository with a non-default album cache TTL.
    pub fn with_album_ttl(db: &Database, album_ttl: Duration) -> Self {
        Self { pool: db.pool().clone(), album_ttl }
    }

    fn path_to_string(path: impl AsRef<Path>) -> Result<String> {
        Ok(path.as_ref().to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string())
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Insert a new session with status `running` and return its id.
    ///
    /// `parent_id` is set when the session was created by resuming another.
    pub async fn start_session(&self, config: &SessionConfig, parent_id: Option<i64>) -> Result<i64> {
        let id: (i64,) = sqlx::query_as(
            r#"
                INSERT INTO processing_sessions
                    (directory, run_mode, num_workers, force_reprocess, parent_id, status, started_at)
                VALUES (?1, ?2, ?3, ?4, ?5, 'running', ?6)
                RETURNING id
            "#,
        )
        .bind(Self::path_to_string(&config.directory)?)
        .bind(config.mode.to_string())
        .bind(i64::from(config.num_workers))
        .bind(i64::from(config.force))
        .bind(parent_id)
        .bind(UtcDateTime::now().unix_timestamp())
        .fetch_one(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        tracing::info!(session = id.0, directory = %config.directory.display(), "started session");
        Ok(id.0)
    }

    pub async fn get_session(&self, session_id: i64) -> Result<Session> {
        let row: Option<SessionRow> = sqlx::query_as("SELECT * FROM processing_sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.ok_or_raise(|| ErrorKind::SessionNotFound(session_id))?.try_into()
    }

    /// All sessions, newest first.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let rows: Vec<SessionRow> = sqlx::query_as("SELECT * FROM processing_sessions ORDER BY id DESC")
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Session::try_from).collect()
    }

    /// Atomically increment session counters. This is the only way counters
    /// change, which is what keeps them monotonic while a session runs.
    pub async fn apply_delta(&self, session_id: i64, delta: &SessionDelta) -> Result<()> {
        sqlx::query(
            r#"
                UPDATE processing_sessions SET
                    total_files      = total_files      + ?2,
                    files_processed  = files_processed  + ?3,
                    files_successful = files_successful + ?4,
                    files_failed     = files_failed     + ?5,
                    files_skipped    = files_skipped    + ?6
                WHERE id = ?1
            "#,
        )
        .bind(session_id)
        .bind(i64::from(delta.total))
        .bind(i64::from(delta.processed))
        .bind(i64::from(delta.successful))
        .bind(i64::from(delta.failed))
        .bind(i64::from(delta.skipped))
        .execute(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Set the session status. Entering a terminal status stamps `ended_at`;
    /// a session that is already terminal keeps its original end timestamp.
    pub async fn set_status(&self, session_id: i64, status: SessionStatus) -> Result<()> {
        sqlx::query(
            r#"
                UPDATE processing_sessions SET
                    status = ?2,
                    ended_at = CASE
                        WHEN ?2 IN ('completed', 'failed') THEN COALESCE(ended_at, ?3)
                        ELSE ended_at
                    END
                WHERE id = ?1
            "#,
        )
        .bind(session_id)
        .bind(status.to_string())
        .bind(UtcDateTime::now().unix_timestamp())
        .execute(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(session = session_id, %status, "session status updated");
        Ok(())
    }

    // =========================================================================
    // Processed files
    // =========================================================================

    /// Whether a file counts as already processed.
    ///
    /// With a hash supplied, a stored row whose hash differs means the file
    /// content changed since it was processed — treated as not-processed.
    /// Without a hash, any terminal status counts (a file that failed last
    /// run is only retried through resume or `force`).
    pub async fn is_processed(&self, path: impl AsRef<Path>, hash: Option<&str>) -> Result<bool> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT file_hash, status FROM processed_files WHERE file_path = ?1")
                .bind(Self::path_to_string(path)?)
                .fetch_optional(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
        let Some((stored_hash, status)) = row else {
            return Ok(false);
        };
        let status = status.parse::<FileStatus>()?;
        Ok(match hash {
            Some(hash) => stored_hash == hash && status.is_processed(),
            None => status.is_terminal(),
        })
    }

    /// Record (or re-record) the outcome for one file.
    ///
    /// Idempotent per path: a second call with the same outcome updates the
    /// existing row in place. Returns the row id.
    pub async fn record_processing(&self, session_id: i64, outcome: &FileOutcome) -> Result<i64> {
        let size = outcome
            .size
            .map(|s| i64::try_from(s).or_raise(|| ErrorKind::InvalidData("file size")))
            .transpose()?;
        let album = outcome.album.as_ref();
        let album_id = album
            .map(|a| i64::try_from(a.album_id).or_raise(|| ErrorKind::InvalidData("album id")))
            .transpose()?;
        let id: (i64,) = sqlx::query_as(include_str!("../queries/record_file.sql"))
            .bind(Self::path_to_string(&outcome.path)?)
            .bind(&outcome.hash)
            .bind(size)
            .bind(session_id)
            .bind(outcome.status.to_string())
            .bind(album_id)
            .bind(album.map(|a| a.title.clone()))
            .bind(album.and_then(|a| a.series.clone()))
            .bind(album.and_then(|a| a.volume).map(i64::from))
            .bind(album.and_then(|a| a.publisher.clone()))
            .bind(album.and_then(|a| a.year).map(i64::from))
            .bind(outcome.confidence)
            .bind(outcome.error.clone())
            .bind(i64::from(outcome.attempts))
            .bind(i64::try_from(outcome.duration_ms).or_raise(|| ErrorKind::InvalidData("duration"))?)
            .bind(UtcDateTime::now().unix_timestamp())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(path = %outcome.path.display(), status = %outcome.status, "recorded file outcome");
        Ok(id.0)
    }

    /// Pre-register every file a dispatch is about to process as `pending`,
    /// claiming it for `session_id`. Runs in one transaction so a crash
    /// leaves either all or none registered.
    pub async fn register_pending(&self, session_id: i64, paths: &[PathBuf]) -> Result<()> {
        let now = UtcDateTime::now().unix_timestamp();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for path in paths {
            sqlx::query(include_str!("../queries/register_pending.sql"))
                .bind(Self::path_to_string(path)?)
                .bind(session_id)
                .bind(now)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// All rows tied to one session, oldest first.
    pub async fn get_session_files(&self, session_id: i64) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> =
            sqlx::query_as("SELECT * FROM processed_files WHERE session_id = ?1 ORDER BY recorded_at ASC, id ASC")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(FileRecord::try_from).collect()
    }

    /// Paths in the session's parent chain that were never processed
    /// successfully anywhere in that chain. This is the resume work list:
    /// a file successful in a grandparent never reappears, even when the
    /// intermediate child has no row for it yet.
    pub async fn unprocessed_in_chain(&self, session_id: i64) -> Result<Vec<PathBuf>> {
        let rows: Vec<(String,)> = sqlx::query_as(include_str!("../queries/unprocessed_in_chain.sql"))
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(rows.into_iter().map(|(path,)| PathBuf::from(path)).collect())
    }

    /// Files deferred for human review, newest first.
    pub async fn files_needing_review(&self, limit: u32) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> = sqlx::query_as(
            "SELECT * FROM processed_files WHERE status = 'manual' ORDER BY recorded_at DESC, id DESC LIMIT ?1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(FileRecord::try_from).collect()
    }

    /// Aggregate statistics over files recorded in the past `days` days.
    pub async fn statistics(&self, days: u32) -> Result<LedgerStats> {
        let since = (UtcDateTime::now() - Duration::days(i64::from(days))).unix_timestamp();
        let row: StatsRow = sqlx::query_as(include_str!("../queries/statistics.sql"))
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let count = |v: i64| u32::try_from(v).or_raise(|| ErrorKind::InvalidData("statistic"));
        Ok(LedgerStats {
            total_files: count(row.total_files)?,
            files_successful: count(row.files_successful.unwrap_or(0))?,
            files_manual: count(row.files_manual.unwrap_or(0))?,
            files_failed: count(row.files_failed.unwrap_or(0))?,
            files_skipped: count(row.files_skipped.unwrap_or(0))?,
            unique_series: count(row.unique_series)?,
            unique_publishers: count(row.unique_publishers)?,
            avg_duration_ms: count(row.avg_duration_ms)?,
        })
    }

    // =========================================================================
    // Album cache
    // =========================================================================

    /// Upsert an album record into the TTL'd cache table.
    pub async fn cache_album(&self, record: &MetadataRecord) -> Result<()> {
        let now = UtcDateTime::now();
        sqlx::query(include_str!("../queries/upsert_album.sql"))
            .bind(i64::try_from(record.album_id).or_raise(|| ErrorKind::InvalidData("album id"))?)
            .bind(&record.title)
            .bind(record.series.as_deref())
            .bind(record.volume.map(i64::from))
            .bind(record.publisher.as_deref())
            .bind(record.year.map(i64::from))
            .bind(&record.url)
            .bind(record.cover_url.as_deref())
            .bind(serde_json::to_string(record).or_raise(|| ErrorKind::InvalidData("album metadata"))?)
            .bind(now.unix_timestamp())
            .bind((now + self.album_ttl).unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Fetch a cached album record. Expired entries are reported as absent
    /// (and left for the upsert to overwrite).
    pub async fn get_cached_album(&self, album_id: u64) -> Result<Option<CachedAlbum>> {
        let row: Option<AlbumRow> =
            sqlx::query_as("SELECT metadata, cached_at, valid_until FROM album_cache WHERE album_id = ?1")
                .bind(i64::try_from(album_id).or_raise(|| ErrorKind::InvalidData("album id"))?)
                .fetch_optional(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
        let album = row.map(CachedAlbum::try_from).transpose()?;
        Ok(album.filter(|a| a.is_fresh(UtcDateTime::now())))
    }

    // =========================================================================
    // Metadata history
    // =========================================================================

    /// Append one audit row. There is deliberately no update or delete
    /// counterpart.
    pub async fn append_history(
        &self,
        file_id: i64,
        field: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
        source: ChangeSource,
    ) -> Result<()> {
        sqlx::query(
            r#"
                INSERT INTO metadata_history (file_id, field, old_value, new_value, source, changed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(file_id)
        .bind(field)
        .bind(old_value)
        .bind(new_value)
        .bind(source.to_string())
        .bind(UtcDateTime::now().unix_timestamp())
        .execute(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Audit trail for one file, oldest first.
    pub async fn history_for_file(&self, file_id: i64) -> Result<Vec<HistoryEntry>> {
        let rows: Vec<HistoryRow> =
            sqlx::query_as("SELECT * FROM metadata_history WHERE file_id = ?1 ORDER BY changed_at ASC, id ASC")
                .bind(file_id)
                .fetch_all(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(HistoryEntry::try_from).collect()
    }
}
