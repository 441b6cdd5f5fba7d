//! Repository for cache entries.

use crate::Database;
use crate::entry::{CacheEntry, EntrySummary};
use crate::error::{ErrorKind, Result};
use crate::models::{EntryRow, SummaryRow};
use exn::ResultExt;
use sqlx::SqlitePool;
use tracing::instrument;

/// Repository for reading and writing [`CacheEntry`] records.
///
/// Each record is keyed by the canonical URL of the asset. Writing a record
/// for a URL that is already known replaces it wholesale.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the record for a canonical URL, if one exists.
    #[instrument(level = "trace", skip(self))]
    pub async fn get(&self, url: &str) -> Result<Option<CacheEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(include_str!("../queries/get_entry.sql"))
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(CacheEntry::try_from).transpose()
    }

    /// Insert or replace the record for `entry.url`.
    #[instrument(level = "trace", skip_all, fields(url = %entry.url, size = entry.size, inline = entry.is_inline()))]
    pub async fn put(&self, entry: &CacheEntry) -> Result<()> {
        let row = EntryRow::try_from(entry)?;
        sqlx::query(include_str!("../queries/upsert_entry.sql"))
            .bind(row.url)
            .bind(row.etag)
            .bind(row.last_modified)
            .bind(row.size)
            .bind(row.blob)
            .bind(row.cached_at)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Delete the record for a canonical URL.
    ///
    /// Returns `true` if a record was deleted, `false` if none existed.
    pub async fn delete(&self, url: &str) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_entry.sql"))
            .bind(url)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// List every record, without payloads, ordered by URL.
    pub async fn list(&self) -> Result<Vec<EntrySummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(include_str!("../queries/list_entries.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(EntrySummary::try_from).collect()
    }

    /// Delete every record. Returns the number of records removed.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/clear_entries.sql"))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }
}
