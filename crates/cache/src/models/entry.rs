use crate::entry::{CacheEntry, EntrySummary};
use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use time::UtcDateTime;

#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub(crate) url: String,
    pub(crate) etag: Option<String>,
    pub(crate) last_modified: Option<String>,
    pub(crate) size: i64,
    pub(crate) blob: Option<Vec<u8>>,
    pub(crate) cached_at: i64,
}
impl TryFrom<&CacheEntry> for EntryRow {
    type Error = Error;
    fn try_from(entry: &CacheEntry) -> Result<Self, Self::Error> {
        Ok(Self {
            url: entry.url.clone(),
            etag: entry.etag.clone(),
            last_modified: entry.last_modified.clone(),
            size: i64::try_from(entry.size).or_raise(|| ErrorKind::InvalidData("size"))?,
            blob: entry.blob.clone(),
            cached_at: entry.cached_at.unix_timestamp(),
        })
    }
}
impl TryFrom<EntryRow> for CacheEntry {
    type Error = Error;
    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            url: row.url,
            etag: row.etag,
            last_modified: row.last_modified,
            size: u64::try_from(row.size).or_raise(|| ErrorKind::InvalidData("size"))?,
            blob: row.blob,
            cached_at: UtcDateTime::from_unix_timestamp(row.cached_at)
                .or_raise(|| ErrorKind::InvalidData("cached at"))?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SummaryRow {
    url: String,
    etag: Option<String>,
    last_modified: Option<String>,
    size: i64,
    inline: bool,
    cached_at: i64,
}
impl TryFrom<SummaryRow> for EntrySummary {
    type Error = Error;
    fn try_from(row: SummaryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            url: row.url,
            etag: row.etag,
            last_modified: row.last_modified,
            size: u64::try_from(row.size).or_raise(|| ErrorKind::InvalidData("size"))?,
            inline: row.inline,
            cached_at: UtcDateTime::from_unix_timestamp(row.cached_at)
                .or_raise(|| ErrorKind::InvalidData("cached at"))?,
        })
    }
}
