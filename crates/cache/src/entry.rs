use time::UtcDateTime;

/// A cached asset record, keyed by canonical URL.
///
/// For a record to be usable as a cache hit, exactly one of the following
/// must hold: [`blob`](Self::blob) is present (database tier), or the asset's
/// block store path resolves to a file of [`size`](Self::size) bytes (block
/// store tier). Deciding which applies is up to the caller; this crate only
/// stores what it is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub url: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Size of the payload in bytes.
    pub size: u64,
    /// Inline payload, when cached in the database tier.
    pub blob: Option<Vec<u8>>,
    pub cached_at: UtcDateTime,
}
impl CacheEntry {
    pub fn new(url: impl Into<String>, size: u64) -> Self {
        Self {
            url: url.into(),
            etag: None,
            last_modified: None,
            size,
            blob: None,
            cached_at: UtcDateTime::now(),
        }
    }

    pub fn with_etag(mut self, etag: Option<impl Into<String>>) -> Self {
        self.etag = etag.map(Into::into);
        self
    }

    pub fn with_last_modified(mut self, last_modified: Option<impl Into<String>>) -> Self {
        self.last_modified = last_modified.map(Into::into);
        self
    }

    pub fn with_blob(mut self, blob: impl Into<Vec<u8>>) -> Self {
        self.blob = Some(blob.into());
        self
    }

    /// Whether the payload is stored inline in the database.
    pub fn is_inline(&self) -> bool {
        self.blob.is_some()
    }
}

/// A [`CacheEntry`] without its payload, for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub url: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub size: u64,
    pub inline: bool,
    pub cached_at: UtcDateTime,
}
