use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use reqwest::Url;
use retrocache_storage::validate_file_path;
use std::path::{Path, PathBuf};

/// Descriptor of one remote asset.
///
/// Immutable once created. The URL is canonical: it is absolute, normalised
/// by the URL parser, and carries no fragment, so it can be used directly as
/// the cache key. An asset with a path hint is eligible for the block store
/// tier; without one it can only ever be cached inline in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    url: Url,
    expected_size: u64,
    path_hint: Option<PathBuf>,
}

impl AssetRecord {
    /// Create a record from an absolute HTTP(S) URL.
    ///
    /// ```
    /// use retrocache_fetch::AssetRecord;
    ///
    /// let asset = AssetRecord::new("https://example.org/play/../game.zip#top", 3).unwrap();
    /// assert_eq!(asset.canonical_url(), "https://example.org/game.zip");
    /// assert!(AssetRecord::new("ftp://example.org/game.zip", 3).is_err());
    /// ```
    pub fn new(url: &str, expected_size: u64) -> Result<Self> {
        let url = Url::parse(url).or_raise(|| ErrorKind::InvalidUrl(url.to_string()))?;
        Self::from_url(url, expected_size)
    }

    /// Create a record from a reference relative to `base`.
    ///
    /// ```
    /// use retrocache_fetch::{AssetRecord, Url};
    ///
    /// let base = Url::parse("https://example.org/play/").unwrap();
    /// let asset = AssetRecord::resolve(&base, "cores/mkxp-z_libretro.wasm", 10).unwrap();
    /// assert_eq!(asset.canonical_url(), "https://example.org/play/cores/mkxp-z_libretro.wasm");
    /// ```
    pub fn resolve(base: &Url, reference: &str, expected_size: u64) -> Result<Self> {
        let url = base.join(reference).or_raise(|| ErrorKind::InvalidUrl(reference.to_string()))?;
        Self::from_url(url, expected_size)
    }

    fn from_url(mut url: Url, expected_size: u64) -> Result<Self> {
        if !matches!(url.scheme(), "http" | "https") {
            exn::bail!(ErrorKind::InvalidUrl(url.to_string()));
        }
        url.set_fragment(None);
        Ok(Self {
            url,
            expected_size,
            path_hint: None,
        })
    }

    /// Attach a relative block store path (at least `dir/file` deep).
    pub fn with_path_hint(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let validated =
            validate_file_path(path).or_raise(|| ErrorKind::InvalidPath(path.display().to_string()))?;
        self.path_hint = Some(validated);
        Ok(self)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The cache key for this asset.
    pub fn canonical_url(&self) -> &str {
        self.url.as_str()
    }

    pub fn expected_size(&self) -> u64 {
        self.expected_size
    }

    pub fn path_hint(&self) -> Option<&Path> {
        self.path_hint.as_deref()
    }
}
