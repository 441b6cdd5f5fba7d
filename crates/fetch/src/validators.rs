use reqwest::header::{ETAG, HeaderMap, HeaderName, LAST_MODIFIED};
use retrocache_cache::CacheEntry;

/// Server-supplied cache validators for one asset.
///
/// Values are opaque strings, compared byte for byte; a weak `W/` ETag is
/// not treated any differently from a strong one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn new(etag: Option<impl Into<String>>, last_modified: Option<impl Into<String>>) -> Self {
        Self {
            etag: etag.map(Into::into),
            last_modified: last_modified.map(Into::into),
        }
    }

    /// Extract validators from response headers, ignoring values that are
    /// empty or not visible ASCII.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string)
        };
        Self {
            etag: header(ETAG),
            last_modified: header(LAST_MODIFIED),
        }
    }

    /// An asset without any validator can never be revalidated, so it is
    /// neither looked up nor persisted.
    pub fn is_cacheable(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }

    /// Whether a cached entry was stored under these validators.
    ///
    /// The ETag decides when the server sent one; otherwise Last-Modified
    /// does.
    pub fn matches(&self, entry: &CacheEntry) -> bool {
        match (&self.etag, &self.last_modified) {
            (Some(etag), _) => entry.etag.as_ref() == Some(etag),
            (None, Some(last_modified)) => entry.last_modified.as_ref() == Some(last_modified),
            (None, None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use rstest::rstest;

    const DATE: &str = "Wed, 21 Oct 2015 07:28:00 GMT";
    const LATER: &str = "Thu, 22 Oct 2015 07:28:00 GMT";

    #[test]
    fn test_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(ETAG, HeaderValue::from_static("\"5f3a-1000\""));
        headers.insert(LAST_MODIFIED, HeaderValue::from_static(DATE));
        let validators = Validators::from_headers(&headers);
        assert_eq!(validators, Validators::new(Some("\"5f3a-1000\""), Some(DATE)));
        assert!(validators.is_cacheable());
    }

    #[test]
    fn test_from_headers_ignores_empty_values() {
        let mut headers = HeaderMap::new();
        headers.insert(ETAG, HeaderValue::from_static(""));
        let validators = Validators::from_headers(&headers);
        assert_eq!(validators, Validators::default());
        assert!(!validators.is_cacheable());
    }

    #[rstest]
    // ETag present on the server: only the ETag counts.
    #[case(Some("\"a\""), Some(DATE), Some("\"a\""), Some(LATER), true)]
    #[case(Some("\"a\""), Some(DATE), Some("\"b\""), Some(DATE), false)]
    #[case(Some("\"a\""), None, None, None, false)]
    #[case(Some("W/\"a\""), None, Some("\"a\""), None, false)]
    // No ETag on the server: fall back to Last-Modified.
    #[case(None, Some(DATE), Some("\"a\""), Some(DATE), true)]
    #[case(None, Some(DATE), None, Some(LATER), false)]
    // Nothing to compare.
    #[case(None, None, None, None, false)]
    fn test_matches(
        #[case] etag: Option<&str>,
        #[case] last_modified: Option<&str>,
        #[case] cached_etag: Option<&str>,
        #[case] cached_last_modified: Option<&str>,
        #[case] expected: bool,
    ) {
        let validators = Validators::new(etag, last_modified);
        let entry = CacheEntry::new("https://example.org/game.zip", 3)
            .with_etag(cached_etag)
            .with_last_modified(cached_last_modified);
        assert_eq!(validators.matches(&entry), expected);
    }
}
