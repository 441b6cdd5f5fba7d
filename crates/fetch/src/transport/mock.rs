//! In-memory transport for testing.

use super::{ByteStream, Transport};
use crate::Validators;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

/// A request seen by a [`MockTransport`], by canonical URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Head(String),
    Get(String),
}

/// A canned response served by a [`MockTransport`].
#[derive(Debug, Clone, Default)]
pub struct MockResource {
    body: Bytes,
    validators: Validators,
    interrupt_after: Option<usize>,
}

impl MockResource {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.validators.etag = Some(etag.into());
        self
    }

    pub fn with_last_modified(mut self, last_modified: impl Into<String>) -> Self {
        self.validators.last_modified = Some(last_modified.into());
        self
    }

    /// Fail the download with a network error after `chunks` chunks.
    pub fn interrupted_after(mut self, chunks: usize) -> Self {
        self.interrupt_after = Some(chunks);
        self
    }
}

/// In-memory [`Transport`] for testing.
///
/// Unknown URLs answer like a `404`: both `HEAD` and `GET` fail with a
/// network error. Bodies are streamed in chunks of
/// [`chunk_size`](Self::with_chunk_size) bytes so progress reporting can be
/// observed. Every request is recorded, in order.
///
/// ```
/// use retrocache_fetch::transport::{MockResource, MockTransport, Request, Transport};
/// use reqwest::Url;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let transport = MockTransport::new();
/// transport.serve("https://example.org/game.zip", MockResource::new("PK..").with_etag("\"v1\""));
///
/// let url = Url::parse("https://example.org/game.zip").unwrap();
/// let validators = transport.head(&url).await.unwrap();
/// assert_eq!(validators.etag.as_deref(), Some("\"v1\""));
/// assert_eq!(transport.requests(), vec![Request::Head(url.to_string())]);
/// # }
/// ```
pub struct MockTransport {
    resources: RwLock<HashMap<String, MockResource>>,
    chunk_size: usize,
    requests: Mutex<Vec<Request>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            resources: RwLock::new(HashMap::new()),
            chunk_size: 4096,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Serve (or replace) the resource at `url`.
    ///
    /// Panics if `url` does not parse. If test setup is wrong, then test
    /// should not pass.
    pub fn serve(&self, url: &str, resource: MockResource) {
        let Ok(url) = Url::parse(url) else {
            panic!("MockTransport::serve: invalid url {url}");
        };
        self.resources.write().unwrap_or_else(PoisonError::into_inner).insert(url.to_string(), resource);
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn head_count(&self) -> usize {
        self.requests().iter().filter(|r| matches!(r, Request::Head(_))).count()
    }

    pub fn get_count(&self) -> usize {
        self.requests().iter().filter(|r| matches!(r, Request::Get(_))).count()
    }

    fn record(&self, request: Request) {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(request);
    }

    fn resource(&self, method: &str, url: &Url) -> Result<MockResource> {
        let resources = self.resources.read().unwrap_or_else(PoisonError::into_inner);
        match resources.get(url.as_str()) {
            Some(resource) => Ok(resource.clone()),
            None => exn::bail!(ErrorKind::Network(format!("{method} {url}: 404 Not Found"))),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn head(&self, url: &Url) -> Result<Validators> {
        self.record(Request::Head(url.to_string()));
        Ok(self.resource("HEAD", url)?.validators)
    }

    async fn get(&self, url: &Url) -> Result<ByteStream> {
        self.record(Request::Get(url.to_string()));
        let resource = self.resource("GET", url)?;
        let mut chunks: Vec<Result<Bytes>> = Vec::new();
        let mut offset = 0;
        while offset < resource.body.len() {
            let end = (offset + self.chunk_size).min(resource.body.len());
            chunks.push(Ok(resource.body.slice(offset..end)));
            offset = end;
        }
        if let Some(after) = resource.interrupt_after {
            chunks.truncate(after);
            chunks.push(Err(exn::Exn::from(ErrorKind::Network(format!("GET {url}: connection reset")))));
        }
        Ok(futures::stream::iter(chunks).boxed())
    }
}
