//! HTTP transport abstraction.
//!
//! The fetcher only ever issues two kinds of request: a `HEAD` to learn the
//! current validators of an asset, and a `GET` to download its payload as a
//! stream of chunks. [`HttpTransport`] does this with `reqwest`;
//! `MockTransport` (behind the `mock` feature) serves canned resources from
//! memory and records every request it sees.

mod http;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::http::{HttpTransport, USER_AGENT};
#[cfg(any(test, feature = "mock"))]
pub use self::mock::{MockResource, MockTransport, Request};
use crate::Validators;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::Url;
use std::sync::Arc;

/// Payload of a `GET` response, chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

pub type TransportHandle = Arc<dyn Transport>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable name, for logging.
    fn name(&self) -> &str;

    /// Request the headers of `url` and extract its validators.
    ///
    /// Any failure, including a non-success status, is a
    /// [`Network`](crate::error::ErrorKind::Network) error.
    async fn head(&self, url: &Url) -> Result<Validators>;

    /// Request the body of `url`.
    ///
    /// A failure to start the request is returned directly; a failure part
    /// way through surfaces as an error item in the stream.
    async fn get(&self, url: &Url) -> Result<ByteStream>;
}
