use super::{ByteStream, Transport};
use crate::Validators;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use futures::StreamExt;
use reqwest::{Client, Response, Url};
use tracing::instrument;

/// The user agent sent with every request.
pub const USER_AGENT: &str = concat!("retrocache/", env!("CARGO_PKG_VERSION"));

/// [`Transport`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .or_raise(|| ErrorKind::Network("failed to build HTTP client".to_string()))?;
        Ok(Self::with_client(client))
    }

    /// Use a preconfigured client (proxies, timeouts, extra roots).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(level = "debug", skip_all, fields(url = %url))]
    async fn head(&self, url: &Url) -> Result<Validators> {
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .and_then(Response::error_for_status)
            .or_raise(|| ErrorKind::Network(format!("HEAD {url}")))?;
        Ok(Validators::from_headers(response.headers()))
    }

    #[instrument(level = "debug", skip_all, fields(url = %url))]
    async fn get(&self, url: &Url) -> Result<ByteStream> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(Response::error_for_status)
            .or_raise(|| ErrorKind::Network(format!("GET {url}")))?;
        let context = format!("GET {url}");
        let stream = response
            .bytes_stream()
            .map(move |chunk| chunk.or_raise(|| ErrorKind::Network(context.clone())));
        Ok(stream.boxed())
    }
}
