//! HTTP transport seam.
//!
//! The fetch pipeline talks to upstreams through [`HttpTransport`] so
//! tests can substitute a scripted transport; production uses
//! [`ReqwestTransport`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use url::Url;

/// Per-attempt limits.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A raw upstream response. Redirects are followed inside the transport,
/// so the status here is what the final hop returned.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,

    /// `Retry-After` in seconds, when the upstream sent one.
    pub retry_after: Option<u64>,
}

impl HttpResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// `get(url) -> (status, body)`; retries and classification live in the
/// fetcher, not here.
#[async_trait]
pub trait HttpTransport: std::fmt::Debug + Send + Sync {
    /// Issues one GET. `context` carries the canonical id for upstream
    /// observability.
    async fn get(&self, url: &Url, context: &str) -> Result<HttpResponse>;
}

/// reqwest-backed transport with fixed User-Agent and timeouts.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url, context: &str) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url.clone())
            .header("x-request-context", context)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let body = response.bytes().await.map_err(classify)?;

        Ok(HttpResponse {
            status,
            body,
            retry_after,
        })
    }
}

fn classify(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else if e.is_connect() {
        Error::Connect(e.to_string())
    } else {
        Error::Other(e.to_string())
    }
}
