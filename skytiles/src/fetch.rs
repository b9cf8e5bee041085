//! Tile fetching over HTTP.
//!
//! The `HttpClient` trait abstracts the transport for dependency injection
//! in tests; `ReqwestClient` is the real implementation. `TileFetcher`
//! layers the fixed-attempt retry policy on top. The fetcher knows nothing
//! about caching; it only produces bytes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CacheConfig;

/// Errors from a single fetch attempt.
///
/// The classes matter for diagnostics only; the retry policy treats them
/// identically.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    /// The request exceeded the attempt timeout.
    #[error("fetch timed out")]
    Timeout,

    /// The server answered with a non-2xx status.
    #[error("HTTP {0}")]
    Status(u16),

    /// Connection, TLS, or other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// HTTP transport abstraction.
///
/// Implementations perform one GET with a bounded timeout and classify
/// the outcome into a [`FetchError`]. Must be `Send + Sync` so a single
/// client can be shared across in-flight batch operations.
pub trait HttpClient: Send + Sync {
    /// Perform one GET request for `url`.
    fn get(&self, url: &str) -> BoxFuture<'_, Result<Bytes, FetchError>>;
}

/// Real HTTP client backed by reqwest.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a client with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("skytiles/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> BoxFuture<'_, Result<Bytes, FetchError>> {
        let request = self.client.get(url).send();
        Box::pin(async move {
            let response = request.await.map_err(classify_reqwest_error)?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            response.bytes().await.map_err(classify_reqwest_error)
        })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if let Some(status) = e.status() {
        FetchError::Status(status.as_u16())
    } else {
        FetchError::Transport(e.to_string())
    }
}

/// Fetches tiles with a fixed-attempt retry policy.
pub struct TileFetcher {
    client: Arc<dyn HttpClient>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl TileFetcher {
    /// Create a fetcher over `client` with the policy from `config`.
    pub fn new(client: Arc<dyn HttpClient>, config: &CacheConfig) -> Self {
        Self {
            client,
            max_attempts: config.max_fetch_attempts.max(1),
            retry_delay: config.retry_delay,
        }
    }

    /// Fetch `url`, retrying up to the configured attempt budget with a
    /// fixed delay between attempts.
    ///
    /// # Returns
    ///
    /// The tile bytes, or the error observed on the final attempt.
    pub async fn fetch_with_retry(&self, url: &str) -> Result<Bytes, FetchError> {
        let mut last_error = FetchError::Transport("no attempt made".to_string());

        for attempt in 1..=self.max_attempts {
            match self.client.get(url).await {
                Ok(payload) => {
                    debug!(url, attempt, bytes = payload.len(), "tile fetched");
                    return Ok(payload);
                }
                Err(e) => {
                    match &e {
                        FetchError::Timeout => warn!(url, attempt, "fetch attempt timed out"),
                        FetchError::Status(status) => {
                            warn!(url, attempt, status, "fetch attempt got error status")
                        }
                        FetchError::Transport(msg) => {
                            warn!(url, attempt, error = %msg, "fetch attempt failed")
                        }
                    }
                    last_error = e;
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(last_error)
    }

    /// Single-attempt fetch for the latency-sensitive render path.
    pub async fn fetch_once(&self, url: &str) -> Result<Bytes, FetchError> {
        self.client.get(url).await
    }
}
