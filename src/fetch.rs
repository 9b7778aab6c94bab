//! Fetch collaborator.
//!
//! A [`Fetcher`] turns a topology's `url` and `parser` into a
//! [`GraphSnapshot`]. Timeouts are enforced by the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::netjson::parse_snapshot;
use crate::types::{GraphSnapshot, LinkKeyMode};

/// Parser names understood by [`NetJsonFetcher`].
pub const SUPPORTED_PARSERS: &[&str] = &["netjson"];

/// Error type for fetches.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// The fetch did not finish in time.
    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The source could not be read.
    #[error("Network error: {0}")]
    Network(String),

    /// The payload is not a valid graph.
    #[error("Parse error: {0}")]
    Parse(String),

    /// No parser with this name.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Produces a snapshot from a topology source.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch and parse `url` with `parser`.
    async fn fetch(&self, url: &str, parser: &str) -> Result<GraphSnapshot, FetchError>;
}

/// Fetcher serving preloaded responses keyed by URL.
#[derive(Default)]
pub struct StaticFetcher {
    responses: Mutex<HashMap<String, Result<GraphSnapshot, FetchError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    /// Create an empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Serve `snapshot` for `url`.
    pub fn set(&self, url: impl Into<String>, snapshot: GraphSnapshot) {
        self.responses.lock().insert(url.into(), Ok(snapshot));
    }

    /// Fail fetches of `url` with `error`.
    pub fn fail(&self, url: impl Into<String>, error: FetchError) {
        self.responses.lock().insert(url.into(), Err(error));
    }

    /// Number of fetches served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str, _parser: &str) -> Result<GraphSnapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Network(format!("no response for {url}"))))
    }
}

/// Fetcher reading NetJSON `NetworkGraph` documents.
///
/// `file://` URLs and bare paths are read from disk; `http(s)://` URLs need
/// the `http` feature.
pub struct NetJsonFetcher {
    link_key: LinkKeyMode,
    #[cfg(feature = "http")]
    client: reqwest::Client,
}

impl NetJsonFetcher {
    /// Create a fetcher keying links by `link_key`.
    pub fn new(link_key: LinkKeyMode) -> Self {
        Self {
            link_key,
            #[cfg(feature = "http")]
            client: reqwest::Client::new(),
        }
    }

    async fn read(&self, url: &str) -> Result<String, FetchError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return self.read_http(url).await;
        }
        let path = url.strip_prefix("file://").unwrap_or(url);
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FetchError::Network(format!("{path}: {e}")))
    }

    #[cfg(feature = "http")]
    async fn read_http(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::Network(e.to_string()))?;
        response.text().await.map_err(|e| FetchError::Network(e.to_string()))
    }

    #[cfg(not(feature = "http"))]
    async fn read_http(&self, url: &str) -> Result<String, FetchError> {
        Err(FetchError::Network(format!("http support not compiled in: {url}")))
    }
}

#[async_trait]
impl Fetcher for NetJsonFetcher {
    async fn fetch(&self, url: &str, parser: &str) -> Result<GraphSnapshot, FetchError> {
        if !SUPPORTED_PARSERS.contains(&parser) {
            return Err(FetchError::UnsupportedFormat(parser.to_string()));
        }
        let body = self.read(url).await?;
        parse_snapshot(&body, self.link_key).map_err(|e| FetchError::Parse(e.to_string()))
    }
}
