// src/ingest/fetcher.rs
//! Concurrent feed retrieval: bounded in-flight requests, per-request timeout,
//! a fixed retry budget for transient failures, and per-feed failure isolation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use metrics::{counter, histogram};
use rand::seq::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use tokio::sync::Semaphore;

use crate::config::FetchSettings;
use crate::ingest::types::{FeedTarget, FetchOutcome, RawFeedDocument};

pub const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:90.0) Gecko/20100101 Firefox/90.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Mobile/15E148 Safari/604.1",
];

const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.5";
const REFERER_VALUE: &str = "https://www.google.com/";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    /// Timeouts and non-success statuses are worth one more try; anything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Timeout(_) | FetchError::Status(_))
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// HTTP seam. The fetcher owns timeouts and retries; a transport performs one GET.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<TransportResponse, FetchError>;
    fn name(&self) -> &'static str;
}

/// Default transport backed by a pooled `reqwest::Client`.
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(settings: &FetchSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.timeout())
            .timeout(settings.timeout())
            .pool_max_idle_per_host(settings.max_concurrency)
            .build()?;
        Ok(Self { http })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl FeedTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<TransportResponse, FetchError> {
        let resp = self
            .http
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Ok(TransportResponse {
                status,
                body: String::new(),
            });
        }
        let body = resp.text().await.map_err(map_reqwest_error)?;
        Ok(TransportResponse { status, body })
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}

fn map_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(Duration::ZERO)
    } else {
        FetchError::Transport(e.to_string())
    }
}

/// Upgrade plaintext feed URLs to https, except `feeds.*` hosts which often lack TLS.
pub fn upgrade_to_https(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) if !rest.starts_with("feeds.") => format!("https://{rest}"),
        _ => url.to_string(),
    }
}

/// Browser-like headers with a user agent picked from the fixed pool.
pub fn request_headers() -> HeaderMap {
    let ua = USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0]);
    let mut h = HeaderMap::new();
    h.insert(USER_AGENT, HeaderValue::from_static(ua));
    h.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
    h.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));
    h.insert(REFERER, HeaderValue::from_static(REFERER_VALUE));
    h
}

struct Inner {
    transport: Arc<dyn FeedTransport>,
    limiter: Semaphore,
    settings: FetchSettings,
}

/// Cheap to clone; clones share the transport and the in-flight limiter.
#[derive(Clone)]
pub struct FeedFetcher {
    inner: Arc<Inner>,
}

impl FeedFetcher {
    pub fn new(transport: Arc<dyn FeedTransport>, settings: FetchSettings) -> Self {
        let permits = settings.max_concurrency.max(1);
        Self {
            inner: Arc::new(Inner {
                transport,
                limiter: Semaphore::new(permits),
                settings,
            }),
        }
    }

    pub fn with_reqwest(settings: FetchSettings) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(&settings)?;
        Ok(Self::new(Arc::new(transport), settings))
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.inner.settings
    }

    /// Fetch every target and wait until all have settled. One outcome per target,
    /// in target order. A panicking task is reported as a failed outcome.
    pub async fn fetch_all(&self, targets: &[FeedTarget]) -> Vec<FetchOutcome> {
        tracing::debug!(
            transport = self.inner.transport.name(),
            feeds = targets.len(),
            max_concurrency = self.inner.settings.max_concurrency,
            "fetching feeds"
        );
        let handles: Vec<_> = targets
            .iter()
            .cloned()
            .map(|target| {
                let this = self.clone();
                tokio::spawn(async move { this.fetch_one(&target).await })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(targets)
            .map(|(joined, target)| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(source = %target.source, url = %target.url, error = ?e, "fetch task failed");
                    counter!("ingest_feed_failures_total").increment(1);
                    FetchOutcome::Failed {
                        source: target.source.clone(),
                        url: target.url.clone(),
                        reason: format!("task failed: {e}"),
                    }
                }
            })
            .collect()
    }

    /// Fetch a single target with the configured attempt budget.
    pub async fn fetch_one(&self, target: &FeedTarget) -> FetchOutcome {
        let url = upgrade_to_https(&target.url);
        let max_attempts = self.inner.settings.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            match self.attempt(&url).await {
                Ok(body) => {
                    tracing::debug!(source = %target.source, %url, attempt, bytes = body.len(), "feed fetched");
                    return FetchOutcome::Fetched(RawFeedDocument {
                        source: target.source.clone(),
                        url,
                        body,
                    });
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    tracing::warn!(source = %target.source, %url, attempt, error = %e, "retrying feed");
                    counter!("ingest_fetch_retries_total").increment(1);
                    tokio::time::sleep(self.inner.settings.retry_delay()).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(source = %target.source, %url, attempt, error = %e, "feed dropped");
                    counter!("ingest_feed_failures_total").increment(1);
                    return FetchOutcome::Failed {
                        source: target.source.clone(),
                        url,
                        reason: e.to_string(),
                    };
                }
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<String, FetchError> {
        let _permit = self
            .inner
            .limiter
            .acquire()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        counter!("ingest_fetch_attempts_total").increment(1);
        let timeout = self.inner.settings.timeout();
        let t0 = Instant::now();
        let res = tokio::time::timeout(timeout, self.inner.transport.get(url, request_headers())).await;
        histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let resp = match res {
            Err(_) => return Err(FetchError::Timeout(timeout)),
            Ok(Err(FetchError::Timeout(_))) => return Err(FetchError::Timeout(timeout)),
            Ok(Err(e)) => return Err(e),
            Ok(Ok(resp)) => resp,
        };
        if !(200..300).contains(&resp.status) {
            return Err(FetchError::Status(resp.status));
        }
        Ok(resp.body)
    }
}
