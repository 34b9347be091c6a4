//! HTTP client for polite portal fetching
//!
//! `PageFetcher` is the seam the crawl core depends on; `HttpClient` is the
//! production implementation (reqwest + governor rate limiting + adaptive
//! pacing). Non-success statuses come back as responses so the caller can
//! classify them; only transport problems are errors.

use async_trait::async_trait;
use governor::{Quota, RateLimiter, clock::DefaultClock, state::{InMemoryState, direct::NotKeyed}};
use reqwest::{Client, header::{HeaderMap, HeaderValue, USER_AGENT}};
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::infrastructure::config::{HttpConfig, PacingConfig};
use crate::infrastructure::pacing::{AutoThrottle, BurstPause};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("Client setup failed: {0}")]
    Setup(String),
}

impl FetchError {
    /// Whether another attempt might succeed
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout(_))
    }
}

/// Raw response handed to the classifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
    pub elapsed: Duration,
}

impl HttpResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            body: body.into(),
            elapsed: Duration::ZERO,
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

/// Rate-limited, paced HTTP client
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    throttle: AutoThrottle,
    burst: BurstPause,
    config: HttpConfig,
}

impl HttpClient {
    pub fn new(config: &HttpConfig, pacing: &PacingConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| FetchError::Setup(format!("Invalid user agent: {e}")))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Setup(format!("Failed to create HTTP client: {e}")))?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second)
                .ok_or_else(|| FetchError::Setup("Rate limit must be greater than 0".into()))?,
        );

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            throttle: AutoThrottle::new(pacing),
            burst: BurstPause::new(&pacing.burst_pauses),
            config: config.clone(),
        })
    }

    pub const fn config(&self) -> &HttpConfig {
        &self.config
    }

    pub fn current_delay(&self) -> Duration {
        self.throttle.current_delay()
    }

    async fn pace(&self) {
        self.rate_limiter.until_ready().await;
        let wait = self.throttle.reserve();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<HttpResponse, FetchError> {
        self.pace().await;

        tracing::debug!("Fetching URL: {}", url);
        let started = Instant::now();

        let result = async {
            let response = self.client.get(url).send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        }
        .await;

        if let Some(pause) = self.burst.tick() {
            tracing::info!(
                requests = self.burst.requests_seen(),
                "⏸️ Burst pause for {:?}",
                pause
            );
            tokio::time::sleep(pause).await;
        }

        let elapsed = started.elapsed();
        match result {
            Ok((status, body)) => {
                let success = (200..300).contains(&status);
                self.throttle.record(elapsed, success);
                tracing::debug!(status, bytes = body.len(), "Fetched {} in {:?}", url, elapsed);
                Ok(HttpResponse {
                    url: url.to_string(),
                    status,
                    body,
                    elapsed,
                })
            }
            Err(e) => {
                self.throttle.record(elapsed, false);
                if e.is_timeout() {
                    Err(FetchError::Timeout(url.to_string()))
                } else {
                    Err(FetchError::Transport {
                        url: url.to_string(),
                        message: e.to_string(),
                    })
                }
            }
        }
    }
}
