use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use miette::Diagnostic;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("{url} returned status 404")]
    NotFound { url: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("request for {url} failed: {message}")]
    Transport { url: String, message: String },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::NotFound { .. } => Some(404),
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// Every outbound request in the pipeline goes through this trait; no stage
/// talks to the network directly.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// Token bucket shared by all concurrent callers. Debt is allowed to go
/// negative so that callers queueing up under contention are spaced out at
/// exactly the configured rate.
struct TokenBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    fn new(rps: u32, now: Instant) -> Self {
        let rate = f64::from(rps.max(1));
        Self {
            rate,
            capacity: rate,
            tokens: rate,
            refilled_at: now,
        }
    }

    /// Takes one token, returning how long the caller must wait before its
    /// request may go out.
    fn take(&mut self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.refilled_at);
        self.refilled_at = now;
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.capacity);
        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.rate)
        }
    }
}

pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    pub fn new(rps: u32) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(rps, Instant::now())),
        }
    }

    pub async fn acquire(&self) {
        let delay = self.bucket.lock().await.take(Instant::now());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// HTTP fetcher with a global requests-per-second budget and bounded retry.
///
/// Retries transient failures (429, any 5xx, connection errors) with
/// exponential backoff. A 404 is surfaced immediately so fallback logic can
/// act on it; other client errors are not retried either.
pub struct HttpFetcher {
    client: reqwest::Client,
    limiter: RateLimiter,
    retries: u32,
    backoff_base: Duration,
}

const BACKOFF_BASE_MS: u64 = 500;

impl HttpFetcher {
    pub fn new(rps: u32, retries: u32) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("phet-harvest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FetchError::Client(err.to_string()))?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| FetchError::Client(err.to_string()))?;
        Ok(Self {
            client,
            limiter: RateLimiter::new(rps),
            retries,
            backoff_base: Duration::from_millis(BACKOFF_BASE_MS),
        })
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let mut attempt = 0u32;
        loop {
            self.limiter.acquire().await;
            let outcome = self.client.get(url).send().await;
            match outcome {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if status == 404 {
                        return Err(FetchError::NotFound {
                            url: url.to_string(),
                        });
                    }
                    if response.status().is_success() {
                        return response.bytes().await.map_err(|err| FetchError::Transport {
                            url: url.to_string(),
                            message: err.to_string(),
                        });
                    }
                    if attempt < self.retries && is_retryable_status(status) {
                        let delay = self.backoff_base * 2u32.saturating_pow(attempt);
                        debug!(url, status, attempt, "retrying after {:?}", delay);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Status {
                        url: url.to_string(),
                        status,
                    });
                }
                Err(err) => {
                    if attempt < self.retries {
                        let delay = self.backoff_base * 2u32.saturating_pow(attempt);
                        debug!(url, attempt, "connection error, retrying after {:?}", delay);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_allows_burst_up_to_capacity() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(8, start);
        for _ in 0..8 {
            assert_eq!(bucket.take(start), Duration::ZERO);
        }
        let delay = bucket.take(start);
        assert!(delay > Duration::ZERO);
        assert!(delay <= Duration::from_millis(130));
    }

    #[test]
    fn bucket_spaces_out_queued_callers() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(2, start);
        bucket.take(start);
        bucket.take(start);
        let first = bucket.take(start);
        let second = bucket.take(start);
        assert!(second > first);
        assert_eq!(second.as_millis(), 1000);
    }

    #[test]
    fn bucket_refills_over_time() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(4, start);
        for _ in 0..4 {
            bucket.take(start);
        }
        let later = start + Duration::from_secs(2);
        assert_eq!(bucket.take(later), Duration::ZERO);
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(599));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(403));
        assert!(!is_retryable_status(200));
    }

    #[test]
    fn not_found_reports_status() {
        let err = FetchError::NotFound {
            url: "https://example.org/x".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.status(), Some(404));
    }
}
