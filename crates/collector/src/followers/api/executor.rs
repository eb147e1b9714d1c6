//! Rate-limited request execution
//!
//! Every provider call goes through [`RequestExecutor::execute`], which:
//! - sleeps out rate limits (HTTP 429) and re-issues the same request
//! - retries connection failures a fixed number of times with a fixed delay
//! - maps HTTP 404 to an empty result
//! - fails fast on every other non-success status

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::followers::config::CollectorConfig;
use crate::followers::core::progress::emit;
use crate::followers::core::{
    ApiRequest, CollectorError, ExecutorMetrics, ExecutorMetricsSnapshot, ProgressCallback,
    ProgressEvent, RawResponse, Result, Transport,
};

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-rate-limit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-rate-limit-remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";

/// Longest response body written to the log
const MAX_LOGGED_BODY: usize = 512;

/// Furthest ahead a reset header may point before it is treated as malformed
const MAX_RESET_AHEAD: Duration = Duration::from_secs(60 * 60);

/// How the executor treats an HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Ok,
    RateLimited,
    NotFound,
    ServerError,
    ClientError,
}

impl StatusClass {
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => StatusClass::Ok,
            404 => StatusClass::NotFound,
            429 => StatusClass::RateLimited,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::ClientError,
        }
    }
}

/// Provider rate-limit window as last reported in response headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset: Option<SystemTime>,
}

impl RateLimit {
    /// Read the rate-limit headers; `None` when the response carries none
    pub fn from_response(response: &RawResponse) -> Option<Self> {
        let limit = parse_header::<u32>(response, RATE_LIMIT_LIMIT_HEADER);
        let remaining = parse_header::<u32>(response, RATE_LIMIT_REMAINING_HEADER);
        let reset = parse_header::<u64>(response, RATE_LIMIT_RESET_HEADER)
            .and_then(|ts| reset_instant(ts, SystemTime::now()));

        if limit.is_none() && remaining.is_none() && reset.is_none() {
            return None;
        }
        Some(Self { limit, remaining, reset })
    }

    /// Check if the window is exhausted
    pub fn is_blocked(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Time until the window renews, if currently blocked
    pub fn time_until_renewal(&self) -> Option<Duration> {
        if !self.is_blocked() {
            return None;
        }
        self.reset?.duration_since(SystemTime::now()).ok()
    }
}

/// Public rate limit status for display/logging
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset: Option<SystemTime>,
    pub is_blocked: bool,
}

impl RateLimitStatus {
    /// Format rate limit status for display
    pub fn format_status(&self) -> String {
        let remaining = self.remaining.map_or("?".to_string(), |r| r.to_string());
        let limit = self.limit.map_or("?".to_string(), |l| l.to_string());
        let reset_in = self
            .reset
            .and_then(|reset| reset.duration_since(SystemTime::now()).ok())
            .map_or(0, |d| d.as_secs());

        format!(
            "Rate limit: {}/{} remaining{}, window resets in {}s",
            remaining,
            limit,
            if self.is_blocked { " (blocked)" } else { "" },
            reset_in
        )
    }
}

/// Compute how long to back off after a rate-limited response
///
/// The wait runs to the provider's reset instant plus `rate_limit_margin`. A
/// missing or malformed reset header falls back to `rate_limit_default_wait`
/// so the loop always makes forward progress; so does a reset more than an
/// hour away. The result never drops below `rate_limit_min_wait`.
pub fn rate_limit_wait(reset_header: Option<&str>, now_epoch_secs: u64, config: &CollectorConfig) -> Duration {
    let until_reset = reset_header
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|reset| Duration::from_secs(reset.saturating_sub(now_epoch_secs)))
        .filter(|until_reset| *until_reset <= MAX_RESET_AHEAD)
        .unwrap_or(config.rate_limit_default_wait);

    (until_reset + config.rate_limit_margin).max(config.rate_limit_min_wait)
}

/// Executes provider requests with rate-limit backoff and transport retries
///
/// Clones share the transport, rate-limit window and metrics, so concurrent
/// callers against the same endpoint back off together.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    config: CollectorConfig,
    rate_limit: Arc<Mutex<Option<RateLimit>>>,
    metrics: Arc<ExecutorMetrics>,
    progress: Option<ProgressCallback>,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, config: CollectorConfig) -> Self {
        Self {
            transport,
            config,
            rate_limit: Arc::new(Mutex::new(None)),
            metrics: Arc::new(ExecutorMetrics::default()),
            progress: None,
        }
    }

    /// Report rate-limit waits and retries to a progress callback
    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn metrics(&self) -> ExecutorMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Execute a GET request
    ///
    /// Returns `Ok(None)` when the provider answers 404.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Option<RawResponse>> {
        let max_attempts = self.config.transport_retries.max(1);
        let mut failures = 0usize;

        loop {
            self.wait_for_rate_limit(request).await;

            self.metrics.record_request();
            let response = match self.transport.get(request).await {
                Ok(response) => response,
                Err(failure) => {
                    failures += 1;
                    if failures >= max_attempts {
                        warn!("Giving up on {} after {} failed attempts: {}", request, failures, failure);
                        return Err(CollectorError::TransportExhausted {
                            url: request.to_string(),
                            attempts: failures,
                            last_error: failure.message,
                        });
                    }

                    let delay = self.config.transport_retry_delay;
                    debug!("Connection to {} failed ({}), retrying in {:?}", request, failure, delay);
                    emit(&self.progress, ProgressEvent::RetryAttempt {
                        url: request.to_string(),
                        attempt: failures,
                        max_attempts,
                    });
                    self.metrics.record_transport_retry(delay);
                    sleep(delay).await;
                    continue;
                }
            };

            failures = 0;
            self.update_rate_limit(&response);

            match StatusClass::from_status(response.status) {
                StatusClass::Ok => return Ok(Some(response)),
                StatusClass::NotFound => {
                    debug!("{} returned 404, treating as empty", request);
                    self.metrics.record_not_found();
                    return Ok(None);
                }
                StatusClass::RateLimited => {
                    let wait = rate_limit_wait(
                        response.header(RATE_LIMIT_RESET_HEADER),
                        now_epoch_secs(),
                        &self.config,
                    );
                    info!("Rate limited on {}, waiting {:?}", request, wait);
                    self.back_off(request, wait).await;
                    self.clear_rate_limit();
                }
                StatusClass::ServerError | StatusClass::ClientError => {
                    warn!("{} returned HTTP {}: {}", request, response.status, truncate_body(&response.body));
                    return Err(CollectorError::Api {
                        url: request.to_string(),
                        status: response.status,
                        body: response.body,
                    });
                }
            }
        }
    }

    /// Get current rate limit information
    pub fn rate_limit_status(&self) -> Option<RateLimitStatus> {
        let rate_limit = self.rate_limit.lock().unwrap_or_else(PoisonError::into_inner);
        rate_limit.as_ref().map(|limit| RateLimitStatus {
            limit: limit.limit,
            remaining: limit.remaining,
            reset: limit.reset,
            is_blocked: limit.is_blocked(),
        })
    }

    /// Wait out an exhausted window reported by an earlier response
    async fn wait_for_rate_limit(&self, request: &ApiRequest) {
        let pending = {
            let rate_limit = self.rate_limit.lock().unwrap_or_else(PoisonError::into_inner);
            rate_limit.as_ref().and_then(RateLimit::time_until_renewal)
        };

        if let Some(until_reset) = pending {
            let wait = (until_reset + self.config.rate_limit_margin).max(self.config.rate_limit_min_wait);
            debug!("Rate limit window exhausted, waiting {:?} before {}", wait, request);
            self.back_off(request, wait).await;
            self.clear_rate_limit();
        }
    }

    async fn back_off(&self, request: &ApiRequest, wait: Duration) {
        emit(&self.progress, ProgressEvent::RateLimited {
            url: request.to_string(),
            wait,
        });
        self.metrics.record_rate_limit_wait(wait);
        sleep(wait).await;
    }

    /// Update rate limit information from response headers
    fn update_rate_limit(&self, response: &RawResponse) {
        if let Some(limit) = RateLimit::from_response(response) {
            debug!("Rate limit updated: {:?}/{:?} remaining", limit.remaining, limit.limit);
            *self.rate_limit.lock().unwrap_or_else(PoisonError::into_inner) = Some(limit);
        }
    }

    fn clear_rate_limit(&self) {
        *self.rate_limit.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

fn parse_header<T: std::str::FromStr>(response: &RawResponse, name: &str) -> Option<T> {
    response.header(name).and_then(|v| v.trim().parse().ok())
}

/// Reset instant for an epoch timestamp, `None` if unrepresentable or too far ahead
fn reset_instant(epoch_secs: u64, now: SystemTime) -> Option<SystemTime> {
    let reset = UNIX_EPOCH.checked_add(Duration::from_secs(epoch_secs))?;
    match reset.duration_since(now) {
        Ok(ahead) if ahead > MAX_RESET_AHEAD => None,
        _ => Some(reset),
    }
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_LOGGED_BODY {
        return body.to_string();
    }
    let mut end = MAX_LOGGED_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
