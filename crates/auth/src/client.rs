//! Rate-limit-aware resilient HTTP client
//!
//! Every provider API call goes through [`ApiClient::execute_with`], which
//! owns the retry loop: exponential backoff with jitter for transient
//! failures, header-driven waits for 429s, and pre-emptive throttling when a
//! previous response on the same endpoint reported an exhausted window.
//!
//! Sleeping is behind the [`Sleeper`] trait so tests can collect the delays
//! the loop would have taken instead of actually waiting them out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::RetryOptions;
use crate::error::ApiError;
use crate::ratelimit::{
    calculate_exponential_backoff, calculate_wait_time, parse_rate_limit, RateLimitWindow,
    LOW_REMAINING_WARNING,
};
use crate::usage::{NoopUsageRecorder, UsageRecorder};

/// Async sleep abstraction, injectable for tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A successful provider response with its rate-limit snapshot.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// Deserialized response body.
    pub body: T,
    /// Rate-limit window from the response headers, if the endpoint sends
    /// them.
    pub window: Option<RateLimitWindow>,
}

/// HTTP client wrapper that owns retry, backoff, and rate-limit behavior.
pub struct ApiClient {
    http: reqwest::Client,
    sleeper: Arc<dyn Sleeper>,
    usage: Arc<dyn UsageRecorder>,
    // Last-seen window per endpoint path, for pre-emptive throttling. Purely
    // opportunistic: it only reflects responses this process has seen.
    windows: RwLock<HashMap<String, RateLimitWindow>>,
}

impl ApiClient {
    /// Build a client with the given User-Agent and default collaborators.
    pub fn new(user_agent: &str) -> Result<Self, ApiError> {
        Self::with_collaborators(
            user_agent,
            Arc::new(TokioSleeper),
            Arc::new(NoopUsageRecorder),
        )
    }

    /// Build a client with explicit sleep and usage-recording collaborators.
    pub fn with_collaborators(
        user_agent: &str,
        sleeper: Arc<dyn Sleeper>,
        usage: Arc<dyn UsageRecorder>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| ApiError::Request(format!("http client construction failed: {e}")))?;

        Ok(Self { http, sleeper, usage, windows: RwLock::new(HashMap::new()) })
    }

    /// Underlying HTTP client, for building requests to execute through
    /// [`Self::execute_with`].
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Whether the last-seen window for `endpoint` is exhausted with a reset
    /// still in the future.
    ///
    /// Best-effort callers use this to skip a call entirely rather than wait.
    #[must_use]
    pub fn is_rate_limited(&self, endpoint: &str) -> bool {
        self.windows.read().get(endpoint).is_some_and(RateLimitWindow::is_exhausted)
    }

    /// Last-seen rate-limit window for `endpoint`, if any.
    #[must_use]
    pub fn last_window(&self, endpoint: &str) -> Option<RateLimitWindow> {
        self.windows.read().get(endpoint).copied()
    }

    /// Execute a request with retries, deserializing the success body as `T`.
    ///
    /// `endpoint` is the logical request path (no host, no query); it keys
    /// both the per-endpoint window snapshot and usage recording. Retryable
    /// conditions are 429, 5xx, and network errors; any other non-2xx status
    /// terminates immediately as [`ApiError::Terminal`].
    pub async fn execute_with<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
        options: &RetryOptions,
    ) -> Result<ApiResponse<T>, ApiError> {
        // Pre-emptive throttle: a known-exhausted window means the call is
        // guaranteed to 429, so wait out the reset instead of burning an
        // attempt on it.
        if let Some(window) = self.last_window(endpoint) {
            if window.is_exhausted() {
                let wait = calculate_wait_time(window.reset);
                warn!(endpoint, wait_secs = wait.as_secs(), "rate limit exhausted; waiting for reset");
                self.sleeper.sleep(wait).await;
            }
        }

        let mut last_error = String::from("no attempts made");

        for attempt in 0..options.max_retries {
            let attempt_request = request
                .try_clone()
                .ok_or_else(|| {
                    ApiError::Request("request body is not cloneable for retrying".to_string())
                })?
                .timeout(options.request_timeout);

            let response = match attempt_request.send().await {
                Ok(response) => response,
                Err(e) => {
                    last_error = format!("network error: {e}");
                    self.usage.record(endpoint, None, false);
                    debug!(endpoint, attempt, error = %e, "request failed; will retry");
                    self.backoff(attempt, options).await;
                    continue;
                }
            };

            let status = response.status();
            let window = parse_rate_limit(response.headers());
            self.note_window(endpoint, window);
            self.usage.record(endpoint, window, status.is_success());

            if status.is_success() {
                let body = response
                    .json::<T>()
                    .await
                    .map_err(|e| ApiError::Parse(format!("{endpoint}: {e}")))?;
                return Ok(ApiResponse { body, window });
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                last_error = format!("rate limited (429) on {endpoint}");
                // Waiting out the reset makes sense only with a retry left;
                // after the final attempt it would stall the caller for
                // nothing.
                if attempt + 1 >= options.max_retries {
                    continue;
                }
                let wait = window
                    .map(|w| calculate_wait_time(w.reset))
                    .unwrap_or_else(|| {
                        calculate_exponential_backoff(
                            attempt,
                            options.initial_delay,
                            options.max_delay,
                            &mut rand::thread_rng(),
                        )
                    });
                warn!(endpoint, attempt, wait_secs = wait.as_secs(), "rate limited; waiting");
                self.sleeper.sleep(wait).await;
                continue;
            }

            if status.is_server_error() {
                last_error = format!("server error {status} on {endpoint}");
                debug!(endpoint, attempt, %status, "server error; will retry");
                self.backoff(attempt, options).await;
                continue;
            }

            // Non-retryable client error: surface the body for diagnostics.
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Terminal { status, body });
        }

        Err(ApiError::Exhausted { attempts: options.max_retries, last_error })
    }

    async fn backoff(&self, attempt: u32, options: &RetryOptions) {
        // No point sleeping after the final attempt.
        if attempt + 1 >= options.max_retries {
            return;
        }
        let delay = calculate_exponential_backoff(
            attempt,
            options.initial_delay,
            options.max_delay,
            &mut rand::thread_rng(),
        );
        self.sleeper.sleep(delay).await;
    }

    fn note_window(&self, endpoint: &str, window: Option<RateLimitWindow>) {
        let Some(window) = window else { return };
        if window.remaining < LOW_REMAINING_WARNING {
            warn!(
                endpoint,
                remaining = window.remaining,
                limit = window.limit,
                reset = window.reset,
                "rate limit running low"
            );
        }
        self.windows.write().insert(endpoint.to_string(), window);
    }
}
