//! Rate-limit header parsing and wait calculations
//!
//! The provider communicates its quota through `x-rate-limit-limit`,
//! `x-rate-limit-remaining` and `x-rate-limit-reset` (epoch seconds) on every
//! response. The window is not persisted; it informs the current call's retry
//! decision and opportunistic pre-emptive throttling of the next call on the
//! same endpoint.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

/// Jitter factor applied to backoff delays, in `[0, 0.3)`, to avoid retry
/// storms across concurrent callers.
pub const JITTER_FACTOR: f64 = 0.3;

/// Cap on the backoff exponent to prevent overflow.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Buffer added on top of the provider-communicated reset instant.
const RESET_BUFFER: Duration = Duration::from_secs(1);

/// Remaining-call threshold below which a pre-emptive warning is logged.
pub const LOW_REMAINING_WARNING: u32 = 10;

/// A provider-communicated rate-limit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    /// Total calls allowed in the window.
    pub limit: u32,
    /// Calls remaining before the window resets.
    pub remaining: u32,
    /// Reset instant as epoch seconds.
    pub reset: i64,
}

impl RateLimitWindow {
    /// Whether the window is exhausted and its reset is still in the future.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0 && self.reset > Utc::now().timestamp()
    }
}

/// Extract the rate-limit window from response headers.
///
/// Returns `None` unless all three headers are present and parseable; the
/// provider omits them on some endpoints.
#[must_use]
pub fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimitWindow> {
    let read = |name: &str| {
        headers.get(name).and_then(|v| v.to_str().ok()).and_then(|v| v.trim().parse().ok())
    };

    Some(RateLimitWindow {
        limit: read("x-rate-limit-limit")?,
        remaining: read("x-rate-limit-remaining")?,
        reset: headers
            .get("x-rate-limit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())?,
    })
}

/// Time to wait until the rate-limit window resets, plus a one-second buffer.
///
/// Never negative: a reset in the past yields the bare buffer.
#[must_use]
pub fn calculate_wait_time(reset_epoch_seconds: i64) -> Duration {
    let now = Utc::now().timestamp();
    let wait_seconds = (reset_epoch_seconds - now).max(0) as u64;
    Duration::from_secs(wait_seconds) + RESET_BUFFER
}

/// Exponential backoff delay with multiplicative jitter.
///
/// `delay = min(max_delay, initial_delay * 2^attempt) * (1 + JITTER_FACTOR * random())`
///
/// The cap applies before jitter, so the result never exceeds
/// `max_delay * (1 + JITTER_FACTOR)`. The random source is injected so tests
/// can run the function deterministically.
#[must_use]
pub fn calculate_exponential_backoff<R: Rng + ?Sized>(
    attempt: u32,
    initial_delay: Duration,
    max_delay: Duration,
    rng: &mut R,
) -> Duration {
    let multiplier = 2_u64.saturating_pow(attempt.min(MAX_BACKOFF_EXPONENT));
    let base_millis = (initial_delay.as_millis() as u64)
        .saturating_mul(multiplier)
        .min(max_delay.as_millis() as u64);

    let jitter = 1.0 + JITTER_FACTOR * rng.gen::<f64>();
    Duration::from_millis((base_millis as f64 * jitter) as u64)
}
