//! Usage recording hook
//!
//! Every provider API invocation reports its outcome to a [`UsageRecorder`]
//! for observability and cost tracking. The recorder is an external
//! collaborator: implementations must be cheap and must never fail the
//! calling request (record at their own boundary, swallow their own errors).

use crate::ratelimit::RateLimitWindow;

/// Fire-and-forget telemetry sink for provider API call outcomes.
pub trait UsageRecorder: Send + Sync {
    /// Record one provider call.
    ///
    /// `endpoint` is the request path (no host, no query), `window` the
    /// rate-limit snapshot from the response if present, and `success`
    /// whether the call reached the provider and was accepted (429 counts as
    /// reaching the provider).
    fn record(&self, endpoint: &str, window: Option<RateLimitWindow>, success: bool);
}

/// Recorder that discards everything. Default when no telemetry is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageRecorder;

impl UsageRecorder for NoopUsageRecorder {
    fn record(&self, _endpoint: &str, _window: Option<RateLimitWindow>, _success: bool) {}
}
