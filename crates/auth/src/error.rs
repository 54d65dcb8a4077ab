//! Error types for the login flow and provider API client
//!
//! The taxonomy mirrors how failures must be presented to callers:
//!
//! - Handshake errors are user-actionable ("please restart login") and are
//!   never conflated with provider-side failures.
//! - Credential/config errors indicate operator misconfiguration and are
//!   terminal; they must stand out in logs and alerts.
//! - Token invalidity forces a full re-authentication.
//! - Transient provider failures surface only after the retry budget is
//!   exhausted, as a single "temporarily unavailable" error.

use reqwest::StatusCode;
use thiserror::Error;

/// Error raised by a durable key-value backing store.
///
/// The durable store is a best-effort mirror; callers log and degrade on this
/// error rather than failing the login flow.
#[derive(Debug, Error)]
#[error("durable store error: {0}")]
pub struct StoreError(pub String);

/// Errors produced by the resilient API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The provider answered with a non-retryable 4xx status.
    #[error("provider returned {status}: {body}")]
    Terminal { status: StatusCode, body: String },

    /// Every attempt failed with a retryable condition (429, 5xx, network).
    #[error("provider unavailable after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    /// The request could not be built or cloned for retrying.
    #[error("request could not be constructed: {0}")]
    Request(String),

    /// The response body did not match the expected shape.
    #[error("response could not be parsed: {0}")]
    Parse(String),
}

impl ApiError {
    /// Whether the underlying condition was transient.
    ///
    /// `Exhausted` is transient by definition: every individual failure that
    /// fed into it was retryable. `Terminal`, `Request` and `Parse` are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Errors surfaced by the high-level authentication service.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No handshake record exists for the callback state token.
    ///
    /// Raised when the state is unknown or was already consumed (records are
    /// single-use). The user must restart login.
    #[error("login session not found; please restart login")]
    HandshakeNotFound,

    /// The handshake record exists but its TTL has elapsed.
    #[error("login session expired; please restart login")]
    HandshakeExpired,

    /// The provider rejected the authorization code (invalid, expired, or
    /// already redeemed). The user must log in again.
    #[error("authorization code rejected by provider: {0}")]
    CodeExchangeFailed(String),

    /// The provider rejected our client credentials. This is an operator
    /// misconfiguration, not a user error, and must never be retried.
    #[error("identity provider rejected client credentials: {0}")]
    ProviderConfig(String),

    /// The refresh token is permanently dead; a full re-login is required.
    #[error("refresh token is no longer valid; re-authentication required")]
    RefreshTokenInvalid,

    /// The provider granted fewer scopes than were requested.
    #[error("provider did not grant required scopes: {missing}")]
    ScopeNotGranted { missing: String },

    /// Transient provider failures exhausted the retry budget.
    #[error("identity provider temporarily unavailable: {0}")]
    ServiceUnavailable(String),

    /// Uncategorized client plumbing failure.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AuthError {
    /// Whether the caller may retry the same operation later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServiceUnavailable(_) => true,
            Self::Api(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether this error indicates operator misconfiguration that should be
    /// alerted on rather than shown to the user as their own mistake.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::ProviderConfig(_))
    }

    /// Fold a transport error into the service taxonomy: an exhausted retry
    /// budget becomes "temporarily unavailable", everything else passes
    /// through for the caller to classify.
    pub(crate) fn from_transport(error: ApiError) -> Self {
        match error {
            ApiError::Exhausted { attempts, last_error } => Self::ServiceUnavailable(format!(
                "provider unreachable after {attempts} attempts: {last_error}"
            )),
            other => Self::Api(other),
        }
    }

    /// Whether the user can resolve this error by restarting the login flow.
    #[must_use]
    pub fn requires_relogin(&self) -> bool {
        matches!(
            self,
            Self::HandshakeNotFound
                | Self::HandshakeExpired
                | Self::CodeExchangeFailed(_)
                | Self::RefreshTokenInvalid
        )
    }
}
