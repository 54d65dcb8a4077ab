//! Provider and retry configuration
//!
//! `ProviderConfig` carries everything needed to talk to the identity
//! provider: confidential-client credentials, endpoint URLs, requested
//! scopes, and the provider-specific parameters that force an interactive
//! login screen. Endpoint URLs default to the X (Twitter) v2 API but are
//! plain fields so tests and alternative deployments can point them at a
//! mock server.

use std::time::Duration;

/// Retry budget and timeout for a class of provider calls.
///
/// The worst-case latency of a call is bounded by
/// `sum(attempt delays) + max_retries * request_timeout`; defaults are chosen
/// so both call classes stay well under typical HTTP gateway timeouts.
#[derive(Debug, Clone, Copy)]
pub struct RetryOptions {
    /// Maximum number of attempts (initial try included).
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub initial_delay: Duration,
    /// Cap applied to the backoff delay before jitter.
    pub max_delay: Duration,
    /// Per-attempt request timeout.
    pub request_timeout: Duration,
}

impl RetryOptions {
    /// Budget for login-critical calls (token exchange, refresh, profile).
    #[must_use]
    pub fn login() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
        }
    }

    /// Reduced budget for secondary lookups (relationship checks).
    ///
    /// Matches the fast-fail tuning of the relationship path: a degraded
    /// lookup must never stall the login flow behind long waits.
    #[must_use]
    pub fn lookup() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Single attempt, no retries. Used for fire-and-forget revocation.
    #[must_use]
    pub fn single_attempt() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::login()
    }
}

/// Identity provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// OAuth client identifier.
    pub client_id: String,
    /// OAuth client secret (confidential client).
    pub client_secret: String,
    /// Interactive authorization endpoint.
    pub authorize_url: String,
    /// Base URL for the provider REST API (token, revoke, users).
    pub api_base: String,
    /// Scopes requested at authorization time.
    pub scopes: Vec<String>,
    /// App-only bearer token for lookups that run without a user context.
    pub bearer_token: Option<String>,
    /// Extra query parameters appended when the caller requests a forced
    /// interactive login. Provider-specific and deliberately configurable:
    /// the exact parameter set is brittle across provider API changes.
    pub force_login_params: Vec<(String, String)>,
    /// User-Agent header for outbound calls.
    pub user_agent: String,
    /// TTL for handshake records awaiting their callback.
    pub handshake_ttl: Duration,
    /// TTL for cached relationship results.
    pub relationship_ttl: Duration,
    /// Retry budget for login-critical calls.
    pub login_retry: RetryOptions,
    /// Retry budget for secondary lookups.
    pub lookup_retry: RetryOptions,
}

impl ProviderConfig {
    /// Create a configuration with provider defaults for the given client
    /// credentials.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorize_url: "https://twitter.com/i/oauth2/authorize".to_string(),
            api_base: "https://api.twitter.com".to_string(),
            scopes: vec![
                "users.read".to_string(),
                "tweet.read".to_string(),
                "follows.read".to_string(),
                "offline.access".to_string(),
            ],
            bearer_token: None,
            force_login_params: vec![("prompt".to_string(), "login".to_string())],
            user_agent: concat!("fankit-auth/", env!("CARGO_PKG_VERSION")).to_string(),
            handshake_ttl: Duration::from_secs(30 * 60),
            relationship_ttl: Duration::from_secs(24 * 60 * 60),
            login_retry: RetryOptions::login(),
            lookup_retry: RetryOptions::lookup(),
        }
    }

    /// Point every endpoint at the given base URL (used by tests against a
    /// mock provider).
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Override the interactive authorization endpoint.
    #[must_use]
    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    /// Set the app-only bearer token for user-context-free lookups.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Token exchange / refresh endpoint.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/2/oauth2/token", self.api_base)
    }

    /// Token revocation endpoint.
    #[must_use]
    pub fn revoke_url(&self) -> String {
        format!("{}/2/oauth2/revoke", self.api_base)
    }

    /// Authenticated-user profile endpoint.
    #[must_use]
    pub fn users_me_url(&self) -> String {
        format!("{}/2/users/me", self.api_base)
    }

    /// Profile-by-handle lookup endpoint.
    #[must_use]
    pub fn user_by_handle_url(&self, handle: &str) -> String {
        format!("{}/2/users/by/username/{}", self.api_base, handle)
    }

    /// Relationship-set (following list) endpoint for a user id.
    #[must_use]
    pub fn following_url(&self, user_id: &str) -> String {
        format!("{}/2/users/{}/following", self.api_base, user_id)
    }

    /// Requested scopes as the space-delimited string sent to the provider.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}
