//! Token exchange and refresh against the provider token endpoint
//!
//! Both operations authenticate with HTTP Basic (confidential client) and
//! POST form-encoded grants. The provider rotates refresh tokens: every
//! successful refresh invalidates the presented token and issues a new one,
//! so refreshes for the same principal are serialized behind an async mutex
//! to keep concurrent callers from burning each other's tokens.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::config::ProviderConfig;
use crate::error::{ApiError, AuthError};

const TOKEN_ENDPOINT: &str = "/2/oauth2/token";

/// A provider-issued token set.
#[derive(Debug, Clone)]
pub struct TokenSet {
    /// Bearer token for user-context API calls.
    pub access_token: String,
    /// Rotating refresh token. Present when `offline.access` was granted.
    pub refresh_token: Option<String>,
    /// Absolute expiry of the access token.
    pub expires_at: DateTime<Utc>,
    /// Space-delimited scopes actually granted.
    pub scope: String,
}

impl TokenSet {
    /// Whether the access token has expired (with a 60s early margin so
    /// in-flight requests don't race the expiry).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() + chrono::Duration::seconds(60) >= self.expires_at
    }
}

/// Wire shape of a successful token-endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
    #[serde(default)]
    scope: String,
}

/// Wire shape of an OAuth error response body.
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Client for the provider token endpoint.
pub struct TokenClient<'a> {
    client: &'a ApiClient,
    config: &'a ProviderConfig,
}

impl<'a> TokenClient<'a> {
    pub fn new(client: &'a ApiClient, config: &'a ProviderConfig) -> Self {
        Self { client, config }
    }

    /// Redeem an authorization code for a token set.
    ///
    /// `redirect_uri` and `code_verifier` must be the exact values from the
    /// handshake record; the provider validates both.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet, AuthError> {
        debug!("exchanging authorization code for tokens");

        let request = self
            .client
            .http()
            .post(self.config.token_url())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("code_verifier", code_verifier),
                ("client_id", self.config.client_id.as_str()),
            ]);

        let response = self
            .client
            .execute_with::<TokenResponse>(TOKEN_ENDPOINT, request, &self.config.login_retry)
            .await
            .map_err(|e| classify_token_error(e, GrantKind::AuthorizationCode))?;

        let tokens = into_token_set(response.body);
        self.validate_scopes(&tokens.scope)?;
        info!("authorization code exchanged successfully");
        Ok(tokens)
    }

    /// Redeem a refresh token for a fresh token set.
    ///
    /// On success the presented token is dead; callers must persist
    /// `refresh_token` from the returned set before using the new access
    /// token. A 400/401 here means the token was already rotated or revoked
    /// and a full re-login is the only way forward.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        debug!("refreshing access token");

        let request = self
            .client
            .http()
            .post(self.config.token_url())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.config.client_id.as_str()),
            ]);

        let response = self
            .client
            .execute_with::<TokenResponse>(TOKEN_ENDPOINT, request, &self.config.login_retry)
            .await
            .map_err(|e| classify_token_error(e, GrantKind::RefreshToken))?;

        let tokens = into_token_set(response.body);
        if tokens.refresh_token.is_none() {
            // Should not happen with offline.access granted; worth surfacing
            // because the session will silently die at the next expiry.
            warn!("provider did not rotate a refresh token");
        }
        info!("access token refreshed");
        Ok(tokens)
    }

    /// Verify that every configured scope was actually granted.
    pub fn validate_scopes(&self, granted: &str) -> Result<(), AuthError> {
        let granted: Vec<&str> = granted.split_whitespace().collect();
        let missing: Vec<&str> = self
            .config
            .scopes
            .iter()
            .map(String::as_str)
            .filter(|required| !granted.contains(required))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuthError::ScopeNotGranted { missing: missing.join(" ") })
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum GrantKind {
    AuthorizationCode,
    RefreshToken,
}

fn into_token_set(response: TokenResponse) -> TokenSet {
    TokenSet {
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        expires_at: Utc::now() + chrono::Duration::seconds(response.expires_in),
        scope: response.scope,
    }
}

/// Map a transport-level error from the token endpoint onto the auth error
/// taxonomy.
///
/// `invalid_client` is operator misconfiguration regardless of grant. For
/// authorization-code grants, other 4xx responses mean the code was bad; for
/// refresh grants they mean the refresh token is dead.
fn classify_token_error(error: ApiError, grant: GrantKind) -> AuthError {
    match error {
        ApiError::Terminal { status, body } => {
            let parsed: OAuthErrorBody = serde_json::from_str(&body).unwrap_or(OAuthErrorBody {
                error: String::new(),
                error_description: String::new(),
            });

            if parsed.error == "invalid_client" || status == reqwest::StatusCode::UNAUTHORIZED {
                if matches!(grant, GrantKind::RefreshToken)
                    && parsed.error != "invalid_client"
                {
                    return AuthError::RefreshTokenInvalid;
                }
                return AuthError::ProviderConfig(describe(&parsed, status));
            }

            match grant {
                GrantKind::AuthorizationCode => {
                    AuthError::CodeExchangeFailed(describe(&parsed, status))
                }
                GrantKind::RefreshToken => AuthError::RefreshTokenInvalid,
            }
        }
        ApiError::Exhausted { attempts, last_error } => AuthError::ServiceUnavailable(format!(
            "token endpoint unreachable after {attempts} attempts: {last_error}"
        )),
        other => AuthError::Api(other),
    }
}

fn describe(parsed: &OAuthErrorBody, status: reqwest::StatusCode) -> String {
    if parsed.error.is_empty() {
        format!("status {status}")
    } else if parsed.error_description.is_empty() {
        parsed.error.clone()
    } else {
        format!("{}: {}", parsed.error, parsed.error_description)
    }
}
