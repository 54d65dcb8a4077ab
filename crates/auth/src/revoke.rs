//! Token revocation
//!
//! Logout revokes tokens at the provider so they cannot be replayed. The
//! provider treats unknown or already-revoked tokens as success, and so does
//! this client: revocation is best-effort and runs with a single attempt.

use serde::Deserialize;
use tracing::{debug, info};

use crate::client::ApiClient;
use crate::config::{ProviderConfig, RetryOptions};
use crate::error::AuthError;

const REVOKE_ENDPOINT: &str = "/2/oauth2/revoke";

/// Which kind of token is being revoked, passed as `token_type_hint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn hint(self) -> &'static str {
        match self {
            Self::Access => "access_token",
            Self::Refresh => "refresh_token",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RevokeResponse {
    #[serde(default)]
    revoked: bool,
}

/// Client for the provider revocation endpoint.
pub struct RevocationClient<'a> {
    client: &'a ApiClient,
    config: &'a ProviderConfig,
}

impl<'a> RevocationClient<'a> {
    pub fn new(client: &'a ApiClient, config: &'a ProviderConfig) -> Self {
        Self { client, config }
    }

    /// Revoke a single token. Succeeds even if the provider reports the token
    /// as already gone; the returned flag is the provider's acknowledgement
    /// and is purely informational.
    pub async fn revoke(&self, token: &str, kind: TokenKind) -> Result<bool, AuthError> {
        debug!(kind = kind.hint(), "revoking token");

        let request = self
            .client
            .http()
            .post(self.config.revoke_url())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("token", token),
                ("token_type_hint", kind.hint()),
                ("client_id", self.config.client_id.as_str()),
            ]);

        let response = self
            .client
            .execute_with::<RevokeResponse>(
                REVOKE_ENDPOINT,
                request,
                &RetryOptions::single_attempt(),
            )
            .await
            .map_err(AuthError::from_transport)?;

        if !response.body.revoked {
            debug!(kind = kind.hint(), "provider reported token as not revoked");
        }
        info!(kind = kind.hint(), revoked = response.body.revoked, "token revocation completed");
        Ok(response.body.revoked)
    }
}
