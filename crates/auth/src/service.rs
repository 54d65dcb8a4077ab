//! High-level authentication service
//!
//! Ties the handshake store, token endpoint, profile lookups, relationship
//! checks and revocation into the login lifecycle the application consumes:
//! `begin_login` -> provider redirect -> `complete_login`, then `refresh` to
//! keep the session alive and `logout` to end it.

use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use crate::authorize::build_authorize_url;
use crate::client::{ApiClient, Sleeper, TokioSleeper};
use crate::config::ProviderConfig;
use crate::error::AuthError;
use crate::handshake::{
    HandshakeLookup, HandshakeRecord, HandshakeStore, KeyValueStore, TieredHandshakeStore,
};
use crate::pkce::PkceChallenge;
use crate::profile::{ProfileClient, UserProfile};
use crate::relationship::{RelationshipCache, RelationshipChecker, RelationshipStatus};
use crate::revoke::{RevocationClient, TokenKind};
use crate::token::{TokenClient, TokenSet};
use crate::usage::{NoopUsageRecorder, UsageRecorder};

/// What the application needs to redirect the user to the provider.
#[derive(Debug)]
pub struct LoginRedirect {
    /// Full provider authorization URL.
    pub url: Url,
    /// CSRF state token; the callback must present it unchanged.
    pub state: String,
}

/// Result of a completed login.
#[derive(Debug)]
pub struct LoginOutcome {
    /// Issued token set, including the rotating refresh token.
    pub tokens: TokenSet,
    /// Profile of the user who just logged in.
    pub profile: UserProfile,
}

/// Authentication service facade.
pub struct AuthService {
    config: ProviderConfig,
    client: ApiClient,
    handshakes: TieredHandshakeStore,
    relationships: RelationshipCache,
    // Refresh tokens rotate on use; concurrent refreshes would invalidate
    // each other's tokens, so they are serialized.
    refresh_gate: tokio::sync::Mutex<()>,
}

impl AuthService {
    /// Build a service with no durable handshake mirror.
    pub fn new(config: ProviderConfig) -> Result<Self, AuthError> {
        Self::with_collaborators(config, None, Arc::new(TokioSleeper), Arc::new(NoopUsageRecorder))
    }

    /// Build a service mirroring handshakes into the given durable store.
    pub fn with_store(
        config: ProviderConfig,
        durable: Arc<dyn KeyValueStore>,
    ) -> Result<Self, AuthError> {
        Self::with_collaborators(
            config,
            Some(durable),
            Arc::new(TokioSleeper),
            Arc::new(NoopUsageRecorder),
        )
    }

    /// Build a service with every collaborator explicit.
    pub fn with_collaborators(
        config: ProviderConfig,
        durable: Option<Arc<dyn KeyValueStore>>,
        sleeper: Arc<dyn Sleeper>,
        usage: Arc<dyn UsageRecorder>,
    ) -> Result<Self, AuthError> {
        let client = ApiClient::with_collaborators(&config.user_agent, sleeper, usage)?;
        Ok(Self {
            config,
            client,
            handshakes: TieredHandshakeStore::new(durable),
            relationships: RelationshipCache::new(),
            refresh_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Start a login attempt: generate PKCE material, persist the handshake,
    /// and return the provider redirect.
    pub async fn begin_login(
        &self,
        redirect_uri: &str,
        force_login: bool,
    ) -> Result<LoginRedirect, AuthError> {
        let challenge = PkceChallenge::generate();
        let url = build_authorize_url(&self.config, &challenge, redirect_uri, force_login)?;

        let record = HandshakeRecord::new(
            challenge.code_verifier.clone(),
            redirect_uri.to_string(),
            self.config.handshake_ttl,
        );
        self.handshakes
            .put(&challenge.state, record)
            .await
            .map_err(|e| AuthError::ServiceUnavailable(e.to_string()))?;

        info!(force_login, "login handshake started");
        Ok(LoginRedirect { url, state: challenge.state })
    }

    /// Handle the provider callback: consume the handshake, redeem the code,
    /// and fetch the user's profile.
    ///
    /// The handshake record is deleted before the exchange, so a state token
    /// is spent by its first callback whether or not the exchange succeeds.
    pub async fn complete_login(&self, state: &str, code: &str) -> Result<LoginOutcome, AuthError> {
        let record = match self.handshakes.get(state).await {
            HandshakeLookup::Found(record) => record,
            HandshakeLookup::Expired => return Err(AuthError::HandshakeExpired),
            HandshakeLookup::NotFound => return Err(AuthError::HandshakeNotFound),
        };
        self.handshakes.delete(state).await;

        let tokens = TokenClient::new(&self.client, &self.config)
            .exchange_code(code, &record.code_verifier, &record.redirect_uri)
            .await?;

        let profile =
            ProfileClient::new(&self.client, &self.config).fetch_me(&tokens.access_token).await?;

        info!(user_id = %profile.id, handle = %profile.handle, "login completed");
        Ok(LoginOutcome { tokens, profile })
    }

    /// Exchange a refresh token for a fresh token set.
    ///
    /// Serialized process-wide: the provider rotates refresh tokens on use,
    /// and two concurrent refreshes would leave one caller holding a dead
    /// token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        let _gate = self.refresh_gate.lock().await;
        TokenClient::new(&self.client, &self.config).refresh(refresh_token).await
    }

    /// Fetch the profile behind an access token.
    pub async fn get_profile(&self, access_token: &str) -> Result<UserProfile, AuthError> {
        ProfileClient::new(&self.client, &self.config).fetch_me(access_token).await
    }

    /// Look up a profile by handle. `None` when no such user exists; the
    /// app-only bearer token is preferred when configured.
    pub async fn get_profile_by_handle(
        &self,
        handle: &str,
        access_token: &str,
    ) -> Result<Option<UserProfile>, AuthError> {
        let token = self.config.bearer_token.as_deref().unwrap_or(access_token);
        let lookup =
            ProfileClient::new(&self.client, &self.config).fetch_by_handle(handle, token).await;

        match lookup {
            Ok(profile) => Ok(Some(profile)),
            Err(AuthError::Api(crate::error::ApiError::Terminal { status, .. }))
                if status == reqwest::StatusCode::NOT_FOUND =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Revoke a single access token. Never fails; the returned flag reports
    /// whether the provider acknowledged the revocation.
    pub async fn revoke(&self, access_token: &str) -> bool {
        match RevocationClient::new(&self.client, &self.config)
            .revoke(access_token, TokenKind::Access)
            .await
        {
            Ok(acknowledged) => acknowledged,
            Err(e) => {
                warn!(error = %e, "token revocation failed");
                false
            }
        }
    }

    /// Check whether the subject follows the target account. Never fails;
    /// degraded lookups come back with `skipped` set.
    pub async fn check_relationship(
        &self,
        subject_id: &str,
        access_token: &str,
        target_handle: &str,
    ) -> RelationshipStatus {
        RelationshipChecker::new(&self.client, &self.config, &self.relationships)
            .check(subject_id, access_token, target_handle)
            .await
    }

    /// End a session, revoking both tokens at the provider best-effort.
    /// Revocation failures are logged, never surfaced: local logout must
    /// always succeed.
    pub async fn logout(&self, access_token: &str, refresh_token: Option<&str>) {
        let revoker = RevocationClient::new(&self.client, &self.config);

        if let Err(e) = revoker.revoke(access_token, TokenKind::Access).await {
            warn!(error = %e, "access token revocation failed");
        }
        if let Some(refresh_token) = refresh_token {
            if let Err(e) = revoker.revoke(refresh_token, TokenKind::Refresh).await {
                warn!(error = %e, "refresh token revocation failed");
            }
        }
        info!("logout completed");
    }

    /// Evict expired handshakes and relationship-cache entries. Intended for
    /// a periodic housekeeping task.
    pub fn sweep_expired(&self) -> usize {
        self.handshakes.sweep_expired() + self.relationships.sweep_expired()
    }

    /// Provider configuration in effect.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}
