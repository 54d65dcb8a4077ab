//! Relationship ("does A follow B") checks with caching and degradation
//!
//! Relationship status is decorative for the login flow, so this module is
//! built to never fail the caller: every provider or transport error degrades
//! to an unknown-relationship result with `skipped` set. Definitive answers
//! are cached per (subject, target) for a day; follow-graph changes are slow
//! relative to login frequency and the provider's quota on the following
//! endpoint is tight.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::config::ProviderConfig;
use crate::profile::{normalize_handle, ProfileClient, UserProfile};

const FOLLOWING_ENDPOINT: &str = "/2/users/following";
const USER_BY_HANDLE_ENDPOINT: &str = "/2/users/by/username";

/// Maximum page size the provider allows on the following endpoint. One page
/// at this size covers the overwhelming majority of accounts.
const FOLLOWING_PAGE_SIZE: &str = "1000";

/// Result of a relationship check.
#[derive(Debug, Clone)]
pub struct RelationshipStatus {
    /// Whether the subject follows the target. `false` when skipped.
    pub is_related: bool,
    /// The resolved target profile, when the lookup got that far.
    pub target: Option<UserProfile>,
    /// True when the check was skipped (rate limit, provider failure) and
    /// `is_related` must not be treated as a definitive "no".
    pub skipped: bool,
}

impl RelationshipStatus {
    fn skipped() -> Self {
        Self { is_related: false, target: None, skipped: true }
    }
}

struct CacheEntry {
    status: RelationshipStatus,
    expires_at: Instant,
}

/// Process-local cache of definitive relationship results.
///
/// Keyed by (subject id, lowercased target handle). Skipped results are never
/// cached; the next login should retry the real lookup.
#[derive(Default)]
pub struct RelationshipCache {
    entries: RwLock<HashMap<(String, String), CacheEntry>>,
}

impl RelationshipCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &(String, String)) -> Option<RelationshipStatus> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.status.clone())
    }

    fn put(&self, key: (String, String), status: RelationshipStatus, ttl: Duration) {
        self.entries
            .write()
            .insert(key, CacheEntry { status, expires_at: Instant::now() + ttl });
    }

    /// Drop expired entries, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

#[derive(Debug, Deserialize)]
struct FollowingEntry {
    id: String,
}

#[derive(Debug, Deserialize, Default)]
struct FollowingPage {
    #[serde(default)]
    data: Vec<FollowingEntry>,
}

/// Relationship checker over the provider follow graph.
pub struct RelationshipChecker<'a> {
    client: &'a ApiClient,
    config: &'a ProviderConfig,
    cache: &'a RelationshipCache,
}

impl<'a> RelationshipChecker<'a> {
    pub fn new(
        client: &'a ApiClient,
        config: &'a ProviderConfig,
        cache: &'a RelationshipCache,
    ) -> Self {
        Self { client, config, cache }
    }

    /// Check whether `subject_id` follows the account behind `target_handle`.
    ///
    /// Infallible by contract: every failure path returns a skipped status.
    /// `access_token` is the subject's user token; the app-only bearer token
    /// is preferred for the handle resolution when configured.
    pub async fn check(
        &self,
        subject_id: &str,
        access_token: &str,
        target_handle: &str,
    ) -> RelationshipStatus {
        let handle = normalize_handle(target_handle);
        let key = (subject_id.to_string(), handle.to_lowercase());

        if let Some(cached) = self.cache.get(&key) {
            debug!(subject_id, handle, "relationship cache hit");
            return cached;
        }

        // A known-exhausted window on either hop means the lookup cannot
        // complete now; skip rather than stall the login flow on the reset.
        if self.client.is_rate_limited(USER_BY_HANDLE_ENDPOINT)
            || self.client.is_rate_limited(FOLLOWING_ENDPOINT)
        {
            info!(subject_id, handle, "relationship check skipped: rate limited");
            return RelationshipStatus::skipped();
        }

        let lookup_token =
            self.config.bearer_token.as_deref().unwrap_or(access_token);

        let target = match ProfileClient::new(self.client, self.config)
            .fetch_by_handle(&handle, lookup_token)
            .await
        {
            Ok(profile) => profile,
            Err(e) => {
                warn!(handle, error = %e, "relationship check skipped: handle resolution failed");
                return RelationshipStatus::skipped();
            }
        };

        let request = self
            .client
            .http()
            .get(self.config.following_url(subject_id))
            .bearer_auth(access_token)
            .query(&[("max_results", FOLLOWING_PAGE_SIZE)]);

        let page = match self
            .client
            .execute_with::<FollowingPage>(FOLLOWING_ENDPOINT, request, &self.config.lookup_retry)
            .await
        {
            Ok(response) => response.body,
            Err(e) => {
                warn!(subject_id, error = %e, "relationship check skipped: following lookup failed");
                return RelationshipStatus::skipped();
            }
        };

        let is_related = page.data.iter().any(|entry| entry.id == target.id);
        debug!(subject_id, handle, is_related, "relationship resolved");

        let status = RelationshipStatus { is_related, target: Some(target), skipped: false };
        self.cache.put(key, status.clone(), self.config.relationship_ttl);
        status
    }
}
