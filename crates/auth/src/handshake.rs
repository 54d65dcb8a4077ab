//! Handshake state store for the PKCE authorization flow
//!
//! A handshake record holds the PKCE verifier and redirect target keyed by
//! the CSRF state token, between redirect-initiation and callback handling.
//! The OAuth redirect is a genuinely cross-request event, so records live in
//! two places:
//!
//! - an authoritative in-process map (low latency; the callback can race a
//!   cold durable-store connection), and
//! - a best-effort durable mirror behind [`KeyValueStore`] for process
//!   restarts and multi-instance deployments.
//!
//! Durable-store failures never block login: `put` errors are logged and
//! swallowed, `get` errors degrade to not-found. Records are single-use:
//! the callback handler deletes immediately after a successful read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;

/// PKCE material and redirect target awaiting the provider callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeRecord {
    /// PKCE code verifier generated at redirect-initiation.
    pub code_verifier: String,
    /// Exact callback URL registered for this attempt; must match the one
    /// sent at token exchange.
    pub redirect_uri: String,
    /// Absolute expiry; records past this instant are treated as not-found.
    pub expires_at: DateTime<Utc>,
}

impl HandshakeRecord {
    /// Create a record expiring `ttl` from now.
    #[must_use]
    pub fn new(code_verifier: String, redirect_uri: String, ttl: Duration) -> Self {
        Self {
            code_verifier,
            redirect_uri,
            expires_at: Utc::now() + chrono::Duration::seconds(ttl.as_secs() as i64),
        }
    }

    /// Whether the record's TTL has elapsed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Outcome of a handshake-record lookup.
///
/// `Expired` is distinguished from `NotFound` so the login flow can tell the
/// user their session timed out rather than that it never existed.
#[derive(Debug)]
pub enum HandshakeLookup {
    /// A live record was found.
    Found(HandshakeRecord),
    /// A record was found but its TTL had elapsed; it has been evicted.
    Expired,
    /// No record exists for this state token.
    NotFound,
}

/// Storage interface for handshake records.
#[async_trait]
pub trait HandshakeStore: Send + Sync {
    /// Store a record under its state token.
    async fn put(&self, state: &str, record: HandshakeRecord) -> Result<(), StoreError>;

    /// Look up a record; expired hits are evicted and reported as such.
    async fn get(&self, state: &str) -> HandshakeLookup;

    /// Remove a record. Idempotent.
    async fn delete(&self, state: &str);
}

/// External durable key-value collaborator used as the handshake mirror.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store a value with a TTL after which the store may discard it.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Fetch a value if present.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Remove a value. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Authoritative in-process handshake store.
///
/// Expired entries are evicted lazily on read; [`Self::sweep_expired`] exists
/// for the optional periodic housekeeping task.
#[derive(Debug, Default)]
pub struct MemoryHandshakeStore {
    entries: Mutex<HashMap<String, HandshakeRecord>>,
}

impl MemoryHandshakeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict every expired record, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, record| !record.is_expired());
        before - entries.len()
    }

    /// Number of records currently held (expired included until swept).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl HandshakeStore for MemoryHandshakeStore {
    async fn put(&self, state: &str, record: HandshakeRecord) -> Result<(), StoreError> {
        self.entries.lock().insert(state.to_string(), record);
        Ok(())
    }

    async fn get(&self, state: &str) -> HandshakeLookup {
        let mut entries = self.entries.lock();
        match entries.get(state) {
            Some(record) if record.is_expired() => {
                entries.remove(state);
                HandshakeLookup::Expired
            }
            Some(record) => HandshakeLookup::Found(record.clone()),
            None => HandshakeLookup::NotFound,
        }
    }

    async fn delete(&self, state: &str) {
        self.entries.lock().remove(state);
    }
}

fn durable_key(state: &str) -> String {
    format!("oauth:pkce:{state}")
}

/// Handshake store backed by the durable key-value mirror.
///
/// Records are serialized as JSON. All durable-store errors degrade: reads
/// report not-found, deletes are swallowed. Only `put` propagates its error
/// so the tiered store can decide to log it.
pub struct DurableHandshakeStore {
    store: Arc<dyn KeyValueStore>,
}

impl DurableHandshakeStore {
    /// Wrap a durable key-value collaborator.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HandshakeStore for DurableHandshakeStore {
    async fn put(&self, state: &str, record: HandshakeRecord) -> Result<(), StoreError> {
        let ttl = (record.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let payload = serde_json::to_string(&record)
            .map_err(|e| StoreError(format!("serialize handshake record: {e}")))?;
        self.store.put(&durable_key(state), payload, ttl).await
    }

    async fn get(&self, state: &str) -> HandshakeLookup {
        let payload = match self.store.get(&durable_key(state)).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return HandshakeLookup::NotFound,
            Err(e) => {
                warn!(error = %e, "durable handshake read failed; treating as not-found");
                return HandshakeLookup::NotFound;
            }
        };

        let record: HandshakeRecord = match serde_json::from_str(&payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "durable handshake payload corrupt; treating as not-found");
                return HandshakeLookup::NotFound;
            }
        };

        if record.is_expired() {
            self.delete(state).await;
            return HandshakeLookup::Expired;
        }
        HandshakeLookup::Found(record)
    }

    async fn delete(&self, state: &str) {
        if let Err(e) = self.store.delete(&durable_key(state)).await {
            warn!(error = %e, "durable handshake delete failed");
        }
    }
}

/// Fallback composition of the in-process store and the durable mirror.
///
/// Writes land in memory first (authoritative) and are mirrored durably on a
/// best-effort basis. Reads consult memory first and fall back to the mirror
/// only on a miss, which covers process restarts and other instances'
/// handshakes.
pub struct TieredHandshakeStore {
    memory: MemoryHandshakeStore,
    durable: Option<DurableHandshakeStore>,
}

impl TieredHandshakeStore {
    /// Build a store with an optional durable mirror.
    #[must_use]
    pub fn new(durable: Option<Arc<dyn KeyValueStore>>) -> Self {
        Self {
            memory: MemoryHandshakeStore::new(),
            durable: durable.map(DurableHandshakeStore::new),
        }
    }

    /// Evict expired records from the in-process map.
    pub fn sweep_expired(&self) -> usize {
        self.memory.sweep_expired()
    }
}

#[async_trait]
impl HandshakeStore for TieredHandshakeStore {
    async fn put(&self, state: &str, record: HandshakeRecord) -> Result<(), StoreError> {
        // The in-memory write cannot fail; the mirror is best effort and must
        // never surface to the login redirect.
        self.memory.put(state, record.clone()).await?;

        if let Some(durable) = &self.durable {
            if let Err(e) = durable.put(state, record).await {
                warn!(error = %e, "durable handshake mirror write failed; memory-only");
            } else {
                debug!("handshake record mirrored durably");
            }
        }
        Ok(())
    }

    async fn get(&self, state: &str) -> HandshakeLookup {
        match self.memory.get(state).await {
            HandshakeLookup::NotFound => {}
            hit => return hit,
        }

        match &self.durable {
            Some(durable) => durable.get(state).await,
            None => HandshakeLookup::NotFound,
        }
    }

    async fn delete(&self, state: &str) {
        self.memory.delete(state).await;
        if let Some(durable) = &self.durable {
            durable.delete(state).await;
        }
    }
}
