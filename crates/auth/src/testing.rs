//! Test doubles for external collaborators
//!
//! Shipped as a regular module so integration tests and downstream crates can
//! wire the service without a real durable store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::Sleeper;
use crate::error::StoreError;
use crate::handshake::KeyValueStore;
use crate::ratelimit::RateLimitWindow;
use crate::usage::UsageRecorder;

/// In-memory [`KeyValueStore`] double.
///
/// Retains values regardless of TTL so record-level expiry logic is what gets
/// exercised, not the store's own eviction. The failing variant errors on
/// every operation to drive degradation paths.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
    fail: bool,
}

impl MemoryKeyValueStore {
    /// A store where every operation succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store where every operation fails.
    #[must_use]
    pub fn failing() -> Self {
        Self { entries: Mutex::new(HashMap::new()), fail: true }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail {
            Err(StoreError("injected store failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn put(&self, key: &str, value: String, _ttl: Duration) -> Result<(), StoreError> {
        self.check()?;
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// [`Sleeper`] that records requested delays and returns immediately, so
/// retry and rate-limit waits can be asserted without wall-clock time.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    #[must_use]
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
    }
}

/// [`UsageRecorder`] that captures every recorded call.
#[derive(Debug, Default)]
pub struct RecordingUsageRecorder {
    calls: Mutex<Vec<UsageRecord>>,
}

/// One captured usage record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub endpoint: String,
    pub window: Option<RateLimitWindow>,
    pub success: bool,
}

impl RecordingUsageRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records captured so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<UsageRecord> {
        self.calls.lock().clone()
    }
}

impl UsageRecorder for RecordingUsageRecorder {
    fn record(&self, endpoint: &str, window: Option<RateLimitWindow>, success: bool) {
        self.calls.lock().push(UsageRecord {
            endpoint: endpoint.to_string(),
            window,
            success,
        });
    }
}
