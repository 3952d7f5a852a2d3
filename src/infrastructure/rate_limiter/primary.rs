//! Primary counter store adapter
//!
//! Fixed-window counting over the low-latency key/value backend. The
//! read-then-write sequence is not atomic across concurrent callers; each
//! caller may base its increment on a slightly stale count. The resulting
//! slack is bounded by the number of requests concurrently in flight for
//! the same key, and the counter intent is monotonically non-decreasing,
//! so the engine can only admit marginally late into denial, never run
//! away unbounded.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::QuotaConfig;
use crate::infrastructure::clock::{Clock, SystemClock};
use crate::infrastructure::rate_limiter::storage::KeyValueStore;
use crate::infrastructure::rate_limiter::types::{
    AdmitDecision, CounterRecord, CounterStore, CounterStoreError, RateLimitKey,
};

/// Fixed-window counter over a key/value backend
pub struct FixedWindowCounterStore {
    storage: Arc<dyn KeyValueStore>,
    key_prefix: String,
    clock: Arc<dyn Clock>,
}

impl FixedWindowCounterStore {
    /// Create a new primary adapter over a storage backend
    pub fn new(storage: Arc<dyn KeyValueStore>, key_prefix: &str) -> Self {
        Self::with_clock(storage, key_prefix, Arc::new(SystemClock))
    }

    /// Create with an injected clock (for testing)
    pub fn with_clock(
        storage: Arc<dyn KeyValueStore>,
        key_prefix: &str,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            key_prefix: key_prefix.to_string(),
            clock,
        }
    }

    /// Decode a stored payload; corruption counts as absence
    fn decode(&self, key: &str, raw: Option<Vec<u8>>) -> Option<CounterRecord> {
        let raw = raw?;
        match serde_json::from_slice::<CounterRecord>(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    key = %key,
                    error = %e,
                    "Malformed counter payload, starting a fresh window"
                );
                None
            }
        }
    }

    async fn persist(
        &self,
        key: &str,
        record: &CounterRecord,
        now_millis: u64,
    ) -> Result<(), CounterStoreError> {
        let payload = serde_json::to_vec(record).map_err(|e| CounterStoreError::Backend {
            detail: format!("counter serialization error: {}", e),
        })?;

        // TTL aligned to the window remainder, storage hygiene only
        let ttl_seconds = record.retry_after_seconds(now_millis).max(1);

        self.storage
            .put(key, &payload, ttl_seconds)
            .await
            .map_err(|e| CounterStoreError::Backend {
                detail: e.to_string(),
            })
    }
}

#[async_trait]
impl CounterStore for FixedWindowCounterStore {
    async fn try_admit(
        &self,
        key: &RateLimitKey,
        quota: &QuotaConfig,
    ) -> Result<AdmitDecision, CounterStoreError> {
        let rendered = key.render(&self.key_prefix);

        let raw = self
            .storage
            .get(&rendered)
            .await
            .map_err(|e| CounterStoreError::Backend {
                detail: e.to_string(),
            })?;

        let now = self.clock.now_millis();
        let previous = self.decode(&rendered, raw).filter(|r| !r.expired(now));

        let record = match previous {
            None => CounterRecord::open(now, quota.window_seconds),
            Some(prev) => CounterRecord {
                count: prev.count.saturating_add(1),
                window_reset_at: prev.window_reset_at,
            },
        };

        if record.count > quota.max_requests {
            let retry_after_seconds = record.retry_after_seconds(now);

            // Persist the exceeded state once so later calls in this window
            // are denied from the read alone; rewriting on every denied call
            // would only churn the store.
            let already_exceeded = previous.is_some_and(|p| p.count > quota.max_requests);
            if !already_exceeded {
                self.persist(&rendered, &record, now).await?;
            }

            debug!(
                key = %rendered,
                count = record.count,
                limit = quota.max_requests,
                retry_after_seconds,
                "Request denied by primary counter"
            );
            return Ok(AdmitDecision::Deny {
                retry_after_seconds,
            });
        }

        self.persist(&rendered, &record, now).await?;

        Ok(AdmitDecision::Admit {
            remaining: quota.max_requests - record.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::{CallerIdentity, Tier};
    use crate::domain::quota::{Action, QuotaClass};
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::rate_limiter::storage::{
        InMemoryKeyValueStore, KeyValueStoreError,
    };
    use std::time::Duration;

    const T0: u64 = 1_700_000_000_000;

    fn key() -> RateLimitKey {
        RateLimitKey {
            class: QuotaClass::Standard,
            tier: Tier::Anon,
            identity: CallerIdentity::Ip("203.0.113.5".to_string()),
            action: Action::Generate,
        }
    }

    fn quota(max_requests: u32, window_seconds: u64) -> QuotaConfig {
        QuotaConfig {
            max_requests,
            window_seconds,
        }
    }

    fn adapter() -> (Arc<ManualClock>, Arc<InMemoryKeyValueStore>, FixedWindowCounterStore) {
        let clock = Arc::new(ManualClock::new(T0));
        let storage = Arc::new(InMemoryKeyValueStore::with_clock(clock.clone()));
        let adapter =
            FixedWindowCounterStore::with_clock(storage.clone(), "ratelimit", clock.clone());
        (clock, storage, adapter)
    }

    #[tokio::test]
    async fn test_sequential_admissions_until_limit() {
        let (_clock, _storage, adapter) = adapter();
        let quota = quota(3, 60);

        for expected_remaining in [2, 1, 0] {
            match adapter.try_admit(&key(), &quota).await.unwrap() {
                AdmitDecision::Admit { remaining } => {
                    assert_eq!(remaining, expected_remaining)
                }
                other => panic!("expected admit, got {other:?}"),
            }
        }

        match adapter.try_admit(&key(), &quota).await.unwrap() {
            AdmitDecision::Deny {
                retry_after_seconds,
            } => assert_eq!(retry_after_seconds, 60),
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_window_reset_restarts_count() {
        let (clock, _storage, adapter) = adapter();
        let quota = quota(2, 60);

        adapter.try_admit(&key(), &quota).await.unwrap();
        adapter.try_admit(&key(), &quota).await.unwrap();
        assert!(matches!(
            adapter.try_admit(&key(), &quota).await.unwrap(),
            AdmitDecision::Deny { .. }
        ));

        clock.advance(Duration::from_secs(61));

        match adapter.try_admit(&key(), &quota).await.unwrap() {
            AdmitDecision::Admit { remaining } => assert_eq!(remaining, 1),
            other => panic!("expected admit after window reset, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_after_counts_down_within_window() {
        let (clock, _storage, adapter) = adapter();
        let quota = quota(3, 60);

        for _ in 0..3 {
            adapter.try_admit(&key(), &quota).await.unwrap();
        }

        clock.advance(Duration::from_secs(10));
        match adapter.try_admit(&key(), &quota).await.unwrap() {
            AdmitDecision::Deny {
                retry_after_seconds,
            } => assert_eq!(retry_after_seconds, 50),
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_payload_starts_fresh_window() {
        let (_clock, storage, adapter) = adapter();
        let quota = quota(3, 60);

        storage
            .put(&key().render("ratelimit"), b"{not json!", 60)
            .await
            .unwrap();

        match adapter.try_admit(&key(), &quota).await.unwrap() {
            AdmitDecision::Admit { remaining } => assert_eq!(remaining, 2),
            other => panic!("expected admit over malformed state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_keys_do_not_interfere() {
        let (_clock, _storage, adapter) = adapter();
        let quota = quota(1, 60);

        adapter.try_admit(&key(), &quota).await.unwrap();
        assert!(matches!(
            adapter.try_admit(&key(), &quota).await.unwrap(),
            AdmitDecision::Deny { .. }
        ));

        let other = RateLimitKey {
            identity: CallerIdentity::Ip("198.51.100.7".to_string()),
            ..key()
        };
        assert!(matches!(
            adapter.try_admit(&other, &quota).await.unwrap(),
            AdmitDecision::Admit { .. }
        ));
    }

    #[tokio::test]
    async fn test_storage_failure_is_unavailable() {
        struct BrokenStore;

        #[async_trait]
        impl KeyValueStore for BrokenStore {
            async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, KeyValueStoreError> {
                Err(KeyValueStoreError("connection refused".to_string()))
            }
            async fn put(
                &self,
                _key: &str,
                _value: &[u8],
                _ttl_seconds: u64,
            ) -> Result<(), KeyValueStoreError> {
                Err(KeyValueStoreError("connection refused".to_string()))
            }
            async fn cleanup(&self) {}
        }

        let adapter = FixedWindowCounterStore::new(Arc::new(BrokenStore), "ratelimit");
        let result = adapter.try_admit(&key(), &quota(3, 60)).await;
        assert!(matches!(result, Err(CounterStoreError::Backend { .. })));
    }
}
