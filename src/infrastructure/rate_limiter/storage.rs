//! Counter storage backends
//!
//! Provides the raw key/value layer under the primary adapter:
//! - Dragonfly/Redis for distributed, production use
//! - In-memory for development and single-instance deployments

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::infrastructure::clock::{Clock, SystemClock};

/// Raw key/value backend error
#[derive(Debug, thiserror::Error)]
#[error("key/value backend error: {0}")]
pub struct KeyValueStoreError(pub String);

/// Trait for raw counter payload storage
///
/// Values are opaque bytes; TTLs are storage hygiene, not a correctness
/// mechanism. A value that expired physically reads back as absent.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the raw payload for a key
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KeyValueStoreError>;

    /// Set the raw payload for a key with a TTL
    async fn put(&self, key: &str, value: &[u8], ttl_seconds: u64)
        -> Result<(), KeyValueStoreError>;

    /// Cleanup expired entries (for in-memory storage)
    async fn cleanup(&self);
}

/// Dragonfly/Redis storage backend
pub struct DragonflyKeyValueStore {
    connection_manager: Arc<ConnectionManager>,
}

impl DragonflyKeyValueStore {
    /// Create a new Dragonfly storage backend
    pub async fn new(url: &str) -> Result<Self, KeyValueStoreError> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!("Failed to create Redis client for rate limiting: {}", e);
            KeyValueStoreError(format!("Failed to create Redis client: {}", e))
        })?;

        let connection_manager = ConnectionManager::new(client).await.map_err(|e| {
            warn!(
                "Failed to create connection manager for rate limiting: {}",
                e
            );
            KeyValueStoreError(format!("Failed to create connection manager: {}", e))
        })?;

        // Test connection
        let mut conn = connection_manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| {
                warn!("Failed to ping Redis for rate limiting: {}", e);
                KeyValueStoreError(format!("Failed to ping Redis: {}", e))
            })?;

        debug!("Successfully connected to Dragonfly for rate limiting");

        Ok(Self {
            connection_manager: Arc::new(connection_manager),
        })
    }
}

#[async_trait]
impl KeyValueStore for DragonflyKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KeyValueStoreError> {
        let mut conn = (*self.connection_manager).clone();

        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| KeyValueStoreError(format!("Redis GET error: {}", e)))?;

        Ok(value)
    }

    async fn put(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: u64,
    ) -> Result<(), KeyValueStoreError> {
        let mut conn = (*self.connection_manager).clone();

        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| KeyValueStoreError(format!("Redis SET error: {}", e)))?;

        Ok(())
    }

    async fn cleanup(&self) {
        // Redis handles TTL-based cleanup automatically
    }
}

/// In-memory storage entry with expiration
#[derive(Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at_millis: u64,
}

/// In-memory storage backend for development/single instance
pub struct InMemoryKeyValueStore {
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryKeyValueStore {
    /// Create a new in-memory storage backend
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create with an injected clock (for testing)
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KeyValueStoreError> {
        let entries = self.entries.read().await;
        if let Some(entry) = entries.get(key) {
            if self.clock.now_millis() < entry.expires_at_millis {
                return Ok(Some(entry.value.clone()));
            }
        }
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: u64,
    ) -> Result<(), KeyValueStoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at_millis: self.clock.now_millis() + ttl_seconds * 1_000,
            },
        );
        Ok(())
    }

    async fn cleanup(&self) {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at_millis > now);
        debug!("Completed rate limit storage cleanup");
    }
}
