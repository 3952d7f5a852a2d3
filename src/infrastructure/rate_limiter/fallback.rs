//! Fallback counter store adapter
//!
//! Durable counting over PostgreSQL. The whole read-modify-write cycle is a
//! single conditional upsert, so concurrent callers on the same key
//! serialize through the database's own concurrency control and there is no
//! race window. An operational error here has no further fallback; it
//! propagates and the orchestrator fails closed.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::config::QuotaConfig;
use crate::infrastructure::clock::{Clock, SystemClock};
use crate::infrastructure::rate_limiter::types::{
    AdmitDecision, CounterRecord, CounterStore, CounterStoreError, RateLimitKey,
};

/// One atomic statement: insert a fresh window, reset an expired one, or
/// increment the live one, and return the post-write row.
const ADMIT_SQL: &str = r#"
INSERT INTO rate_limit_counters (bucket_key, count, window_reset_at)
VALUES ($1, 1, $2)
ON CONFLICT (bucket_key) DO UPDATE SET
    count = CASE WHEN rate_limit_counters.window_reset_at <= $3
                 THEN 1
                 ELSE rate_limit_counters.count + 1 END,
    window_reset_at = CASE WHEN rate_limit_counters.window_reset_at <= $3
                 THEN $2
                 ELSE rate_limit_counters.window_reset_at END
RETURNING count, window_reset_at
"#;

#[derive(sqlx::FromRow)]
struct CounterRow {
    count: i64,
    window_reset_at: i64,
}

/// PostgreSQL-backed counter store
pub struct PostgresCounterStore {
    pool: PgPool,
    key_prefix: String,
    clock: Arc<dyn Clock>,
}

impl PostgresCounterStore {
    /// Create a new fallback adapter over a connection pool
    pub fn new(pool: PgPool, key_prefix: &str) -> Self {
        Self::with_clock(pool, key_prefix, Arc::new(SystemClock))
    }

    /// Create with an injected clock (for testing)
    pub fn with_clock(pool: PgPool, key_prefix: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.to_string(),
            clock,
        }
    }
}

#[async_trait]
impl CounterStore for PostgresCounterStore {
    async fn try_admit(
        &self,
        key: &RateLimitKey,
        quota: &QuotaConfig,
    ) -> Result<AdmitDecision, CounterStoreError> {
        let rendered = key.render(&self.key_prefix);
        let now = self.clock.now_millis();
        let fresh_reset_at = now + quota.window_seconds * 1_000;

        let row: CounterRow = sqlx::query_as(ADMIT_SQL)
            .bind(&rendered)
            .bind(fresh_reset_at as i64)
            .bind(now as i64)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CounterStoreError::Backend {
                detail: format!("Database error counting {}: {}", rendered, e),
            })?;

        let record = CounterRecord {
            count: row.count.min(u32::MAX as i64) as u32,
            window_reset_at: row.window_reset_at.max(0) as u64,
        };

        if record.count > quota.max_requests {
            let retry_after_seconds = record.retry_after_seconds(now);
            debug!(
                key = %rendered,
                count = record.count,
                limit = quota.max_requests,
                retry_after_seconds,
                "Request denied by fallback counter"
            );
            return Ok(AdmitDecision::Deny {
                retry_after_seconds,
            });
        }

        Ok(AdmitDecision::Admit {
            remaining: quota.max_requests - record.count,
        })
    }
}
