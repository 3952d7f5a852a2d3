//! Rate limiter service
//!
//! The entry point that coordinates a rate limit check: resolve the caller
//! identity and tier, look up the quota, try the primary counter store, fall
//! back to the durable store when the primary is unavailable, and fail
//! closed when both are gone. Losing the primary degrades latency but keeps
//! the service answering; losing both denies traffic rather than admitting
//! it unconditionally.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::config::{Config, CounterStorageBackend, QuotaConfig, ValidationError};
use crate::domain::identity::{RequestContext, Tier};
use crate::domain::quota::{Action, QuotaClass, QuotaTable};
use crate::infrastructure::identity::CallerIdentityResolver;
use crate::infrastructure::rate_limiter::primary::FixedWindowCounterStore;
use crate::infrastructure::rate_limiter::storage::{
    DragonflyKeyValueStore, InMemoryKeyValueStore, KeyValueStore,
};
use crate::infrastructure::rate_limiter::types::{
    AdmitDecision, CounterStore, CounterStoreError, RateLimitDecision, RateLimitKey,
};

/// Main rate limiter service
pub struct RateLimiterService {
    /// Identity resolution
    resolver: CallerIdentityResolver,
    /// Resolved quota table
    quotas: QuotaTable,
    /// Primary counter store
    primary: Arc<dyn CounterStore>,
    /// Durable fallback counter store
    fallback: Arc<dyn CounterStore>,
    /// Raw storage handle, kept for the cleanup task
    storage: Option<Arc<dyn KeyValueStore>>,
    /// Configuration
    config: Config,
}

impl RateLimiterService {
    /// Create a new rate limiter service
    ///
    /// Builds the primary counter store from `config.storage` (falling back
    /// to in-memory storage when Dragonfly cannot be reached) and the
    /// durable fallback over the given PostgreSQL pool.
    pub async fn new(config: Config, pool: sqlx::PgPool) -> Result<Self, ValidationError> {
        let quotas = QuotaTable::from_config(&config.quotas)?;

        let storage: Arc<dyn KeyValueStore> = match config.storage.backend {
            CounterStorageBackend::Dragonfly => {
                match DragonflyKeyValueStore::new(&config.storage.url).await {
                    Ok(storage) => {
                        info!(
                            "Rate limiter using Dragonfly storage backend at {}",
                            config.storage.url
                        );
                        Arc::new(storage)
                    }
                    Err(e) => {
                        warn!(
                            "Failed to connect to Dragonfly for rate limiting, falling back to in-memory: {}",
                            e
                        );
                        Arc::new(InMemoryKeyValueStore::new())
                    }
                }
            }
            CounterStorageBackend::Memory => {
                info!("Rate limiter using in-memory storage backend");
                Arc::new(InMemoryKeyValueStore::new())
            }
        };

        let primary = Arc::new(FixedWindowCounterStore::new(
            Arc::clone(&storage),
            &config.storage.key_prefix,
        ));
        let fallback = Arc::new(super::fallback::PostgresCounterStore::new(
            pool,
            &config.storage.key_prefix,
        ));

        Ok(Self {
            resolver: CallerIdentityResolver::new(),
            quotas,
            primary,
            fallback,
            storage: Some(storage),
            config,
        })
    }

    /// Create with custom counter stores (for testing)
    pub fn with_stores(
        primary: Arc<dyn CounterStore>,
        fallback: Arc<dyn CounterStore>,
        config: Config,
    ) -> Result<Self, ValidationError> {
        let quotas = QuotaTable::from_config(&config.quotas)?;

        Ok(Self {
            resolver: CallerIdentityResolver::new(),
            quotas,
            primary,
            fallback,
            storage: None,
            config,
        })
    }

    /// Check if rate limiting is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Check whether a request may proceed
    ///
    /// # Arguments
    /// * `ctx` - Resolved caller context (principal, attributes, address)
    /// * `action` - The action being attempted
    ///
    /// # Returns
    /// A `RateLimitDecision`; callers must treat `allowed == false` as a
    /// hard stop and surface `retry_after_seconds` to the client. This
    /// method never fails: infrastructure errors are absorbed here and at
    /// worst become a conservative denial.
    pub async fn check(&self, ctx: &RequestContext, action: Action) -> RateLimitDecision {
        let tier = ctx.tier();

        if !self.config.enabled {
            return RateLimitDecision::unlimited(tier);
        }

        let identity = self.resolver.resolve(ctx);

        // Anonymous callers on high-cost actions are capped by the stricter
        // burst class before the standard quota is consulted.
        if let Some(burst) = self.quotas.guest_burst(action, tier) {
            let key = RateLimitKey {
                class: QuotaClass::GuestBurst,
                tier,
                identity: identity.clone(),
                action,
            };
            let decision = self.admit(&key, &burst, tier).await;
            if !decision.allowed {
                return decision;
            }
        }

        let quota = self.quotas.resolve(action, tier);
        let key = RateLimitKey {
            class: QuotaClass::Standard,
            tier,
            identity,
            action,
        };
        self.admit(&key, &quota, tier).await
    }

    /// Run one key through the primary/fallback state machine
    async fn admit(&self, key: &RateLimitKey, quota: &QuotaConfig, tier: Tier) -> RateLimitDecision {
        match self.attempt(Arc::clone(&self.primary), key, quota).await {
            Ok(decision) => Self::into_decision(decision, quota, tier),
            Err(primary_err) => {
                warn!(
                    key = %key.render(&self.config.storage.key_prefix),
                    error = %primary_err,
                    "Primary counter store unavailable, trying fallback"
                );

                match self.attempt(Arc::clone(&self.fallback), key, quota).await {
                    Ok(decision) => Self::into_decision(decision, quota, tier),
                    Err(fallback_err) => {
                        error!(
                            key = %key.render(&self.config.storage.key_prefix),
                            primary_error = %primary_err,
                            fallback_error = %fallback_err,
                            "Both counter stores failed, denying request"
                        );
                        // Fail closed: no state was counted, deny for a full
                        // window rather than admitting unlimited traffic.
                        RateLimitDecision::denied(quota.max_requests, quota.window_seconds, tier)
                    }
                }
            }
        }
    }

    /// One bounded store attempt
    ///
    /// The attempt runs in its own task: if the calling request is dropped
    /// mid-flight, the counter update still completes in the background, so
    /// the stores never see half-applied increments from cancelled callers.
    async fn attempt(
        &self,
        store: Arc<dyn CounterStore>,
        key: &RateLimitKey,
        quota: &QuotaConfig,
    ) -> Result<AdmitDecision, CounterStoreError> {
        let timeout_seconds = self.config.storage.store_timeout_seconds;
        let key = key.clone();
        let quota = *quota;

        let handle = tokio::spawn(async move { store.try_admit(&key, &quota).await });

        match tokio::time::timeout(Duration::from_secs(timeout_seconds), handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(CounterStoreError::Backend {
                detail: format!("store task failed: {}", join_err),
            }),
            Err(_) => Err(CounterStoreError::Timeout {
                seconds: timeout_seconds,
            }),
        }
    }

    fn into_decision(decision: AdmitDecision, quota: &QuotaConfig, tier: Tier) -> RateLimitDecision {
        match decision {
            AdmitDecision::Admit { remaining } => {
                RateLimitDecision::allowed(quota.max_requests, remaining, tier)
            }
            AdmitDecision::Deny {
                retry_after_seconds,
            } => RateLimitDecision::denied(quota.max_requests, retry_after_seconds, tier),
        }
    }

    /// Start the cleanup task for in-memory storage
    pub fn start_cleanup_task(self: Arc<Self>) {
        let Some(storage) = self.storage.clone() else {
            return;
        };
        let cleanup_interval = Duration::from_secs(self.config.storage.cleanup_interval_seconds);

        tokio::spawn(async move {
            let mut interval = interval(cleanup_interval);

            loop {
                interval.tick().await;
                storage.cleanup().await;
                debug!("Rate limiter cleanup completed");
            }
        });
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
