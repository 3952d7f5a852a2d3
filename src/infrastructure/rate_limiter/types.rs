//! Rate limiter types and core data structures

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::QuotaConfig;
use crate::domain::identity::{CallerIdentity, Tier};
use crate::domain::quota::{Action, QuotaClass};

/// Key identifying one logical counter
///
/// Rendering is injective: class, tier, kind, and action come from closed
/// colon-free vocabularies at fixed positions, so the variable identity
/// value in the middle (which may itself contain colons, as IPv6 literals
/// do) can always be recovered unambiguously. Both adapters render the same
/// triple to the same string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub class: QuotaClass,
    pub tier: Tier,
    pub identity: CallerIdentity,
    pub action: Action,
}

impl RateLimitKey {
    /// Render the key with a store prefix
    pub fn render(&self, prefix: &str) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}",
            prefix,
            self.class.as_str(),
            self.tier.as_str(),
            self.identity.kind(),
            self.identity.value(),
            self.action.as_str()
        )
    }
}

/// Mutable counter state for one key
///
/// Created on the first request of a window, incremented inside it, and
/// replaced by the first request after `window_reset_at`. Physical TTL
/// expiry in the store is hygiene only: a missing record means a fresh
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRecord {
    /// Requests counted in the current window
    pub count: u32,
    /// End of the current window, unix epoch milliseconds
    pub window_reset_at: u64,
}

impl CounterRecord {
    /// Fresh record for a window opening now
    pub fn open(now_millis: u64, window_seconds: u64) -> Self {
        Self {
            count: 1,
            window_reset_at: now_millis + window_seconds * 1_000,
        }
    }

    /// Whether the window has passed as of `now_millis`
    pub fn expired(&self, now_millis: u64) -> bool {
        now_millis >= self.window_reset_at
    }

    /// Seconds until the window resets, rounded up
    pub fn retry_after_seconds(&self, now_millis: u64) -> u64 {
        (self.window_reset_at.saturating_sub(now_millis) + 999) / 1_000
    }
}

/// Outcome of one counter store admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitDecision {
    /// Admitted; `remaining` is the number of further admissions left
    Admit { remaining: u32 },
    /// Quota exceeded for the current window
    Deny { retry_after_seconds: u64 },
}

/// Operational counter store failure
///
/// A logical deny is not an error; these are infrastructure conditions. For
/// the primary adapter they trigger the fallback, for the fallback adapter
/// they propagate to the fail-closed path.
#[derive(Debug, thiserror::Error)]
pub enum CounterStoreError {
    #[error("counter store backend error: {detail}")]
    Backend { detail: String },

    #[error("counter store attempt timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

/// Counting contract shared by the primary and fallback adapters
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count this request against `key` and decide admission
    async fn try_admit(
        &self,
        key: &RateLimitKey,
        quota: &QuotaConfig,
    ) -> Result<AdmitDecision, CounterStoreError>;
}

/// Result of a rate limit check
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Maximum requests allowed in the applied window
    pub limit: u32,
    /// Remaining requests in the applied window
    pub remaining: u32,
    /// Seconds to wait before retrying (only set when denied)
    pub retry_after_seconds: Option<u64>,
    /// The tier that was applied
    pub tier: Tier,
}

impl RateLimitDecision {
    /// Create a new allowed result
    pub fn allowed(limit: u32, remaining: u32, tier: Tier) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            retry_after_seconds: None,
            tier,
        }
    }

    /// Create a new denied result
    pub fn denied(limit: u32, retry_after_seconds: u64, tier: Tier) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            retry_after_seconds: Some(retry_after_seconds),
            tier,
        }
    }

    /// Unlimited result used when enforcement is disabled
    pub fn unlimited(tier: Tier) -> Self {
        Self {
            allowed: true,
            limit: u32::MAX,
            remaining: u32::MAX,
            retry_after_seconds: None,
            tier,
        }
    }
}
