//! Limitgate - tiered rate limiting engine
//!
//! Decides, for every inbound action, whether a caller may proceed, based on
//! a per-tier quota, a derived caller identity, and a fixed time window.
//!
//! # Modules
//!
//! - [`config`] — Strongly-typed configuration with TOML and environment variable support
//! - [`domain`] — Tiers, caller identities, actions, and the quota table
//! - [`infrastructure`] — Counter stores, identity resolution, and the orchestrating service
//!
//! # Architecture
//!
//! ```text
//! limitgate/
//! ├── domain/              # Pure types
//! │   ├── identity         # Tier, CallerIdentity, RequestContext
//! │   └── quota            # Action, QuotaTable
//! ├── infrastructure/
//! │   ├── identity/        # Resolver and fingerprint hasher
//! │   ├── rate_limiter/    # Primary/fallback adapters and the service
//! │   └── clock            # Injectable time source
//! └── config/              # Configuration management
//! ```
//!
//! # Checking a request
//!
//! ```rust,ignore
//! use limitgate::{Action, Config, RateLimiterService, RequestContext};
//!
//! let config = Config::load()?;
//! let service = RateLimiterService::new(config, pool).await?;
//!
//! let decision = service.check(&ctx, Action::Generate).await;
//! if !decision.allowed {
//!     // surface decision.retry_after_seconds to the client and stop
//! }
//! ```
//!
//! # Configuration
//!
//! Environment variables use the `LIMITGATE__` prefix with double underscore
//! separators:
//!
//! ```bash
//! LIMITGATE__STORAGE__URL=redis://127.0.0.1:6379
//! LIMITGATE__QUOTAS__GENERATE__BASE__MAX_REQUESTS=30
//! ```
//!
//! # Failure semantics
//!
//! Losing the primary counter store degrades to the durable fallback;
//! losing both fails closed: the check denies with a full-window
//! `retry_after_seconds` instead of admitting unlimited traffic.

pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{Config, QuotaConfig};
pub use domain::identity::{
    CallerIdentity, Principal, RequestAttributes, RequestContext, Tier,
};
pub use domain::quota::{Action, QuotaClass, QuotaTable};
pub use infrastructure::rate_limiter::service::RateLimiterService;
pub use infrastructure::rate_limiter::types::{
    AdmitDecision, CounterStore, CounterStoreError, RateLimitDecision, RateLimitKey,
};
