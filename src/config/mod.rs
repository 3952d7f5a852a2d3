//! Configuration management

pub mod validation;

pub use validation::{Validate, ValidationError};

use serde::{Deserialize, Serialize};

/// Fixed-window quota: maximum admissions per window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Maximum requests admitted inside one window
    pub max_requests: u32,
    /// Window length in seconds
    pub window_seconds: u64,
}

/// Quota set for a single action
///
/// Every action carries a tier-independent base quota; tiers without an
/// explicit override use the base. The optional guest burst is a second,
/// stricter quota class applied to anonymous callers only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionQuotasConfig {
    pub base: QuotaConfig,
    pub anon: Option<QuotaConfig>,
    pub free: Option<QuotaConfig>,
    pub pro: Option<QuotaConfig>,
    pub admin: Option<QuotaConfig>,
    pub guest_burst: Option<QuotaConfig>,
}

impl Default for ActionQuotasConfig {
    fn default() -> Self {
        Self {
            base: QuotaConfig {
                max_requests: 60,
                window_seconds: 60,
            },
            anon: None,
            free: None,
            pro: None,
            admin: None,
            guest_burst: None,
        }
    }
}

/// Quotas for every registered action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaTableConfig {
    pub generate: ActionQuotasConfig,
    pub favorite: ActionQuotasConfig,
    pub analyze: ActionQuotasConfig,
}

impl Default for QuotaTableConfig {
    fn default() -> Self {
        Self {
            generate: ActionQuotasConfig {
                base: QuotaConfig {
                    max_requests: 30,
                    window_seconds: 60,
                },
                anon: Some(QuotaConfig {
                    max_requests: 5,
                    window_seconds: 60,
                }),
                free: None,
                pro: Some(QuotaConfig {
                    max_requests: 120,
                    window_seconds: 60,
                }),
                admin: Some(QuotaConfig {
                    max_requests: 600,
                    window_seconds: 60,
                }),
                guest_burst: Some(QuotaConfig {
                    max_requests: 3,
                    window_seconds: 10,
                }),
            },
            favorite: ActionQuotasConfig {
                base: QuotaConfig {
                    max_requests: 60,
                    window_seconds: 60,
                },
                anon: Some(QuotaConfig {
                    max_requests: 10,
                    window_seconds: 60,
                }),
                free: None,
                pro: None,
                admin: None,
                guest_burst: None,
            },
            analyze: ActionQuotasConfig {
                base: QuotaConfig {
                    max_requests: 10,
                    window_seconds: 60,
                },
                anon: Some(QuotaConfig {
                    max_requests: 2,
                    window_seconds: 60,
                }),
                free: None,
                pro: Some(QuotaConfig {
                    max_requests: 30,
                    window_seconds: 60,
                }),
                admin: None,
                guest_burst: Some(QuotaConfig {
                    max_requests: 1,
                    window_seconds: 10,
                }),
            },
        }
    }
}

/// Backend for the primary counter store
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CounterStorageBackend {
    /// Dragonfly/Redis for multi-instance deployments (recommended for production)
    #[default]
    Dragonfly,
    /// In-memory storage (suitable for development/single instance)
    Memory,
}

/// Primary counter store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterStorageConfig {
    /// Backend for the primary counter store
    pub backend: CounterStorageBackend,
    /// Connection URL for the Dragonfly backend
    pub url: String,
    /// Prefix for every rendered counter key
    pub key_prefix: String,
    /// Bound on a single store attempt, in seconds
    pub store_timeout_seconds: u64,
    /// Cleanup interval for expired in-memory entries, in seconds
    pub cleanup_interval_seconds: u64,
}

impl Default for CounterStorageConfig {
    fn default() -> Self {
        Self {
            backend: CounterStorageBackend::Dragonfly,
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "ratelimit".to_string(),
            store_timeout_seconds: 2,
            cleanup_interval_seconds: 300, // 5 minutes
        }
    }
}

/// Fallback relational store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/limitgate".to_string(),
            max_connections: 10,
            acquire_timeout_seconds: 5,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Whether rate limiting is enforced at all
    pub enabled: bool,
    /// Primary counter store settings
    pub storage: CounterStorageConfig,
    /// Fallback relational store settings
    pub database: DatabaseConfig,
    /// Per-action, per-tier quotas
    pub quotas: QuotaTableConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            storage: CounterStorageConfig::default(),
            database: DatabaseConfig::default(),
            quotas: QuotaTableConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from files and environment
    ///
    /// Sources, lowest priority first: `config/default`, `config/{ENV}`,
    /// `config/local`, then `LIMITGATE__`-prefixed environment variables
    /// with `__` as the section separator.
    pub fn load() -> Result<Self, ConfigLoadError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        if let Ok(env) = std::env::var("ENV") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
        }

        builder = builder
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("LIMITGATE").separator("__"));

        let config: Config = builder.build()?.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }
}

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Configuration file error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationError),
}
