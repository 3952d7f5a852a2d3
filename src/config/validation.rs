//! Configuration validation module

use crate::config::{Config, CounterStorageConfig, DatabaseConfig, QuotaTableConfig};

/// Trait for validating configuration sections
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Storage configuration error: {message}")]
    Storage { message: String },

    #[error("Database configuration error: {message}")]
    Database { message: String },

    #[error("Quota configuration error: {message}")]
    Quota { message: String },
}

impl ValidationError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::Quota {
            message: message.into(),
        }
    }
}

impl Validate for CounterStorageConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::storage("Storage URL cannot be empty"));
        }

        if self.key_prefix.is_empty() {
            return Err(ValidationError::storage("Key prefix cannot be empty"));
        }

        // Colons delimit key segments; a prefix containing one would break
        // key injectivity.
        if self.key_prefix.contains(':') {
            return Err(ValidationError::storage(format!(
                "Key prefix must not contain ':', got {:?}",
                self.key_prefix
            )));
        }

        if self.store_timeout_seconds == 0 {
            return Err(ValidationError::storage(
                "Store timeout must be greater than 0",
            ));
        }

        if self.cleanup_interval_seconds == 0 {
            return Err(ValidationError::storage(
                "Cleanup interval must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Validate for DatabaseConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::database("Database URL cannot be empty"));
        }

        if self.max_connections == 0 {
            return Err(ValidationError::database(
                "Max connections must be greater than 0",
            ));
        }

        if self.acquire_timeout_seconds == 0 {
            return Err(ValidationError::database(
                "Acquire timeout must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Validate for QuotaTableConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // Building the table performs the per-quota checks; validation here
        // is exactly the build that the service repeats at startup.
        crate::domain::quota::QuotaTable::from_config(self).map(|_| ())
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationError> {
        self.storage.validate()?;
        self.database.validate()?;
        self.quotas.validate()?;
        Ok(())
    }
}
