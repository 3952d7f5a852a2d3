//! Quota table
//!
//! Maps (action, tier) to a fixed-window quota. Actions are a closed enum,
//! so an unregistered action cannot reach request time; quota values come
//! from configuration and are validated once at startup.

use crate::config::{ActionQuotasConfig, QuotaConfig, QuotaTableConfig, ValidationError};
use crate::domain::identity::Tier;

/// Rate limited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Script generation, the expensive path
    Generate,
    /// Saving and listing favorites
    Favorite,
    /// Analysis endpoints
    Analyze,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Generate, Action::Favorite, Action::Analyze];

    /// Get the action name for keys and logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Generate => "generate",
            Action::Favorite => "favorite",
            Action::Analyze => "analyze",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Quota class applied to a single check
///
/// Anonymous callers on high-cost actions are counted under two classes at
/// once: the standard per-tier quota and a stricter short-window guest burst
/// cap. Each class keys its own counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaClass {
    Standard,
    GuestBurst,
}

impl QuotaClass {
    /// Key segment for this class
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaClass::Standard => "std",
            QuotaClass::GuestBurst => "burst",
        }
    }
}

/// Per-action quota set resolved from configuration
#[derive(Debug, Clone)]
struct ActionQuotas {
    base: QuotaConfig,
    anon: Option<QuotaConfig>,
    free: Option<QuotaConfig>,
    pro: Option<QuotaConfig>,
    admin: Option<QuotaConfig>,
    guest_burst: Option<QuotaConfig>,
}

impl ActionQuotas {
    fn from_config(action: Action, config: &ActionQuotasConfig) -> Result<Self, ValidationError> {
        let check = |label: &str, quota: &QuotaConfig| -> Result<(), ValidationError> {
            if quota.max_requests == 0 {
                return Err(ValidationError::quota(format!(
                    "{}: {} max_requests must be greater than 0",
                    action, label
                )));
            }
            if quota.window_seconds == 0 {
                return Err(ValidationError::quota(format!(
                    "{}: {} window_seconds must be greater than 0",
                    action, label
                )));
            }
            Ok(())
        };

        check("base quota", &config.base)?;
        for (label, quota) in [
            ("anon override", &config.anon),
            ("free override", &config.free),
            ("pro override", &config.pro),
            ("admin override", &config.admin),
            ("guest burst", &config.guest_burst),
        ] {
            if let Some(quota) = quota {
                check(label, quota)?;
            }
        }

        Ok(Self {
            base: config.base,
            anon: config.anon,
            free: config.free,
            pro: config.pro,
            admin: config.admin,
            guest_burst: config.guest_burst,
        })
    }

    fn for_tier(&self, tier: Tier) -> QuotaConfig {
        let override_quota = match tier {
            Tier::Anon => self.anon,
            Tier::Free => self.free,
            Tier::Pro => self.pro,
            Tier::Admin => self.admin,
        };
        override_quota.unwrap_or(self.base)
    }
}

/// Immutable quota table, built once at process start
#[derive(Debug, Clone)]
pub struct QuotaTable {
    generate: ActionQuotas,
    favorite: ActionQuotas,
    analyze: ActionQuotas,
}

impl QuotaTable {
    /// Build and validate the table from configuration
    ///
    /// Zero limits or windows are a configuration defect and fail here,
    /// never at request time.
    pub fn from_config(config: &QuotaTableConfig) -> Result<Self, ValidationError> {
        Ok(Self {
            generate: ActionQuotas::from_config(Action::Generate, &config.generate)?,
            favorite: ActionQuotas::from_config(Action::Favorite, &config.favorite)?,
            analyze: ActionQuotas::from_config(Action::Analyze, &config.analyze)?,
        })
    }

    fn quotas(&self, action: Action) -> &ActionQuotas {
        match action {
            Action::Generate => &self.generate,
            Action::Favorite => &self.favorite,
            Action::Analyze => &self.analyze,
        }
    }

    /// Resolve the standard quota for (action, tier)
    ///
    /// Pure and total: tiers without an explicit override use the action's
    /// base quota.
    pub fn resolve(&self, action: Action, tier: Tier) -> QuotaConfig {
        self.quotas(action).for_tier(tier)
    }

    /// Stricter guest burst quota, enforced only for anonymous callers on
    /// actions configured with one
    pub fn guest_burst(&self, action: Action, tier: Tier) -> Option<QuotaConfig> {
        if tier != Tier::Anon {
            return None;
        }
        self.quotas(action).guest_burst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuotaTableConfig;

    fn table() -> QuotaTable {
        let mut config = QuotaTableConfig::default();
        config.generate.base = QuotaConfig {
            max_requests: 30,
            window_seconds: 60,
        };
        config.generate.anon = Some(QuotaConfig {
            max_requests: 5,
            window_seconds: 60,
        });
        config.generate.pro = Some(QuotaConfig {
            max_requests: 120,
            window_seconds: 60,
        });
        config.generate.guest_burst = Some(QuotaConfig {
            max_requests: 3,
            window_seconds: 10,
        });
        QuotaTable::from_config(&config).unwrap()
    }

    #[test]
    fn test_override_beats_base() {
        let table = table();
        assert_eq!(table.resolve(Action::Generate, Tier::Anon).max_requests, 5);
        assert_eq!(
            table.resolve(Action::Generate, Tier::Pro).max_requests,
            120
        );
    }

    #[test]
    fn test_missing_override_falls_back_to_base() {
        let table = table();
        assert_eq!(table.resolve(Action::Generate, Tier::Free).max_requests, 30);
        assert_eq!(
            table.resolve(Action::Generate, Tier::Admin).max_requests,
            30
        );
    }

    #[test]
    fn test_guest_burst_only_for_anon() {
        let table = table();
        assert!(table.guest_burst(Action::Generate, Tier::Anon).is_some());
        assert!(table.guest_burst(Action::Generate, Tier::Free).is_none());
        assert!(table.guest_burst(Action::Generate, Tier::Pro).is_none());
        assert!(table.guest_burst(Action::Favorite, Tier::Anon).is_none());
    }

    #[test]
    fn test_zero_quota_rejected_at_build_time() {
        let mut config = QuotaTableConfig::default();
        config.favorite.base.max_requests = 0;
        assert!(QuotaTable::from_config(&config).is_err());

        let mut config = QuotaTableConfig::default();
        config.analyze.base.window_seconds = 0;
        assert!(QuotaTable::from_config(&config).is_err());

        let mut config = QuotaTableConfig::default();
        config.generate.guest_burst = Some(QuotaConfig {
            max_requests: 0,
            window_seconds: 10,
        });
        assert!(QuotaTable::from_config(&config).is_err());
    }
}
