//! Caller identity types
//!
//! Every request is attributed to exactly one canonical identity. Resolution
//! precedence is authenticated user, then device fingerprint, then network
//! address (see `infrastructure::identity::resolver`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller tier for rate limiting
/// Determines which quota bucket applies to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Unauthenticated callers - lowest limits, plus guest burst caps
    Anon,
    /// Free accounts
    Free,
    /// Paid accounts - higher limits
    Pro,
    /// Operators - highest limits
    Admin,
}

impl Tier {
    /// Get the tier name for keys, logging and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Anon => "anon",
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical identity of a caller, exactly one variant per request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallerIdentity {
    /// Verified authenticated user
    User(Uuid),
    /// Stable device fingerprint (lowercase hex SHA-256)
    Device(String),
    /// Validated network address, or the literal "unknown"
    Ip(String),
}

impl CallerIdentity {
    /// Key segment naming the identity kind
    pub fn kind(&self) -> &'static str {
        match self {
            CallerIdentity::User(_) => "user",
            CallerIdentity::Device(_) => "device",
            CallerIdentity::Ip(_) => "ip",
        }
    }

    /// Key segment carrying the identity value
    pub fn value(&self) -> String {
        match self {
            CallerIdentity::User(id) => id.to_string(),
            CallerIdentity::Device(hash) => hash.clone(),
            CallerIdentity::Ip(addr) => addr.clone(),
        }
    }
}

impl std::fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}

/// Verified authenticated principal attached to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub tier: Tier,
}

/// Request attributes consumed by the fingerprint hasher
///
/// Field order here mirrors the versioned hashing order; see
/// `infrastructure::identity::fingerprint`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestAttributes {
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
    pub accept_encoding: Option<String>,
    pub accept: Option<String>,
    pub sec_ch_ua: Option<String>,
    pub sec_ch_ua_mobile: Option<String>,
    pub sec_ch_ua_platform: Option<String>,
    pub sec_fetch_site: Option<String>,
    pub sec_fetch_mode: Option<String>,
    pub sec_fetch_dest: Option<String>,
    pub dnt: Option<String>,
    pub save_data: Option<String>,
    pub viewport_width: Option<String>,
}

impl RequestAttributes {
    /// True when no attribute carries a non-empty value
    pub fn is_empty(&self) -> bool {
        self.iter().all(|v| v.map_or(true, str::is_empty))
    }

    /// Attribute values in the versioned fingerprint order
    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> {
        [
            self.user_agent.as_deref(),
            self.accept_language.as_deref(),
            self.accept_encoding.as_deref(),
            self.accept.as_deref(),
            self.sec_ch_ua.as_deref(),
            self.sec_ch_ua_mobile.as_deref(),
            self.sec_ch_ua_platform.as_deref(),
            self.sec_fetch_site.as_deref(),
            self.sec_fetch_mode.as_deref(),
            self.sec_fetch_dest.as_deref(),
            self.dnt.as_deref(),
            self.save_data.as_deref(),
            self.viewport_width.as_deref(),
        ]
        .into_iter()
    }
}

/// Resolved caller context handed in by the session layer
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Verified authenticated principal, if any
    pub principal: Option<Principal>,
    /// Raw request attributes for fingerprinting
    pub attributes: RequestAttributes,
    /// Remote network address as reported by the transport or proxy headers
    pub remote_addr: Option<String>,
}

impl RequestContext {
    /// Context for an unauthenticated request
    pub fn anonymous(attributes: RequestAttributes, remote_addr: Option<String>) -> Self {
        Self {
            principal: None,
            attributes,
            remote_addr,
        }
    }

    /// Context for an authenticated request
    pub fn authenticated(
        principal: Principal,
        attributes: RequestAttributes,
        remote_addr: Option<String>,
    ) -> Self {
        Self {
            principal: Some(principal),
            attributes,
            remote_addr,
        }
    }

    /// Tier applied to this request
    pub fn tier(&self) -> Tier {
        self.principal.as_ref().map_or(Tier::Anon, |p| p.tier)
    }
}
