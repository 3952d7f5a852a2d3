//! Caller identity resolver
//!
//! Derives the single canonical identity for a request: a verified
//! authenticated user wins over a device fingerprint, which wins over the
//! raw network address.

use std::net::IpAddr;
use std::str::FromStr;

use tracing::debug;

use crate::domain::identity::{CallerIdentity, RequestContext};
use crate::infrastructure::identity::fingerprint::FingerprintHasher;

/// Sentinel used when no usable network address is present. Also replaces
/// any address that fails strict IP validation, so spoofed proxy headers
/// cannot inject arbitrary bytes into keys or logs.
pub const UNKNOWN_ADDR: &str = "unknown";

/// Stateless identity resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct CallerIdentityResolver {
    hasher: FingerprintHasher,
}

impl CallerIdentityResolver {
    pub fn new() -> Self {
        Self {
            hasher: FingerprintHasher::new(),
        }
    }

    /// Resolve the canonical identity for a request
    pub fn resolve(&self, ctx: &RequestContext) -> CallerIdentity {
        if let Some(principal) = &ctx.principal {
            return CallerIdentity::User(principal.user_id);
        }

        let addr = Self::validate_addr(ctx.remote_addr.as_deref());

        if let Some(hash) = self.hasher.fingerprint(&ctx.attributes, &addr) {
            return CallerIdentity::Device(hash);
        }

        debug!(addr = %addr, "No fingerprintable attributes, falling back to address identity");
        CallerIdentity::Ip(addr)
    }

    /// Validate a raw address against strict IPv4/IPv6 grammar
    fn validate_addr(raw: Option<&str>) -> String {
        match raw {
            Some(candidate) => match IpAddr::from_str(candidate.trim()) {
                Ok(addr) => addr.to_string(),
                Err(_) => {
                    debug!(raw = %candidate, "Discarding malformed remote address");
                    UNKNOWN_ADDR.to_string()
                }
            },
            None => UNKNOWN_ADDR.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::{Principal, RequestAttributes, Tier};
    use uuid::Uuid;

    fn fingerprintable_attrs() -> RequestAttributes {
        RequestAttributes {
            user_agent: Some("Mozilla/5.0".to_string()),
            accept_language: Some("en-US".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_authenticated_user_wins() {
        let user_id = Uuid::new_v4();
        let ctx = RequestContext::authenticated(
            Principal {
                user_id,
                tier: Tier::Pro,
            },
            fingerprintable_attrs(),
            Some("203.0.113.5".to_string()),
        );

        let resolver = CallerIdentityResolver::new();
        assert_eq!(resolver.resolve(&ctx), CallerIdentity::User(user_id));
    }

    #[test]
    fn test_fingerprint_beats_address() {
        let ctx = RequestContext::anonymous(
            fingerprintable_attrs(),
            Some("203.0.113.5".to_string()),
        );

        let resolver = CallerIdentityResolver::new();
        match resolver.resolve(&ctx) {
            CallerIdentity::Device(hash) => assert_eq!(hash.len(), 64),
            other => panic!("expected Device identity, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_address_yields_ip() {
        let ctx = RequestContext::anonymous(
            RequestAttributes::default(),
            Some("203.0.113.5".to_string()),
        );

        let resolver = CallerIdentityResolver::new();
        assert_eq!(
            resolver.resolve(&ctx),
            CallerIdentity::Ip("203.0.113.5".to_string())
        );
    }

    #[test]
    fn test_ipv6_address_accepted() {
        let ctx = RequestContext::anonymous(
            RequestAttributes::default(),
            Some("2001:db8::1".to_string()),
        );

        let resolver = CallerIdentityResolver::new();
        assert_eq!(
            resolver.resolve(&ctx),
            CallerIdentity::Ip("2001:db8::1".to_string())
        );
    }

    #[test]
    fn test_malformed_address_becomes_unknown() {
        let resolver = CallerIdentityResolver::new();

        for bad in ["203.0.113.5, 10.0.0.1", "evil\nhost", "300.1.1.1", ""] {
            let ctx = RequestContext::anonymous(
                RequestAttributes::default(),
                Some(bad.to_string()),
            );
            assert_eq!(
                resolver.resolve(&ctx),
                CallerIdentity::Ip(UNKNOWN_ADDR.to_string()),
                "address {bad:?} should be replaced by the sentinel"
            );
        }
    }

    #[test]
    fn test_missing_address_becomes_unknown() {
        let resolver = CallerIdentityResolver::new();
        let ctx = RequestContext::anonymous(RequestAttributes::default(), None);
        assert_eq!(
            resolver.resolve(&ctx),
            CallerIdentity::Ip(UNKNOWN_ADDR.to_string())
        );
    }
}
