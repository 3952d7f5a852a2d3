//! Device fingerprint hasher
//!
//! Builds a stable pseudo-identity from a fixed, versioned, ordered set of
//! request attributes when no authenticated identity exists. The attribute
//! order, separator, and hash function are part of the contract: identical
//! input attributes must produce the identical hash across process restarts
//! and across reimplementations.

use sha2::{Digest, Sha256};

use crate::domain::identity::RequestAttributes;

/// Version tag mixed into the digest; bump when the attribute list changes
pub const FINGERPRINT_VERSION: &str = "v1";

/// Separator between attributes. A newline cannot appear inside an HTTP
/// header value, so no attribute value can collide with the framing.
const SEPARATOR: char = '\n';

/// Stateless fingerprint hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintHasher;

impl FingerprintHasher {
    pub fn new() -> Self {
        Self
    }

    /// Compute the fingerprint for a request
    ///
    /// Returns `None` when every header attribute is empty, which forces the
    /// resolver to fall back to the network address. The resolved address is
    /// mixed into the digest but on its own never constitutes a fingerprint:
    /// an address-only request is an `Ip` identity, not a `Device`.
    pub fn fingerprint(&self, attributes: &RequestAttributes, resolved_addr: &str) -> Option<String> {
        if attributes.is_empty() {
            return None;
        }

        let mut input = String::new();
        input.push_str(FINGERPRINT_VERSION);
        for value in attributes.iter() {
            input.push(SEPARATOR);
            input.push_str(value.unwrap_or(""));
        }
        input.push(SEPARATOR);
        input.push_str(resolved_addr);

        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        let hash_bytes = hasher.finalize();

        Some(hex::encode(hash_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs() -> RequestAttributes {
        RequestAttributes {
            user_agent: Some("Mozilla/5.0".to_string()),
            accept_language: Some("en-US,en;q=0.9".to_string()),
            accept_encoding: Some("gzip, deflate, br".to_string()),
            accept: Some("text/html".to_string()),
            sec_ch_ua: Some("\"Chromium\";v=\"122\"".to_string()),
            sec_ch_ua_mobile: Some("?0".to_string()),
            sec_ch_ua_platform: Some("\"Linux\"".to_string()),
            sec_fetch_site: Some("same-origin".to_string()),
            sec_fetch_mode: Some("navigate".to_string()),
            sec_fetch_dest: Some("document".to_string()),
            dnt: Some("1".to_string()),
            save_data: None,
            viewport_width: Some("1920".to_string()),
        }
    }

    #[test]
    fn test_identical_attributes_yield_identical_hash() {
        let hasher = FingerprintHasher::new();
        let a = hasher.fingerprint(&attrs(), "203.0.113.5").unwrap();
        let b = hasher.fingerprint(&attrs(), "203.0.113.5").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, a.to_lowercase());
    }

    #[test]
    fn test_any_single_attribute_changes_hash() {
        let hasher = FingerprintHasher::new();
        let base = hasher.fingerprint(&attrs(), "203.0.113.5").unwrap();

        let mut changed = attrs();
        changed.accept_language = Some("fr-FR".to_string());
        assert_ne!(base, hasher.fingerprint(&changed, "203.0.113.5").unwrap());

        let mut changed = attrs();
        changed.save_data = Some("on".to_string());
        assert_ne!(base, hasher.fingerprint(&changed, "203.0.113.5").unwrap());

        assert_ne!(base, hasher.fingerprint(&attrs(), "203.0.113.6").unwrap());
    }

    #[test]
    fn test_value_shift_between_fields_changes_hash() {
        let hasher = FingerprintHasher::new();
        let a = RequestAttributes {
            user_agent: Some("x".to_string()),
            accept_language: None,
            ..Default::default()
        };
        let b = RequestAttributes {
            user_agent: None,
            accept_language: Some("x".to_string()),
            ..Default::default()
        };
        assert_ne!(
            hasher.fingerprint(&a, ""),
            hasher.fingerprint(&b, "")
        );
    }

    #[test]
    fn test_empty_attributes_yield_no_fingerprint() {
        let hasher = FingerprintHasher::new();
        assert!(hasher
            .fingerprint(&RequestAttributes::default(), "203.0.113.5")
            .is_none());

        let blank = RequestAttributes {
            user_agent: Some(String::new()),
            accept: Some(String::new()),
            ..Default::default()
        };
        assert!(hasher.fingerprint(&blank, "203.0.113.5").is_none());
    }
}
