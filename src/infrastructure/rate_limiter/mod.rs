//! Tiered fixed-window rate limiting
//!
//! The engine counts admissions per (quota class, tier, identity, action)
//! key in a primary low-latency store, falls back to an atomic relational
//! counter when the primary is unavailable, and fails closed when both
//! stores are gone.

pub mod fallback;
pub mod primary;
pub mod service;
pub mod storage;
pub mod types;
