//! Policy layer (operation patterns, access control, rate limiting).
//!
//! Compiles policy configuration into fast lookup structures for the
//! pipeline to consume at runtime.

pub mod acl;
pub mod allowlist;
pub mod rate_limit;

pub use acl::{AccessDecision, AccessPolicy, DenyReason};
pub use rate_limit::{RateLimitKey, RateLimiter, TokenBucket};
