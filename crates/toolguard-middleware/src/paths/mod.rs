//! Filesystem boundary enforcement.
//!
//! `resolve` canonicalizes candidates (symlinks included, missing tails
//! allowed); `guard` checks the result against the configured roots.

pub mod guard;
pub mod resolve;

pub use guard::PathGuard;
pub use resolve::{is_within, resolve, Resolved};
