//! Top-level facade crate for toolguard.
//!
//! Re-exports core types and the middleware library so users can depend on a single crate.

pub mod core {
    pub use toolguard_core::*;
}

pub mod middleware {
    pub use toolguard_middleware::*;
}
