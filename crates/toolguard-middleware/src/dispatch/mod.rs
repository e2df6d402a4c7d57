//! Dispatch seam between the guard chain and business logic.
//!
//! Re-exports the registry and handler trait so downstream consumers can
//! depend on this module directly.

pub mod registry;

pub use registry::{ToolHandler, ToolRegistry};
