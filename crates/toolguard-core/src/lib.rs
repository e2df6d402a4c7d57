//! toolguard core: transport-agnostic request, outcome and record types.
//!
//! This crate defines the contracts shared by the middleware chain, the tool
//! handlers it guards, and whatever host feeds it requests. It carries no
//! runtime or filesystem dependencies so it can be reused in multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `ToolGuardError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod outcome;
pub mod record;
pub mod request;

/// Shared result type.
pub use error::{ReasonCode, Result, ToolGuardError};
pub use outcome::{Admission, Outcome, Rejection};
pub use record::{OutcomeCode, RecordTimer, RequestRecord};
pub use request::ToolRequest;
