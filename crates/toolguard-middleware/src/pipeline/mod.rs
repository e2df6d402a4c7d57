//! Request pipeline orchestration.

pub mod guard;
pub mod stage;

pub use guard::CompositeGuard;
pub use stage::{Check, Stage};
