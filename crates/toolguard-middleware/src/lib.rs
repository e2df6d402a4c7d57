//! toolguard middleware library entry.
//!
//! This crate wires the rate limiter, access control list, path boundary
//! guard and request logger into a composite guard that sits in front of a
//! tool-invocation host. It is consumed by the binary (`main.rs`) and by
//! integration tests.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod app_state;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod obs;
pub mod paths;
pub mod pipeline;
pub mod policy;
