//! Typed result contract at the chain boundary.
//!
//! Every request ends in exactly one `Outcome`. Downstream code receives an
//! `Admission` and never has to inspect an ambiguous return shape.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ReasonCode, ToolGuardError};

/// Continue token handed to business logic on admission.
///
/// Carries the original operation and arguments unchanged plus every
/// canonicalized path, so handlers never re-resolve a path between check
/// and use.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Admission {
    pub caller_id: String,
    pub operation: String,
    pub arguments: Map<String, Value>,
    /// Canonical form of each validated path argument, keyed by argument
    /// name (`name[i]` for array elements). Empty when no path stage ran.
    pub canonical_paths: BTreeMap<String, PathBuf>,
}

impl Admission {
    /// Canonical path for a single-valued argument.
    pub fn canonical_path(&self, arg: &str) -> Option<&PathBuf> {
        self.canonical_paths.get(arg)
    }
}

/// Structured denial returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub reason: ReasonCode,
    pub message: String,
}

impl Rejection {
    pub fn new(reason: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ReasonCode::RateLimited, message)
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(ReasonCode::AccessDenied, message)
    }

    pub fn path_denied(message: impl Into<String>) -> Self {
        Self::new(ReasonCode::PathDenied, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ReasonCode::Error, message)
    }
}

impl From<ToolGuardError> for Rejection {
    fn from(e: ToolGuardError) -> Self {
        Rejection::new(e.reason_code(), e.to_string())
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}

/// Final decision of the chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Allowed(Admission),
    Rejected(Rejection),
}

impl Outcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Outcome::Allowed(_))
    }

    /// Reason code for rejected outcomes, `None` when allowed.
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            Outcome::Allowed(_) => None,
            Outcome::Rejected(r) => Some(r.reason),
        }
    }

    pub fn into_result(self) -> std::result::Result<Admission, Rejection> {
        match self {
            Outcome::Allowed(a) => Ok(a),
            Outcome::Rejected(r) => Err(r),
        }
    }
}

impl From<std::result::Result<Admission, Rejection>> for Outcome {
    fn from(r: std::result::Result<Admission, Rejection>) -> Self {
        match r {
            Ok(a) => Outcome::Allowed(a),
            Err(r) => Outcome::Rejected(r),
        }
    }
}
