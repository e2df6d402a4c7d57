//! Shared error type across toolguard crates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable reason codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Caller exceeded its token budget.
    RateLimited,
    /// Caller is not permitted to invoke the operation.
    AccessDenied,
    /// A path argument escaped the permitted roots or matched a blocked pattern.
    PathDenied,
    /// Unexpected system failure (I/O, handler error, internal bug).
    Error,
}

impl ReasonCode {
    /// String representation used in JSON responses and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::RateLimited => "rate_limited",
            ReasonCode::AccessDenied => "access_denied",
            ReasonCode::PathDenied => "path_denied",
            ReasonCode::Error => "error",
        }
    }

    /// Policy rejections are expected outcomes, not faults.
    pub fn is_policy(self) -> bool {
        !matches!(self, ReasonCode::Error)
    }

    /// Whether resubmitting the same request unchanged may succeed.
    ///
    /// A rate-limited request becomes admissible once tokens refill, but the
    /// caller should back off first; a `path_denied` or `access_denied`
    /// request will keep failing with the same input.
    pub fn retryable(self) -> bool {
        matches!(self, ReasonCode::RateLimited | ReasonCode::Error)
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, ToolGuardError>;

/// Unified error type used by core and middleware.
#[derive(Debug, Error)]
pub enum ToolGuardError {
    #[error("configuration: {0}")]
    Config(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("rate limited")]
    RateLimited,
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("path denied: {path} ({reason})")]
    PathDenied { path: String, reason: String },
    #[error("io: {0}")]
    Io(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("tool failed: {0}")]
    Tool(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ToolGuardError {
    /// Map internal error to a stable reason code.
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            ToolGuardError::RateLimited => ReasonCode::RateLimited,
            ToolGuardError::AccessDenied(_) => ReasonCode::AccessDenied,
            ToolGuardError::PathDenied { .. } => ReasonCode::PathDenied,
            ToolGuardError::Config(_)
            | ToolGuardError::UnsupportedVersion
            | ToolGuardError::Io(_)
            | ToolGuardError::UnknownTool(_)
            | ToolGuardError::Tool(_)
            | ToolGuardError::Internal(_) => ReasonCode::Error,
        }
    }
}

impl From<std::io::Error> for ToolGuardError {
    fn from(e: std::io::Error) -> Self {
        ToolGuardError::Io(e.to_string())
    }
}
