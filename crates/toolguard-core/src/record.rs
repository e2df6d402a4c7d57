//! Per-request audit record.
//!
//! A `RecordTimer` is started when a request enters the chain and consumed
//! exactly once into an immutable `RequestRecord` when the request leaves it.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ReasonCode;

/// Final outcome code stored in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeCode {
    Allowed,
    RateLimited,
    AccessDenied,
    PathDenied,
    Error,
}

impl OutcomeCode {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeCode::Allowed => "allowed",
            OutcomeCode::RateLimited => "rate_limited",
            OutcomeCode::AccessDenied => "access_denied",
            OutcomeCode::PathDenied => "path_denied",
            OutcomeCode::Error => "error",
        }
    }
}

impl From<ReasonCode> for OutcomeCode {
    fn from(r: ReasonCode) -> Self {
        match r {
            ReasonCode::RateLimited => OutcomeCode::RateLimited,
            ReasonCode::AccessDenied => OutcomeCode::AccessDenied,
            ReasonCode::PathDenied => OutcomeCode::PathDenied,
            ReasonCode::Error => OutcomeCode::Error,
        }
    }
}

/// Running timer for one request. Not `Clone`: one timer, one record.
#[derive(Debug)]
pub struct RecordTimer {
    caller_id: String,
    operation: String,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl RecordTimer {
    pub fn start(caller_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
            operation: operation.into(),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Finalize into an immutable record.
    pub fn finish(self, outcome: OutcomeCode, detail: Option<String>) -> RequestRecord {
        let elapsed = self.started.elapsed();
        let finished_at = self.started_at
            + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        RequestRecord {
            caller_id: self.caller_id,
            operation: self.operation,
            started_at: self.started_at,
            finished_at,
            elapsed_us: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            outcome,
            detail,
        }
    }
}

/// Immutable record of one request. Fields are read-only after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestRecord {
    caller_id: String,
    operation: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    elapsed_us: u64,
    outcome: OutcomeCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl RequestRecord {
    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }
    pub fn operation(&self) -> &str {
        &self.operation
    }
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }
    /// Wall-clock span in microseconds (monotonic clock).
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.elapsed_us)
    }
    pub fn outcome(&self) -> OutcomeCode {
        self.outcome
    }
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}
