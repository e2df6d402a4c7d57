//! Per-request state machine.
//!
//! `Received -> RateChecked -> AccessChecked -> PathChecked -> Dispatched -> Completed`.
//! Any check may end the request instead; rejection is terminal and skips
//! every later stage, dispatch included.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    RateChecked,
    AccessChecked,
    PathChecked,
    Dispatched,
    Completed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::RateChecked => "rate_checked",
            Stage::AccessChecked => "access_checked",
            Stage::PathChecked => "path_checked",
            Stage::Dispatched => "dispatched",
            Stage::Completed => "completed",
        }
    }

    /// The only forward transition out of this stage.
    pub fn next(self) -> Stage {
        match self {
            Stage::Received => Stage::RateChecked,
            Stage::RateChecked => Stage::AccessChecked,
            Stage::AccessChecked => Stage::PathChecked,
            Stage::PathChecked => Stage::Dispatched,
            Stage::Dispatched | Stage::Completed => Stage::Completed,
        }
    }
}

/// Check stages, used as the `stage` label on evaluation counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    RateLimit,
    Access,
    Path,
    Dispatch,
}

impl Check {
    pub fn as_str(self) -> &'static str {
        match self {
            Check::RateLimit => "rate_limit",
            Check::Access => "access",
            Check::Path => "path",
            Check::Dispatch => "dispatch",
        }
    }
}
