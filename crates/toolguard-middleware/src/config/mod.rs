//! Guard config loader (strict parsing).

pub mod schema;

use std::fs;
use std::path::Path;

use toolguard_core::error::{Result, ToolGuardError};

pub use schema::{
    AccessLevel, AccessSection, BucketRule, CallerEntry, DefaultPolicy, EvictionSection,
    GuardConfig, LoggingSection, PathSection, RateLimitScope, RateLimitSection,
};

pub fn load_from_file(path: impl AsRef<Path>) -> Result<GuardConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path).map_err(|e| {
        ToolGuardError::Config(format!("read config {} failed: {e}", path.display()))
    })?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GuardConfig> {
    let cfg: GuardConfig = serde_yaml::from_str(s)
        .map_err(|e| ToolGuardError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
