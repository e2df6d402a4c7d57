use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use serde::Deserialize;
use toolguard_core::error::{Result, ToolGuardError};

use crate::policy::allowlist::validate_pattern;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardConfig {
    pub version: u32,

    #[serde(default)]
    pub rate_limit: RateLimitSection,

    #[serde(default)]
    pub access: AccessSection,

    pub paths: PathSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

impl GuardConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ToolGuardError::UnsupportedVersion);
        }

        self.rate_limit.validate()?;
        self.access.validate()?;
        self.paths.validate()?;
        self.logging.validate()?;

        Ok(())
    }
}

// --------------------
// rate_limit
// --------------------

/// Bucket keying granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    /// One bucket per caller shared by all operations.
    Caller,
    /// One bucket per (caller, operation).
    #[default]
    CallerOperation,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketRule {
    pub capacity: u32,
    pub refill_per_sec: f64,
}

impl BucketRule {
    fn validate(&self, at: &str) -> Result<()> {
        if self.capacity == 0 {
            return Err(ToolGuardError::Config(format!("{at}.capacity must be >= 1")));
        }
        if !self.refill_per_sec.is_finite() || self.refill_per_sec < 0.0 {
            return Err(ToolGuardError::Config(format!(
                "{at}.refill_per_sec must be a finite number >= 0"
            )));
        }
        Ok(())
    }
}

impl Default for BucketRule {
    /// 120 calls per minute sustained, bursts of 20.
    fn default() -> Self {
        Self {
            capacity: 20,
            refill_per_sec: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvictionSection {
    #[serde(default = "default_idle_ttl_ms")]
    pub idle_ttl_ms: u64,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for EvictionSection {
    fn default() -> Self {
        Self {
            idle_ttl_ms: default_idle_ttl_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

fn default_idle_ttl_ms() -> u64 {
    600_000
}
fn default_sweep_interval_ms() -> u64 {
    60_000
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSection {
    #[serde(default)]
    pub scope: RateLimitScope,

    #[serde(default)]
    pub default: BucketRule,

    /// Per-operation overrides keyed by operation pattern.
    #[serde(default)]
    pub operations: BTreeMap<String, BucketRule>,

    /// Token cost per operation pattern (default 1).
    #[serde(default)]
    pub costs: BTreeMap<String, f64>,

    #[serde(default)]
    pub eviction: EvictionSection,
}

impl RateLimitSection {
    pub fn validate(&self) -> Result<()> {
        self.default.validate("rate_limit.default")?;
        // Caller-wide buckets have no operation to pick an override by.
        if self.scope == RateLimitScope::Caller && !self.operations.is_empty() {
            return Err(ToolGuardError::Config(
                "rate_limit.operations requires scope caller_operation".into(),
            ));
        }
        for (pattern, rule) in &self.operations {
            validate_pattern(pattern)?;
            rule.validate(&format!("rate_limit.operations.{pattern}"))?;
        }

        // A cost larger than the smallest capacity it may be charged against
        // could never be admitted.
        let min_capacity = self
            .operations
            .values()
            .map(|r| r.capacity)
            .chain(std::iter::once(self.default.capacity))
            .min()
            .unwrap_or(self.default.capacity);
        for (pattern, cost) in &self.costs {
            validate_pattern(pattern)?;
            if !cost.is_finite() || *cost <= 0.0 {
                return Err(ToolGuardError::Config(format!(
                    "rate_limit.costs.{pattern} must be a finite number > 0"
                )));
            }
            if *cost > f64::from(min_capacity) {
                return Err(ToolGuardError::Config(format!(
                    "rate_limit.costs.{pattern} exceeds bucket capacity {min_capacity}"
                )));
            }
        }

        if self.eviction.idle_ttl_ms == 0 || self.eviction.sweep_interval_ms == 0 {
            return Err(ToolGuardError::Config(
                "rate_limit.eviction intervals must be > 0".into(),
            ));
        }
        Ok(())
    }
}

// --------------------
// access
// --------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPolicy {
    Allow,
    #[default]
    Deny,
}

/// Coarse privilege tiers, ordered `read < write < admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}

impl AccessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallerEntry {
    /// Caller id, or `*` for the wildcard entry.
    pub id: String,
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    /// Entry-level fallback when neither list matches.
    #[serde(default)]
    pub default: Option<DefaultPolicy>,
    #[serde(default)]
    pub level: Option<AccessLevel>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AccessSection {
    #[serde(default)]
    pub default: DefaultPolicy,

    #[serde(default)]
    pub default_level: Option<AccessLevel>,

    /// Required level per operation pattern.
    #[serde(default)]
    pub levels: BTreeMap<String, AccessLevel>,

    #[serde(default)]
    pub callers: Vec<CallerEntry>,
}

impl AccessSection {
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for c in &self.callers {
            if c.id.is_empty() {
                return Err(ToolGuardError::Config("access.callers[].id must not be empty".into()));
            }
            if !seen.insert(c.id.as_str()) {
                return Err(ToolGuardError::Config(format!(
                    "access.callers: duplicate caller id {}",
                    c.id
                )));
            }
            for p in c.allow.iter().chain(&c.deny) {
                validate_pattern(p)?;
            }
        }
        for p in self.levels.keys() {
            validate_pattern(p)?;
        }
        Ok(())
    }
}

// --------------------
// paths
// --------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathSection {
    pub roots: Vec<PathBuf>,

    /// Base for relative candidates; first root when absent.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub allow_symlinks: bool,

    #[serde(default = "default_path_arguments")]
    pub arguments: Vec<String>,

    #[serde(default = "default_path_suffixes")]
    pub argument_suffixes: Vec<String>,

    #[serde(default)]
    pub blocked_patterns: Vec<String>,
}

impl PathSection {
    pub fn validate(&self) -> Result<()> {
        if self.roots.is_empty() {
            return Err(ToolGuardError::Config("paths.roots must not be empty".into()));
        }
        if self.roots.iter().any(|r| r.as_os_str().is_empty()) {
            return Err(ToolGuardError::Config("paths.roots entries must not be empty".into()));
        }
        for p in &self.blocked_patterns {
            regex::Regex::new(p).map_err(|e| {
                ToolGuardError::Config(format!("paths.blocked_patterns: invalid regex {p}: {e}"))
            })?;
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_path_arguments() -> Vec<String> {
    vec!["path".into(), "file".into(), "directory".into()]
}
fn default_path_suffixes() -> Vec<String> {
    vec!["_path".into(), "_dir".into(), "_file".into()]
}

// --------------------
// logging
// --------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    #[serde(default = "default_slow_threshold_ms")]
    pub slow_threshold_ms: u64,

    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Append-only JSON-lines audit file.
    #[serde(default)]
    pub json_lines: Option<PathBuf>,

    #[serde(default)]
    pub log_arguments: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            slow_threshold_ms: default_slow_threshold_ms(),
            buffer_capacity: default_buffer_capacity(),
            json_lines: None,
            log_arguments: false,
        }
    }
}

impl LoggingSection {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(ToolGuardError::Config("logging.buffer_capacity must be >= 1".into()));
        }
        Ok(())
    }
}

fn default_slow_threshold_ms() -> u64 {
    5000
}
fn default_buffer_capacity() -> usize {
    1024
}
