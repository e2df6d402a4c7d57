//! Shared application state: compiled policy plus the tool registry.
//!
//! Built once at startup from a validated `GuardConfig`. Every store is
//! owned by this instance (no process-wide singletons), so tests can build
//! isolated states side by side.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use toolguard_core::error::Result;
use toolguard_core::{Outcome, Rejection, ToolRequest};

use crate::clock::{Clock, SystemClock};
use crate::config::GuardConfig;
use crate::dispatch::{ToolHandler, ToolRegistry};
use crate::obs::{GuardMetrics, JsonLinesSink, RecordBuffer, RequestLogger};
use crate::paths::PathGuard;
use crate::pipeline::CompositeGuard;
use crate::policy::allowlist::OpRule;
use crate::policy::{AccessPolicy, RateLimiter};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    tools: Arc<ToolRegistry>,
}

struct AppStateInner {
    cfg: GuardConfig,
    guard: CompositeGuard,
}

impl AppState {
    /// Build application state. Any configuration fault is returned, never
    /// silently defaulted.
    pub fn new(cfg: GuardConfig) -> Result<Self> {
        Self::with_clock(cfg, Arc::new(SystemClock))
    }

    pub fn with_clock(cfg: GuardConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        cfg.validate()?;

        let metrics = Arc::new(GuardMetrics::default());
        let limiter = Arc::new(RateLimiter::with_clock(&cfg.rate_limit, clock)?);
        let acl = Arc::new(AccessPolicy::new(&cfg.access)?);
        let paths = Arc::new(PathGuard::new(&cfg.paths)?);

        let mut logger = RequestLogger::new(
            Arc::clone(&metrics),
            Duration::from_millis(cfg.logging.slow_threshold_ms),
            cfg.logging.buffer_capacity,
        );
        if let Some(path) = &cfg.logging.json_lines {
            logger = logger.with_sink(Arc::new(JsonLinesSink::open(path)?));
        }

        tracing::debug!(
            roots = paths.roots().len(),
            scope = ?cfg.rate_limit.scope,
            default_access = ?cfg.access.default,
            "guard policy compiled"
        );

        let guard = CompositeGuard::new(limiter, acl, paths, Arc::new(logger), metrics)
            .with_log_arguments(cfg.logging.log_arguments);

        Ok(Self {
            inner: Arc::new(AppStateInner { cfg, guard }),
            tools: Arc::new(ToolRegistry::new()),
        })
    }

    pub fn cfg(&self) -> &GuardConfig {
        &self.inner.cfg
    }

    pub fn guard(&self) -> &CompositeGuard {
        &self.inner.guard
    }

    pub fn tools(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.tools)
    }

    pub fn register_tool(&self, tool: Arc<dyn ToolHandler>) {
        self.tools.register(tool);
    }

    /// Exact operation names referenced by policy that no registered tool
    /// provides. Each is logged as a warning; likely a typo in config.
    pub fn unregistered_policy_references(&self) -> Vec<String> {
        let guard = self.guard();
        let mut missing: Vec<String> = guard
            .limiter()
            .referenced_rules()
            .into_iter()
            .chain(guard.acl().referenced_rules())
            .filter_map(|r| match r {
                OpRule::Exact(name) if !self.tools.contains(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        missing.sort();
        missing.dedup();
        for op in &missing {
            tracing::warn!(operation = %op, "policy refers to an operation with no registered tool");
        }
        missing
    }

    pub async fn process(&self, request: ToolRequest) -> Outcome {
        self.guard().process(request).await
    }

    pub async fn invoke(&self, request: ToolRequest) -> std::result::Result<Value, Rejection> {
        self.guard().invoke(request, &self.tools).await
    }

    /// Recent request records for reporting collaborators.
    pub fn records(&self) -> Arc<RecordBuffer> {
        self.guard().logger().records()
    }

    pub fn metrics(&self) -> Arc<GuardMetrics> {
        Arc::clone(self.guard().metrics())
    }

    pub fn metrics_text(&self) -> String {
        let buckets = u64::try_from(self.guard().limiter().len()).unwrap_or(u64::MAX);
        self.guard()
            .metrics()
            .render(&[("toolguard_rate_limit_buckets", buckets)])
    }
}
