//! Composite guard: rate limit -> access control -> path validation ->
//! (dispatch), with the request logger wrapping the whole span.
//!
//! Cheap checks run first. Rate limiting is a hash lookup, access control
//! is pure, and only the path stage touches the filesystem. The first
//! rejecting stage short-circuits everything after it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::Instrument;

use toolguard_core::{
    Admission, Outcome, OutcomeCode, RecordTimer, Rejection, ToolRequest,
};

use super::stage::{Check, Stage};
use crate::dispatch::ToolRegistry;
use crate::obs::{GuardMetrics, RequestLogger};
use crate::paths::PathGuard;
use crate::policy::{AccessDecision, AccessPolicy, DenyReason, RateLimiter};

pub struct CompositeGuard {
    limiter: Arc<RateLimiter>,
    acl: Arc<AccessPolicy>,
    paths: Arc<PathGuard>,
    logger: Arc<RequestLogger>,
    metrics: Arc<GuardMetrics>,
    log_arguments: bool,
}

impl CompositeGuard {
    pub fn new(
        limiter: Arc<RateLimiter>,
        acl: Arc<AccessPolicy>,
        paths: Arc<PathGuard>,
        logger: Arc<RequestLogger>,
        metrics: Arc<GuardMetrics>,
    ) -> Self {
        Self {
            limiter,
            acl,
            paths,
            logger,
            metrics,
            log_arguments: false,
        }
    }

    /// Emit request arguments at debug level. Off by default; arguments may
    /// carry secrets.
    pub fn with_log_arguments(mut self, on: bool) -> Self {
        self.log_arguments = on;
        self
    }

    pub fn acl(&self) -> &Arc<AccessPolicy> {
        &self.acl
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn logger(&self) -> &Arc<RequestLogger> {
        &self.logger
    }

    pub fn metrics(&self) -> &Arc<GuardMetrics> {
        &self.metrics
    }

    /// Run the checks and record the decision. The host dispatches allowed
    /// requests itself.
    pub async fn process(&self, request: ToolRequest) -> Outcome {
        let span = tracing::info_span!(
            "guard",
            caller = %request.caller_id,
            operation = %request.operation
        );
        async move {
            let timer = RecordTimer::start(&request.caller_id, &request.operation);
            let result = self.evaluate(request).await;
            self.finish(timer, result.as_ref().map(|_| ()));
            Outcome::from(result)
        }
        .instrument(span)
        .await
    }

    /// Run the checks, dispatch to the registered handler, and record the
    /// final outcome. Handler failures surface as `error` rejections.
    pub async fn invoke(
        &self,
        request: ToolRequest,
        tools: &ToolRegistry,
    ) -> Result<Value, Rejection> {
        let span = tracing::info_span!(
            "guard",
            caller = %request.caller_id,
            operation = %request.operation
        );
        async move {
            let timer = RecordTimer::start(&request.caller_id, &request.operation);
            let admission = match self.evaluate(request).await {
                Ok(a) => a,
                Err(r) => {
                    self.finish(timer, Err(&r));
                    return Err(r);
                }
            };

            self.metrics
                .stage_evaluations
                .inc(&[("stage", Check::Dispatch.as_str())]);
            tracing::trace!(stage = Stage::Dispatched.as_str());
            let result = tools.dispatch(admission).await.map_err(Rejection::from);
            tracing::trace!(stage = Stage::Completed.as_str());

            self.finish(timer, result.as_ref().map(|_| ()));
            result
        }
        .instrument(span)
        .await
    }

    /// The check stages alone, without logging.
    pub async fn evaluate(&self, request: ToolRequest) -> Result<Admission, Rejection> {
        let ToolRequest {
            caller_id,
            operation,
            arguments,
        } = request;
        let mut stage = Stage::Received;

        if self.log_arguments {
            let shown = Value::Object(arguments.clone());
            tracing::debug!(arguments = %shown, "request arguments");
        }

        // rate limit
        self.metrics
            .stage_evaluations
            .inc(&[("stage", Check::RateLimit.as_str())]);
        if !self.limiter.check(&caller_id, &operation) {
            let key = self.limiter.key_for(&caller_id, &operation);
            return Err(self.reject(stage, Rejection::rate_limited(format!(
                "rate limit exceeded for {key}"
            ))));
        }
        stage = stage.next();

        // access control
        self.metrics
            .stage_evaluations
            .inc(&[("stage", Check::Access.as_str())]);
        if let AccessDecision::Deny(why) = self.acl.authorize(&caller_id, &operation) {
            let msg = match why {
                DenyReason::Listed => format!("operation {operation} is denied for {caller_id}"),
                DenyReason::Level { required, granted } => format!(
                    "operation {operation} requires {} access, {caller_id} has {}",
                    required.as_str(),
                    granted.as_str()
                ),
                DenyReason::Default => {
                    format!("operation {operation} is not permitted for {caller_id}")
                }
            };
            return Err(self.reject(stage, Rejection::access_denied(msg)));
        }
        stage = stage.next();

        // path validation (blocking I/O, off the async workers, no locks held)
        let (arguments, canonical_paths) = if self.paths.has_path_arguments(&arguments) {
            self.metrics
                .stage_evaluations
                .inc(&[("stage", Check::Path.as_str())]);
            let guard = Arc::clone(&self.paths);
            let (checked, arguments) = tokio::task::spawn_blocking(move || {
                let checked = guard.validate_arguments(&arguments);
                (checked, arguments)
            })
            .await
            .map_err(|e| {
                self.reject(stage, Rejection::error(format!("path validation task failed: {e}")))
            })?;
            match checked {
                Ok(paths) => (arguments, paths),
                Err(e) => return Err(self.reject(stage, Rejection::from(e))),
            }
        } else {
            (arguments, BTreeMap::new())
        };
        stage = stage.next();
        tracing::trace!(stage = stage.as_str(), "checks passed");

        Ok(Admission {
            caller_id,
            operation,
            arguments,
            canonical_paths,
        })
    }

    fn reject(&self, stage: Stage, rejection: Rejection) -> Rejection {
        tracing::debug!(
            after = stage.as_str(),
            reason = rejection.reason.as_str(),
            message = %rejection.message,
            "request rejected"
        );
        rejection
    }

    fn finish(&self, timer: RecordTimer, result: Result<(), &Rejection>) {
        let record = match result {
            Ok(()) => timer.finish(OutcomeCode::Allowed, None),
            Err(r) => timer.finish(OutcomeCode::from(r.reason), Some(r.message.clone())),
        };
        self.logger.record(record);
    }
}
