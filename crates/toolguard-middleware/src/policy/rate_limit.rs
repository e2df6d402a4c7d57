//! Token-bucket rate limiting keyed by (caller, operation).
//!
//! Buckets are created lazily at full capacity and refilled lazily on access;
//! there is no background refill timer. Refill and consumption for one key
//! happen under that key's shard lock, so two concurrent requests can never
//! both spend the same token.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use toolguard_core::error::Result;

use super::allowlist::{OpRule, PatternMap};
use crate::clock::{Clock, SystemClock};
use crate::config::schema::{BucketRule, RateLimitScope, RateLimitSection};

/// Identifies one bucket. `operation == None` is the caller-wide bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    caller_id: String,
    operation: Option<String>,
}

impl RateLimitKey {
    pub fn caller(caller_id: impl Into<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
            operation: None,
        }
    }

    pub fn operation(caller_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
            operation: Some(operation.into()),
        }
    }

    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation.as_deref()
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.caller_id, self.operation.as_deref().unwrap_or("*"))
    }
}

/// Real-valued token bucket. Invariant: `0 <= tokens <= capacity`.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// New bucket, full.
    pub fn new(rule: BucketRule, now: Instant) -> Self {
        let capacity = f64::from(rule.capacity.max(1));
        let refill_rate = if rule.refill_per_sec.is_finite() {
            rule.refill_per_sec.max(0.0)
        } else {
            0.0
        };
        Self {
            capacity,
            tokens: capacity,
            refill_rate,
            last_refill: now,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }

    /// Balance the bucket would hold at `now`, without mutating it.
    pub fn projected(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.refill_rate).min(self.capacity)
    }

    fn refill(&mut self, now: Instant) {
        self.tokens = self.projected(now);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Refill, then spend `cost` if the balance covers it. A rejected
    /// attempt consumes nothing.
    pub fn try_consume(&mut self, cost: f64, now: Instant) -> bool {
        self.refill(now);
        if !cost.is_finite() || cost < 0.0 {
            return false;
        }
        if self.tokens >= cost {
            self.tokens = (self.tokens - cost).max(0.0);
            true
        } else {
            false
        }
    }
}

/// Shared bucket table plus per-operation limits. Construct once, share via Arc.
pub struct RateLimiter {
    buckets: DashMap<RateLimitKey, TokenBucket>,
    scope: RateLimitScope,
    default_rule: BucketRule,
    operations: PatternMap<BucketRule>,
    costs: PatternMap<f64>,
    idle_ttl: Duration,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(section: &RateLimitSection) -> Result<Self> {
        Self::with_clock(section, Arc::new(SystemClock))
    }

    pub fn with_clock(section: &RateLimitSection, clock: Arc<dyn Clock>) -> Result<Self> {
        section.validate()?;
        let now = clock.now();
        Ok(Self {
            buckets: DashMap::new(),
            scope: section.scope,
            default_rule: section.default,
            operations: PatternMap::compile(&section.operations)?,
            costs: PatternMap::compile(&section.costs)?,
            idle_ttl: Duration::from_millis(section.eviction.idle_ttl_ms),
            sweep_interval: Duration::from_millis(section.eviction.sweep_interval_ms),
            last_sweep: Mutex::new(now),
            clock,
        })
    }

    /// Bucket key for a request under the configured scope.
    pub fn key_for(&self, caller_id: &str, operation: &str) -> RateLimitKey {
        match self.scope {
            RateLimitScope::Caller => RateLimitKey::caller(caller_id),
            RateLimitScope::CallerOperation => RateLimitKey::operation(caller_id, operation),
        }
    }

    /// Limits for a key: operation override, else the documented default.
    pub fn rule_for(&self, key: &RateLimitKey) -> BucketRule {
        key.operation_name()
            .and_then(|op| self.operations.lookup(op))
            .copied()
            .unwrap_or(self.default_rule)
    }

    pub fn cost_for(&self, operation: &str) -> f64 {
        self.costs.lookup(operation).copied().unwrap_or(1.0)
    }

    /// Admission check for one request.
    pub fn check(&self, caller_id: &str, operation: &str) -> bool {
        let key = self.key_for(caller_id, operation);
        self.admit(&key, self.cost_for(operation))
    }

    /// Refill-and-consume as one step under the key's lock. Never panics;
    /// an unconfigured key falls back to the default rule.
    pub fn admit(&self, key: &RateLimitKey, cost: f64) -> bool {
        let now = self.clock.now();
        self.maybe_sweep(now);

        if let Some(mut bucket) = self.buckets.get_mut(key) {
            return bucket.try_consume(cost, now);
        }
        let rule = self.rule_for(key);
        let mut bucket = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| TokenBucket::new(rule, now));
        bucket.try_consume(cost, now)
    }

    /// Current (refilled) balance for a key, if its bucket exists.
    pub fn tokens(&self, key: &RateLimitKey) -> Option<f64> {
        let now = self.clock.now();
        self.buckets.get(key).map(|b| b.projected(now))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Operation patterns with explicit limits or costs.
    pub fn referenced_rules(&self) -> Vec<&OpRule> {
        self.operations.rules().chain(self.costs.rules()).collect()
    }

    /// Drop buckets idle for at least `idle_ttl` whose balance has fully
    /// recovered. Removing a full bucket is indistinguishable from keeping
    /// it, so eviction never hands out extra permits. Returns the number removed.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(self.clock.now())
    }

    fn evict_idle_at(&self, now: Instant) -> usize {
        let ttl = self.idle_ttl;
        let mut removed = 0usize;
        self.buckets.retain(|_, b| {
            let idle = now.saturating_duration_since(b.last_refill());
            let evict = idle >= ttl && b.projected(now) >= b.capacity();
            if evict {
                removed += 1;
            }
            !evict
        });
        if removed > 0 {
            tracing::debug!(removed, remaining = self.buckets.len(), "evicted idle rate-limit buckets");
        }
        removed
    }

    // Runs before any bucket lock is taken; retain() would deadlock against
    // a held entry guard.
    fn maybe_sweep(&self, now: Instant) {
        let due = match self.last_sweep.try_lock() {
            Ok(mut last) if now.saturating_duration_since(*last) >= self.sweep_interval => {
                *last = now;
                true
            }
            _ => false,
        };
        if due {
            self.evict_idle_at(now);
        }
    }

    /// Periodic sweeper for hosts that prefer a background task. Stops once
    /// the limiter is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let every = self.sweep_interval;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let Some(limiter) = weak.upgrade() else { break };
                limiter.evict_idle();
            }
        })
    }
}
