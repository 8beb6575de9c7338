//! Core rate limit engine.
//!
//! Orchestrates tier resolution and the window store behind two calls:
//! `check_limit` (side-effect-free decision) and `record_usage` (commit).
//! Because they are separate, two concurrent requests on one key can both
//! pass the check before either commits; callers that cannot tolerate that
//! brief over-admission use `try_acquire`, which checks and commits under
//! the entry's lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::audit::{AuditRecord, AuditSink, Outcome};
use crate::clock::{to_delta, Clock, SystemClock};

use super::key::{Caller, RateLimitKey};
use super::store::{InMemoryWindowStore, WindowStore};
use super::tier::{TierPolicy, TierQuota};

/// Result of a rate limit decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult {
    /// Whether the request may proceed
    pub allowed: bool,
    /// The tier's limit per window
    pub limit: u64,
    /// Requests left in the current window
    pub remaining: u64,
    /// When the current window resets
    pub reset_at: DateTime<Utc>,
    /// Whole seconds until retry is worthwhile; set only on denial
    pub retry_after_secs: Option<u64>,
}

impl CheckResult {
    /// The reset instant as epoch seconds, for `X-RateLimit-Reset`.
    pub fn reset_epoch(&self) -> i64 {
        self.reset_at.timestamp()
    }
}

/// The rate limit engine.
///
/// Thread-safe; share it behind an `Arc` across request handlers. All parts
/// are passed in explicitly at construction and never change afterwards.
pub struct RateLimiter<S: WindowStore = InMemoryWindowStore> {
    store: Arc<S>,
    policy: TierPolicy,
    clock: Arc<dyn Clock>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl RateLimiter<InMemoryWindowStore> {
    /// Engine over a fresh in-memory store and the system clock.
    pub fn new(policy: TierPolicy) -> Self {
        Self::with_store(
            Arc::new(InMemoryWindowStore::new()),
            policy,
            Arc::new(SystemClock),
        )
    }
}

impl<S: WindowStore> RateLimiter<S> {
    /// Engine over an explicit store and clock.
    pub fn with_store(store: Arc<S>, policy: TierPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            policy,
            clock,
            audit: None,
        }
    }

    /// Attach an audit sink. Appends are spawned, never awaited in-path.
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// The store this engine decides against. The sweeper shares it.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Decide whether the caller's next request on `endpoint` may proceed.
    ///
    /// Read-only: the counter is not advanced. A store failure is logged and
    /// converted to an allow — the API must stay available when the limiter
    /// itself is degraded.
    pub async fn check_limit(&self, caller: &Caller, endpoint: &str) -> CheckResult {
        let quota = self.policy.resolve(&caller.tier);
        let key = RateLimitKey::new(&caller.user_id, endpoint);
        let now = self.clock.now();

        trace!(key = %key, limit = quota.limit, "Checking rate limit");

        let result = match self.store.current(&key, now) {
            Ok(state) => {
                let (count, window_start) = match state {
                    Some(s) => (s.count, s.window_start),
                    None => (0, now),
                };
                Self::decide(quota, count, window_start, now)
            }
            Err(e) => {
                warn!(
                    key = %key,
                    operation = "current",
                    error = %e,
                    "Window store unavailable, failing open"
                );
                Self::fail_open(quota, now)
            }
        };

        if !result.allowed {
            debug!(key = %key, limit = quota.limit, "Rate limit exceeded");
        }

        self.emit_audit(key, now, result.allowed);
        result
    }

    /// Commit one admitted request against the caller's counter.
    ///
    /// Returns the new count in the window. Meant to be called after a
    /// `check_limit` that allowed the request, but the store does not trust
    /// the caller: the increment is safe regardless.
    pub async fn record_usage(&self, caller: &Caller, endpoint: &str) -> u64 {
        let quota = self.policy.resolve(&caller.tier);
        let key = RateLimitKey::new(&caller.user_id, endpoint);
        let now = self.clock.now();

        match self.store.increment(&key, quota.window, now) {
            Ok(count) => {
                trace!(key = %key, count = count, "Recorded usage");
                count
            }
            Err(e) => {
                warn!(
                    key = %key,
                    operation = "increment",
                    error = %e,
                    "Window store unavailable, usage not recorded"
                );
                0
            }
        }
    }

    /// Decide and commit in one step, under the entry's lock.
    ///
    /// `remaining` reflects the state after this request was counted, so the
    /// last admitted request in a window reports `remaining == 0`.
    pub async fn try_acquire(&self, caller: &Caller, endpoint: &str) -> CheckResult {
        let quota = self.policy.resolve(&caller.tier);
        let key = RateLimitKey::new(&caller.user_id, endpoint);
        let now = self.clock.now();

        let result = match self.store.acquire(&key, quota.window, quota.limit, now) {
            Ok(admission) => {
                let reset_at = admission.window_start + to_delta(quota.window);
                if admission.admitted {
                    CheckResult {
                        allowed: true,
                        limit: quota.limit,
                        remaining: quota.limit.saturating_sub(admission.count),
                        reset_at,
                        retry_after_secs: None,
                    }
                } else {
                    debug!(key = %key, limit = quota.limit, "Rate limit exceeded");
                    CheckResult {
                        allowed: false,
                        limit: quota.limit,
                        remaining: 0,
                        reset_at,
                        retry_after_secs: Some(retry_after_secs(reset_at, now)),
                    }
                }
            }
            Err(e) => {
                warn!(
                    key = %key,
                    operation = "acquire",
                    error = %e,
                    "Window store unavailable, failing open"
                );
                Self::fail_open(quota, now)
            }
        };

        self.emit_audit(key, now, result.allowed);
        result
    }

    fn decide(
        quota: TierQuota,
        count: u64,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CheckResult {
        let reset_at = window_start + to_delta(quota.window);
        let allowed = count < quota.limit;

        CheckResult {
            allowed,
            limit: quota.limit,
            remaining: quota.limit.saturating_sub(count),
            reset_at,
            retry_after_secs: if allowed {
                None
            } else {
                Some(retry_after_secs(reset_at, now))
            },
        }
    }

    /// Neutral allow used when the store is unreachable.
    fn fail_open(quota: TierQuota, now: DateTime<Utc>) -> CheckResult {
        CheckResult {
            allowed: true,
            limit: quota.limit,
            remaining: quota.limit,
            reset_at: now + to_delta(quota.window),
            retry_after_secs: None,
        }
    }

    fn emit_audit(&self, key: RateLimitKey, at: DateTime<Utc>, allowed: bool) {
        let Some(sink) = &self.audit else {
            return;
        };
        let sink = Arc::clone(sink);
        let record = AuditRecord {
            user_id: key.user_id,
            endpoint: key.endpoint,
            at,
            outcome: if allowed {
                Outcome::Allowed
            } else {
                Outcome::Denied
            },
        };
        tokio::spawn(async move {
            if let Err(e) = sink.append(record).await {
                warn!(error = %e, "Audit append failed");
            }
        });
    }
}

/// Whole seconds until `reset_at`, rounded up, at least 1.
fn retry_after_secs(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = reset_at.signed_duration_since(now).num_milliseconds();
    if millis <= 0 {
        1
    } else {
        (millis as u64).div_ceil(1000)
    }
}
