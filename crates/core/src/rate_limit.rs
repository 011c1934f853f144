//! Tiered admission control for expensive routes.
//!
//! A request is checked against sliding-window counters in this
//! order:
//!
//! 1. `global`: one counter per route, always checked.
//! 2. `user`: keyed by user id and route, when a user id is known.
//! 3. `ip`: keyed by client IP and route, only for anonymous callers.
//!
//! Every inspected counter records the attempt, including attempts that end
//! up denied. Tiers are independent; a request denied at the user tier has
//! still consumed one unit of the global budget.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CoreError;
use crate::stores::StoreError;
use crate::types::Timestamp;

/// Default global budget: 5000 requests per rolling 24 hours.
pub const DEFAULT_GLOBAL_MAX: u64 = 5000;
pub const DEFAULT_GLOBAL_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Default per-user budget: 10 requests per rolling minute.
pub const DEFAULT_USER_MAX: u64 = 10;
pub const DEFAULT_USER_WINDOW: Duration = Duration::from_secs(60);

/// Default per-IP budget: 5 requests per rolling minute.
pub const DEFAULT_IP_MAX: u64 = 5;
pub const DEFAULT_IP_WINDOW: Duration = Duration::from_secs(60);

/// Prefix for all counter keys.
const KEY_PREFIX: &str = "ratelimit";

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// One of the independent quota pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Global,
    User,
    Ip,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::User => "user",
            Self::Ip => "ip",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Budget for a single tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimit {
    pub max_requests: u64,
    pub window: Duration,
}

/// Budgets for all three tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub global: TierLimit,
    pub user: TierLimit,
    pub ip: TierLimit,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            global: TierLimit {
                max_requests: DEFAULT_GLOBAL_MAX,
                window: DEFAULT_GLOBAL_WINDOW,
            },
            user: TierLimit {
                max_requests: DEFAULT_USER_MAX,
                window: DEFAULT_USER_WINDOW,
            },
            ip: TierLimit {
                max_requests: DEFAULT_IP_MAX,
                window: DEFAULT_IP_WINDOW,
            },
        }
    }
}

impl RateLimitPolicy {
    pub fn limit_for(&self, tier: Tier) -> TierLimit {
        match tier {
            Tier::Global => self.global,
            Tier::User => self.user,
            Tier::Ip => self.ip,
        }
    }
}

// ---------------------------------------------------------------------------
// Counter store
// ---------------------------------------------------------------------------

/// State of one sliding window right after recording a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUsage {
    /// Hits inside the trailing window, including the one just recorded.
    pub count: u64,
    /// When the oldest hit in the window falls out of it.
    pub reset_at: Timestamp,
}

/// Process-external store of sliding-window counters.
///
/// `record_hit` must add the hit and prune entries older than `window` as a
/// single atomic step, and must let idle keys expire on their own.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn record_hit(&self, key: &str, window: Duration) -> Result<WindowUsage, StoreError>;
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Outcome of one admission check. Built per request, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denied_tier: Option<Tier>,
}

impl RateLimitDecision {
    fn from_usage(limit: TierLimit, usage: WindowUsage, denied_tier: Option<Tier>) -> Self {
        Self {
            allowed: denied_tier.is_none(),
            limit: limit.max_requests,
            remaining: limit.max_requests.saturating_sub(usage.count),
            reset_at: usage.reset_at,
            denied_tier,
        }
    }

    /// Whole seconds until the reported window resets, at least 1.
    pub fn retry_after_secs(&self, now: Timestamp) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Evaluates requests against the global, user, and IP tiers.
#[derive(Clone)]
pub struct AdmissionController {
    store: Arc<dyn CounterStore>,
    policy: RateLimitPolicy,
    key_prefix: String,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn CounterStore>, policy: RateLimitPolicy) -> Self {
        Self {
            store,
            policy,
            key_prefix: KEY_PREFIX.to_string(),
        }
    }

    /// A controller with the same store and policy whose counters live
    /// under `ratelimit:<namespace>:…`, disjoint from the unscoped ones.
    pub fn scoped(&self, namespace: &str) -> Self {
        Self {
            store: self.store.clone(),
            policy: self.policy,
            key_prefix: format!("{}:{namespace}", self.key_prefix),
        }
    }

    /// Decide whether a request may proceed.
    ///
    /// Blank identifiers are treated as absent. The allowed decision always
    /// reports the global tier's figures so clients see consistent headers.
    /// A counter-store failure is returned as an error; the caller picks the
    /// fail-open or fail-closed policy.
    pub async fn evaluate(
        &self,
        user_id: Option<&str>,
        ip: Option<&str>,
        route_key: &str,
    ) -> Result<RateLimitDecision, CoreError> {
        let route_key = route_key.trim();
        if route_key.is_empty() {
            return Err(CoreError::Validation("route key is required".into()));
        }

        let global = self
            .check(Tier::Global, &self.key(Tier::Global, None, route_key))
            .await?;
        if !global.allowed {
            return Ok(global);
        }

        let user_id = user_id.map(str::trim).filter(|s| !s.is_empty());
        let ip = ip.map(str::trim).filter(|s| !s.is_empty());

        let actor = match (user_id, ip) {
            (Some(user), _) => Some((Tier::User, user)),
            (None, Some(ip)) => Some((Tier::Ip, ip)),
            (None, None) => None,
        };

        if let Some((tier, identity)) = actor {
            let decision = self
                .check(tier, &self.key(tier, Some(identity), route_key))
                .await?;
            if !decision.allowed {
                return Ok(decision);
            }
        }

        Ok(global)
    }

    fn key(&self, tier: Tier, identity: Option<&str>, route_key: &str) -> String {
        prefixed_key(&self.key_prefix, tier, identity, route_key)
    }

    async fn check(&self, tier: Tier, key: &str) -> Result<RateLimitDecision, StoreError> {
        let limit = self.policy.limit_for(tier);
        let usage = self.store.record_hit(key, limit.window).await?;
        let denied = (usage.count > limit.max_requests).then_some(tier);
        Ok(RateLimitDecision::from_usage(limit, usage, denied))
    }
}

/// Counter key for a tier, e.g. `ratelimit:user:42:/api/v1/generate`.
pub fn counter_key(tier: Tier, identity: Option<&str>, route_key: &str) -> String {
    prefixed_key(KEY_PREFIX, tier, identity, route_key)
}

fn prefixed_key(prefix: &str, tier: Tier, identity: Option<&str>, route_key: &str) -> String {
    match identity {
        Some(id) => format!("{prefix}:{tier}:{id}:{route_key}"),
        None => format!("{prefix}:{tier}:{route_key}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
