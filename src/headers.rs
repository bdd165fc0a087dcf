//! `X-RateLimit-*` response headers.

use std::collections::BTreeMap;

use crate::decision::{Allowance, Decision, Denial};
use crate::policy::RateLimitPolicy;
use crate::store::RateLimitStore;

/// Header carrying the policy ceiling.
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
/// Header carrying the requests left in the window.
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
/// Header carrying the window end in Unix seconds, rounded up.
pub const HEADER_RESET: &str = "X-RateLimit-Reset";

/// The three standard rate-limit header values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// Requests allowed per window.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Window end, Unix seconds (ceiling of the millisecond instant).
    pub reset_secs: u64,
}

impl RateLimitHeaders {
    /// Project the store's current state for `identifier` into headers.
    ///
    /// Read-only: no request slot is consumed.
    pub fn query(store: &RateLimitStore, identifier: &str, policy: &RateLimitPolicy) -> Self {
        let (remaining, reset_at) = store.snapshot(identifier, policy);
        Self::new(policy.max_requests(), remaining, reset_at)
    }

    fn new(limit: u32, remaining: u32, reset_at_millis: u64) -> Self {
        Self { limit, remaining, reset_secs: reset_at_millis.div_ceil(1000) }
    }

    /// `(name, value)` pairs in `Limit`, `Remaining`, `Reset` order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, String)> {
        [
            (HEADER_LIMIT, self.limit.to_string()),
            (HEADER_REMAINING, self.remaining.to_string()),
            (HEADER_RESET, self.reset_secs.to_string()),
        ]
        .into_iter()
    }

    /// Exactly the three headers as an owned map.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

impl From<&Allowance> for RateLimitHeaders {
    fn from(a: &Allowance) -> Self {
        Self::new(a.limit, a.remaining, a.reset_at)
    }
}

impl From<&Denial> for RateLimitHeaders {
    fn from(d: &Denial) -> Self {
        Self::new(d.limit, 0, d.reset_at)
    }
}

impl From<&Decision> for RateLimitHeaders {
    fn from(d: &Decision) -> Self {
        match d {
            Decision::Allowed(a) => a.into(),
            Decision::Denied(d) => d.into(),
        }
    }
}
