//! The result of one admission check.

use std::time::Duration;

/// A request that fits in the current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allowance {
    /// Policy ceiling for the window.
    pub limit: u32,
    /// Requests still permitted in this window after this one.
    /// Useful for `X-RateLimit-Remaining` headers.
    pub remaining: u32,
    /// Epoch milliseconds at which the window ends.
    pub reset_at: u64,
}

/// A request that exceeded its allowance.
///
/// `Display` is exactly the policy's denial message so protocol layers can
/// forward it unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Denial {
    /// Policy ceiling for the window.
    pub limit: u32,
    /// The policy's denial message.
    pub message: String,
    /// Status the protocol layer should answer with.
    pub status_code: u16,
    /// Epoch milliseconds at which the window ends.
    pub reset_at: u64,
}

impl Denial {
    /// How long the caller should wait before retrying, measured from `now_millis`.
    /// Useful for `Retry-After` headers.
    pub fn retry_after(&self, now_millis: u64) -> Duration {
        Duration::from_millis(self.reset_at.saturating_sub(now_millis))
    }
}

/// The decision returned by a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The request is allowed to proceed.
    Allowed(Allowance),
    /// The request is denied. Denial leaves the window's count untouched.
    Denied(Denial),
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }

    /// Remaining requests in the window; always `0` for a denial.
    pub fn remaining(&self) -> u32 {
        match self {
            Decision::Allowed(a) => a.remaining,
            Decision::Denied(_) => 0,
        }
    }

    /// Epoch milliseconds at which the window ends.
    pub fn reset_at(&self) -> u64 {
        match self {
            Decision::Allowed(a) => a.reset_at,
            Decision::Denied(d) => d.reset_at,
        }
    }

    /// Policy ceiling for the window.
    pub fn limit(&self) -> u32 {
        match self {
            Decision::Allowed(a) => a.limit,
            Decision::Denied(d) => d.limit,
        }
    }

    /// The denial message, present only when denied.
    pub fn message(&self) -> Option<&str> {
        match self {
            Decision::Allowed(_) => None,
            Decision::Denied(d) => Some(&d.message),
        }
    }

    /// Split into the allowed half and the denied half.
    pub fn into_result(self) -> Result<Allowance, Denial> {
        match self {
            Decision::Allowed(a) => Ok(a),
            Decision::Denied(d) => Err(d),
        }
    }
}
