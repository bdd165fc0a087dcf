//! Fixed-window counter store.
//!
//! One [`RateLimitEntry`] is kept per identifier. The time axis is cut into
//! non-overlapping windows that start on the first check for an identifier; each
//! window counts admissions independently and is discarded whole once it ends.
//!
//! Known imprecision: a burst of `max_requests` at the tail of one window followed
//! by another `max_requests` at the head of the next is admitted. That is the
//! fixed-window trade-off and is accepted, not corrected.
//!
//! Every operation runs as a single critical section over the entry map, so the
//! read-modify-write of a counter is atomic even on a multi-threaded runtime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clock::{Clock, SystemClock};
use crate::decision::{Allowance, Decision, Denial};
use crate::policy::RateLimitPolicy;
use tracing::debug;

/// Per-identifier window state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests admitted in the current window.
    pub count: u32,
    /// Epoch milliseconds at which the window expires.
    pub window_reset_at: u64,
}

impl RateLimitEntry {
    fn fresh(now: u64, policy: &RateLimitPolicy) -> Self {
        Self { count: 1, window_reset_at: now.saturating_add(policy.window_ms()) }
    }

    /// An entry whose reset instant has been reached behaves as if absent.
    pub fn is_expired(&self, now_millis: u64) -> bool {
        self.window_reset_at <= now_millis
    }
}

type Entries = HashMap<String, RateLimitEntry>;

/// In-memory store of fixed-window counters, keyed by opaque identifier.
///
/// State lives only as long as the process; nothing is shared across processes.
#[derive(Debug)]
pub struct RateLimitStore {
    entries: Mutex<Entries>,
    clock: Arc<dyn Clock>,
}

impl Default for RateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitStore {
    /// Store reading the system wall clock.
    pub fn new() -> Self {
        Self::with_shared_clock(Arc::new(SystemClock))
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        Self::with_shared_clock(Arc::new(clock))
    }

    /// Store reading an already shared clock.
    pub fn with_shared_clock(clock: Arc<dyn Clock>) -> Self {
        Self { entries: Mutex::new(HashMap::new()), clock }
    }

    /// Current time as seen by this store.
    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    // Counters are plain integers, so a panic elsewhere cannot leave them
    // half-written; recover the guard instead of propagating the poison.
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit or reject one request, counting it if admitted.
    ///
    /// A missing or expired entry starts a fresh window with `count = 1`. A full
    /// window rejects without touching the entry.
    pub fn is_allowed(&self, identifier: &str, policy: &RateLimitPolicy) -> bool {
        let now = self.clock.now_millis();
        admit(&mut self.lock(), identifier, policy, now)
    }

    /// Requests still permitted in the identifier's window.
    ///
    /// Reads `max_requests` for an identifier with no live window.
    pub fn remaining(&self, identifier: &str, policy: &RateLimitPolicy) -> u32 {
        let now = self.clock.now_millis();
        remaining_in(&self.lock(), identifier, policy, now)
    }

    /// Epoch milliseconds at which the identifier's window ends, or would end if
    /// one started now.
    pub fn reset_time(&self, identifier: &str, policy: &RateLimitPolicy) -> u64 {
        let now = self.clock.now_millis();
        reset_in(&self.lock(), identifier, policy, now)
    }

    /// `(remaining, reset_time)` read under one lock and one clock reading.
    ///
    /// Read-only; both values always describe the same window.
    pub fn snapshot(&self, identifier: &str, policy: &RateLimitPolicy) -> (u32, u64) {
        let now = self.clock.now_millis();
        let entries = self.lock();
        (
            remaining_in(&entries, identifier, policy, now),
            reset_in(&entries, identifier, policy, now),
        )
    }

    /// Run one admission check and assemble the decision.
    ///
    /// Equivalent to `is_allowed`, `remaining` and `reset_time` in that order, but
    /// evaluated under one lock and one clock reading so concurrent checks cannot
    /// interleave between the three.
    pub fn check(&self, identifier: &str, policy: &RateLimitPolicy) -> Decision {
        let now = self.clock.now_millis();
        let (allowed, remaining, reset_at) = {
            let mut entries = self.lock();
            let allowed = admit(&mut entries, identifier, policy, now);
            (
                allowed,
                remaining_in(&entries, identifier, policy, now),
                reset_in(&entries, identifier, policy, now),
            )
        };

        if allowed {
            debug!(target: "ratewindow::store", identifier, remaining, "request admitted");
            Decision::Allowed(Allowance { limit: policy.max_requests(), remaining, reset_at })
        } else {
            debug!(target: "ratewindow::store", identifier, reset_at, "request denied");
            Decision::Denied(Denial {
                limit: policy.max_requests(),
                message: policy.message().to_string(),
                status_code: policy.status_code(),
                reset_at,
            })
        }
    }

    /// Remove every expired entry, returning how many were removed.
    ///
    /// Live entries are left untouched; admission results do not depend on this.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        debug!(target: "ratewindow::store", removed, live = entries.len(), "expired entries swept");
        removed
    }

    /// Snapshot of the raw entry, expired or not.
    pub fn entry(&self, identifier: &str) -> Option<RateLimitEntry> {
        self.lock().get(identifier).copied()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

fn admit(entries: &mut Entries, identifier: &str, policy: &RateLimitPolicy, now: u64) -> bool {
    if let Some(entry) = entries.get_mut(identifier) {
        if !entry.is_expired(now) {
            if entry.count >= policy.max_requests() {
                return false;
            }
            entry.count = entry.count.saturating_add(1);
            return true;
        }
        *entry = RateLimitEntry::fresh(now, policy);
        return true;
    }
    entries.insert(identifier.to_string(), RateLimitEntry::fresh(now, policy));
    true
}

fn live<'a>(entries: &'a Entries, identifier: &str, now: u64) -> Option<&'a RateLimitEntry> {
    entries.get(identifier).filter(|entry| !entry.is_expired(now))
}

fn remaining_in(entries: &Entries, identifier: &str, policy: &RateLimitPolicy, now: u64) -> u32 {
    match live(entries, identifier, now) {
        Some(entry) => policy.max_requests().saturating_sub(entry.count),
        None => policy.max_requests(),
    }
}

fn reset_in(entries: &Entries, identifier: &str, policy: &RateLimitPolicy, now: u64) -> u64 {
    match live(entries, identifier, now) {
        Some(entry) => entry.window_reset_at,
        None => now.saturating_add(policy.window_ms()),
    }
}
