//! Application-level service object tying the store, the policies and the reaper together.
//!
//! Construct one [`RateLimiter`] at startup, call [`RateLimiter::start`] inside
//! the runtime, and [`RateLimiter::shutdown`] before exit.
//!
//! ```rust
//! use ratewindow::{RateLimiter, PolicyRegistry};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mut limiter = RateLimiter::new(PolicyRegistry::builtin());
//! limiter.start().unwrap();
//!
//! let decision = limiter.check_named("user-42", "auth").unwrap();
//! assert!(decision.is_allowed());
//! assert_eq!(decision.remaining(), 4);
//!
//! limiter.shutdown().await;
//! # });
//! ```

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::decision::Decision;
use crate::headers::RateLimitHeaders;
use crate::middleware::{RateLimitLayer, RateLimitMiddleware};
use crate::policy::RateLimitPolicy;
use crate::reaper::{Reaper, ReaperError, DEFAULT_REAPER_INTERVAL};
use crate::registry::{PolicyRegistry, UnknownPolicy};
use crate::store::RateLimitStore;

/// Owned rate-limiting service: one store, a swappable registry, one reaper.
#[derive(Debug)]
pub struct RateLimiter {
    store: Arc<RateLimitStore>,
    policies: ArcSwap<PolicyRegistry>,
    reaper: Reaper,
}

/// Builder for [`RateLimiter`].
#[derive(Debug)]
pub struct RateLimiterBuilder {
    policies: PolicyRegistry,
    clock: Arc<dyn Clock>,
    reaper_interval: Duration,
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self {
            policies: PolicyRegistry::builtin(),
            clock: Arc::new(SystemClock),
            reaper_interval: DEFAULT_REAPER_INTERVAL,
        }
    }
}

impl RateLimiterBuilder {
    /// Registry to serve named lookups from. Defaults to the builtins.
    pub fn policies(mut self, policies: PolicyRegistry) -> Self {
        self.policies = policies;
        self
    }

    /// Override the clock (useful for deterministic tests).
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Reaper sweep period. Defaults to five minutes.
    pub fn reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    /// Validate and build. The reaper is not started.
    pub fn build(self) -> Result<RateLimiter, ReaperError> {
        let store = Arc::new(RateLimitStore::with_shared_clock(self.clock));
        let reaper = Reaper::new(store.clone(), self.reaper_interval)?;
        Ok(RateLimiter { store, policies: ArcSwap::from_pointee(self.policies), reaper })
    }
}

impl RateLimiter {
    /// Limiter over `policies` with the system clock and the default reaper period.
    pub fn new(policies: PolicyRegistry) -> Self {
        let store = Arc::new(RateLimitStore::new());
        let reaper = Reaper::with_default_interval(store.clone());
        Self { store, policies: ArcSwap::from_pointee(policies), reaper }
    }

    /// Construct a new builder with defaults.
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::default()
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<RateLimitStore> {
        &self.store
    }

    /// Snapshot of the current registry.
    pub fn policies(&self) -> Arc<PolicyRegistry> {
        self.policies.load_full()
    }

    /// Look up a named policy in the current registry.
    pub fn policy(&self, name: &str) -> Option<Arc<RateLimitPolicy>> {
        self.policies.load().get(name).cloned()
    }

    /// Swap in a new registry for subsequent named lookups.
    ///
    /// Middleware already built keeps the policy it was created with, and
    /// existing counters are untouched.
    pub fn replace_policies(&self, policies: PolicyRegistry) {
        info!(target: "ratewindow::registry", policies = policies.len(), "policy registry replaced");
        self.policies.store(Arc::new(policies));
    }

    /// One admission check for `identifier` under `policy`.
    pub fn check(&self, identifier: &str, policy: &RateLimitPolicy) -> Decision {
        self.store.check(identifier, policy)
    }

    /// One admission check under a registered policy.
    pub fn check_named(&self, identifier: &str, name: &str) -> Result<Decision, UnknownPolicy> {
        let policies = self.policies.load();
        let policy = policies.require(name)?;
        Ok(self.store.check(identifier, policy))
    }

    /// Current headers for `identifier`, without consuming a slot.
    pub fn headers(&self, identifier: &str, policy: &RateLimitPolicy) -> RateLimitHeaders {
        RateLimitHeaders::query(&self.store, identifier, policy)
    }

    /// Bind a policy and an identifier strategy to this limiter's store.
    pub fn middleware<X>(
        &self,
        extractor: X,
        policy: impl Into<Arc<RateLimitPolicy>>,
    ) -> RateLimitMiddleware<X> {
        RateLimitMiddleware::new(self.store.clone(), extractor, policy)
    }

    /// Like [`middleware`](Self::middleware), resolving the policy by name.
    pub fn named_middleware<X>(
        &self,
        extractor: X,
        name: &str,
    ) -> Result<RateLimitMiddleware<X>, UnknownPolicy> {
        let policy = self.policies.load().require(name)?.clone();
        Ok(self.middleware(extractor, policy))
    }

    /// Tower layer enforcing `policy` keyed by `extractor`.
    pub fn layer<X>(&self, extractor: X, policy: impl Into<Arc<RateLimitPolicy>>) -> RateLimitLayer<X> {
        RateLimitLayer::new(self.middleware(extractor, policy))
    }

    /// The background reaper.
    pub fn reaper(&self) -> &Reaper {
        &self.reaper
    }

    /// Start the background reaper on the current runtime.
    pub fn start(&mut self) -> Result<(), ReaperError> {
        self.reaper.start()
    }

    /// Stop the background reaper and wait for it.
    pub async fn shutdown(&mut self) {
        self.reaper.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn named_check_uses_registry() {
        let limiter = RateLimiter::new(PolicyRegistry::builtin());
        for expected in (0..5).rev() {
            assert_eq!(limiter.check_named("u1", "auth").unwrap().remaining(), expected);
        }
        assert!(!limiter.check_named("u1", "auth").unwrap().is_allowed());
        assert_eq!(
            limiter.check_named("u1", "nope").unwrap_err(),
            UnknownPolicy { name: "nope".into() }
        );
    }

    #[test]
    fn replacing_policies_keeps_counters() {
        let limiter = RateLimiter::new(PolicyRegistry::builtin());
        limiter.check_named("u1", "api").unwrap();

        let tight = RateLimitPolicy::new(Duration::from_secs(60), 1, "tight").unwrap();
        limiter.replace_policies(PolicyRegistry::new().with_policy("api", tight));

        let d = limiter.check_named("u1", "api").unwrap();
        assert_eq!(d.message(), Some("tight"));
        assert!(limiter.policy("auth").is_none());
    }

    #[test]
    fn builder_rejects_zero_interval() {
        let err = RateLimiter::builder().reaper_interval(Duration::ZERO).build().unwrap_err();
        assert_eq!(err, ReaperError::InvalidInterval);
    }

    #[test]
    fn builder_injects_clock() {
        let clock = ManualClock::new(10_000);
        let limiter = RateLimiter::builder().clock(clock.clone()).build().unwrap();
        let policy = RateLimitPolicy::new(Duration::from_secs(1), 1, "x").unwrap();
        assert_eq!(limiter.check("u1", &policy).reset_at(), 11_000);
        clock.advance(Duration::from_secs(1));
        assert!(limiter.check("u1", &policy).is_allowed());
    }

    #[test]
    fn named_middleware_resolves_policy() {
        let limiter = RateLimiter::new(PolicyRegistry::builtin());
        let mw = limiter
            .named_middleware(|ctx: &String| ctx.clone(), "write")
            .unwrap();
        assert_eq!(mw.policy().max_requests(), 30);
        assert!(limiter.named_middleware(|ctx: &String| ctx.clone(), "ghost").is_err());
    }
}
