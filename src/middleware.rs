//! Middleware: identifier extraction plus escalation of denials into errors.
//!
//! [`RateLimitMiddleware`] is transport-agnostic: it works on any context type for
//! which an [`IdentifierExtractor`] exists. [`RateLimitLayer`] adapts it to a
//! tower [`Service`], where a denial short-circuits the inner service.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower_layer::Layer;
use tower_service::Service;
use tracing::debug;

use crate::decision::{Allowance, Denial};
use crate::error::RateLimitError;
use crate::headers::RateLimitHeaders;
use crate::policy::RateLimitPolicy;
use crate::store::RateLimitStore;

/// Strategy deriving the rate-limit key from a request context.
///
/// Implemented for any `Fn(&C) -> String`, so a closure is usually enough.
pub trait IdentifierExtractor<C: ?Sized>: Send + Sync {
    /// Key the decision for `context` is scoped to.
    fn extract(&self, context: &C) -> String;
}

impl<C: ?Sized, F> IdentifierExtractor<C> for F
where
    F: Fn(&C) -> String + Send + Sync,
{
    fn extract(&self, context: &C) -> String {
        self(context)
    }
}

/// Joins two strategies' keys, e.g. user and endpoint.
#[derive(Debug, Clone)]
pub struct Composite<A, B> {
    first: A,
    second: B,
    separator: &'static str,
}

impl<A, B> Composite<A, B> {
    /// Keys are joined as `first:second`.
    pub fn new(first: A, second: B) -> Self {
        Self { first, second, separator: ":" }
    }

    /// Use a different separator.
    pub fn with_separator(mut self, separator: &'static str) -> Self {
        self.separator = separator;
        self
    }
}

impl<C, A, B> IdentifierExtractor<C> for Composite<A, B>
where
    C: ?Sized,
    A: IdentifierExtractor<C>,
    B: IdentifierExtractor<C>,
{
    fn extract(&self, context: &C) -> String {
        format!("{}{}{}", self.first.extract(context), self.separator, self.second.extract(context))
    }
}

/// A policy bound to a store and an identifier strategy.
#[derive(Debug)]
pub struct RateLimitMiddleware<X> {
    store: Arc<RateLimitStore>,
    policy: Arc<RateLimitPolicy>,
    extractor: X,
}

impl<X> RateLimitMiddleware<X> {
    /// Bind `policy` to `store`, keyed by `extractor`.
    pub fn new(
        store: Arc<RateLimitStore>,
        extractor: X,
        policy: impl Into<Arc<RateLimitPolicy>>,
    ) -> Self {
        Self { store, policy: policy.into(), extractor }
    }

    /// The enforced policy.
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Check one request; a denial comes back as the error.
    ///
    /// The error's `Display` is the policy's denial message and it carries the
    /// policy's status code for the protocol layer to apply. Response headers
    /// should be built from the returned value with [`RateLimitHeaders::from`],
    /// which reflects exactly this admission.
    pub fn check<C: ?Sized>(&self, context: &C) -> Result<Allowance, Denial>
    where
        X: IdentifierExtractor<C>,
    {
        let identifier = self.extractor.extract(context);
        self.store.check(&identifier, &self.policy).into_result()
    }

    /// Current headers for the context's key, without consuming a slot.
    ///
    /// This is a separate read. After an admission, prefer the headers of the
    /// [`Allowance`] returned by [`check`](Self::check).
    pub fn headers<C: ?Sized>(&self, context: &C) -> RateLimitHeaders
    where
        X: IdentifierExtractor<C>,
    {
        let identifier = self.extractor.extract(context);
        RateLimitHeaders::query(&self.store, &identifier, &self.policy)
    }
}

/// A layer that enforces a rate limit in front of a tower service.
#[derive(Debug)]
pub struct RateLimitLayer<X> {
    middleware: Arc<RateLimitMiddleware<X>>,
}

impl<X> Clone for RateLimitLayer<X> {
    fn clone(&self) -> Self {
        Self { middleware: self.middleware.clone() }
    }
}

impl<X> RateLimitLayer<X> {
    /// Create a new rate limit layer.
    pub fn new(middleware: RateLimitMiddleware<X>) -> Self {
        Self { middleware: Arc::new(middleware) }
    }
}

impl<S, X> Layer<S> for RateLimitLayer<X> {
    type Service = RateLimitService<S, X>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService { inner: service, middleware: self.middleware.clone() }
    }
}

/// Middleware service that enforces rate limits.
///
/// The inner response passes through unchanged and the [`Allowance`] is not
/// kept. A binding that emits `X-RateLimit-*` headers on success should call
/// [`RateLimitMiddleware::check`] itself and convert its result.
#[derive(Debug)]
pub struct RateLimitService<S, X> {
    inner: S,
    middleware: Arc<RateLimitMiddleware<X>>,
}

impl<S: Clone, X> Clone for RateLimitService<S, X> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), middleware: self.middleware.clone() }
    }
}

impl<S, X, Req> Service<Req> for RateLimitService<S, X>
where
    S: Service<Req>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    X: IdentifierExtractor<Req>,
{
    type Response = S::Response;
    type Error = RateLimitError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(RateLimitError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        match self.middleware.check(&req) {
            Ok(_) => {
                let fut = self.inner.call(req);
                Box::pin(async move { fut.await.map_err(RateLimitError::Inner) })
            }
            Err(denial) => {
                debug!(
                    target: "ratewindow::middleware",
                    status = denial.status_code,
                    reset_at = denial.reset_at,
                    "request rejected before reaching inner service"
                );
                Box::pin(futures::future::ready(Err(RateLimitError::Limited(denial))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Ctx {
        user: &'static str,
        endpoint: &'static str,
    }

    fn by_user(ctx: &Ctx) -> String {
        ctx.user.to_string()
    }

    fn by_endpoint(ctx: &Ctx) -> String {
        ctx.endpoint.to_string()
    }

    #[test]
    fn composite_joins_keys() {
        let ctx = Ctx { user: "u1", endpoint: "/api/v1" };
        assert_eq!(Composite::new(by_user, by_endpoint).extract(&ctx), "u1:/api/v1");
        assert_eq!(
            Composite::new(by_user, by_endpoint).with_separator("-").extract(&ctx),
            "u1-/api/v1"
        );
    }

    #[test]
    fn check_escalates_denial() {
        let policy = RateLimitPolicy::new(Duration::from_secs(60), 2, "Too many requests").unwrap();
        let mw = RateLimitMiddleware::new(Arc::new(RateLimitStore::new()), by_user, policy);
        let ctx = Ctx { user: "u1", endpoint: "/" };
        assert_eq!(mw.check(&ctx).unwrap().remaining, 1);
        assert_eq!(mw.check(&ctx).unwrap().remaining, 0);
        let err = mw.check(&ctx).unwrap_err();
        assert_eq!(err.to_string(), "Too many requests");
        assert_eq!(err.status_code, 429);
    }

    #[test]
    fn allowance_headers_match_the_admission() {
        let clock = crate::clock::ManualClock::new(1_700_000_000_000);
        let store = Arc::new(RateLimitStore::with_clock(clock.clone()));
        let policy = RateLimitPolicy::new(Duration::from_millis(1_000), 1, "x").unwrap();
        let mw = RateLimitMiddleware::new(store, by_user, policy);
        let ctx = Ctx { user: "u1", endpoint: "/" };

        let allowance = mw.check(&ctx).unwrap();
        // Once the window is gone a fresh query describes a new window,
        // while the allowance still describes the admission that happened.
        clock.advance(Duration::from_millis(1_000));
        assert_eq!(
            RateLimitHeaders::from(&allowance),
            RateLimitHeaders { limit: 1, remaining: 0, reset_secs: 1_700_000_001 }
        );
        assert_eq!(mw.headers(&ctx).remaining, 1);
    }

    #[test]
    fn headers_do_not_consume() {
        let mw = RateLimitMiddleware::new(
            Arc::new(RateLimitStore::new()),
            by_user,
            RateLimitPolicy::api(),
        );
        let ctx = Ctx { user: "u1", endpoint: "/" };
        mw.check(&ctx).unwrap();
        assert_eq!(mw.headers(&ctx).remaining, 99);
        assert_eq!(mw.headers(&ctx).remaining, 99);
    }
}
