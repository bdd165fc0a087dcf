//! Convenient re-exports for common ratewindow types.
pub use crate::{
    decision::{Allowance, Decision, Denial},
    headers::RateLimitHeaders,
    limiter::RateLimiter,
    middleware::{Composite, IdentifierExtractor, RateLimitLayer, RateLimitMiddleware},
    policy::{BuiltinPolicy, RateLimitPolicy},
    registry::PolicyRegistry,
    store::RateLimitStore,
    RateLimitError,
};
