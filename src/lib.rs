#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # ratewindow
//!
//! In-process request admission control with fixed-window counters.
//!
//! ## Features
//!
//! - **Fixed-window store** keyed by opaque identifiers (user id, IP, composite key)
//! - **Named policies**: `auth`, `api`, `read`, `write`, `sensitive`, plus your own
//! - **`X-RateLimit-*` headers** computed without consuming a request slot
//! - **Middleware** with pluggable identifier strategies, and a tower layer
//! - **Managed reaper** that sweeps expired entries and can be stopped cleanly
//!
//! State is per process. Running several instances yields independent counters.
//!
//! ## Quick Start
//!
//! ```rust
//! use ratewindow::{RateLimitPolicy, RateLimitStore, RateLimitHeaders};
//! use std::time::Duration;
//!
//! let store = RateLimitStore::new();
//! let policy = RateLimitPolicy::new(Duration::from_secs(60), 3, "Too many requests").unwrap();
//!
//! for expected in [2, 1, 0] {
//!     let decision = store.check("u1", &policy);
//!     assert!(decision.is_allowed());
//!     assert_eq!(decision.remaining(), expected);
//! }
//! let denied = store.check("u1", &policy);
//! assert_eq!(denied.message(), Some("Too many requests"));
//!
//! let headers = RateLimitHeaders::query(&store, "u1", &policy).to_map();
//! assert_eq!(headers["X-RateLimit-Limit"], "3");
//! ```

pub mod clock;
#[cfg(feature = "config")]
pub mod config;
pub mod decision;
pub mod error;
pub mod headers;
pub mod limiter;
pub mod middleware;
pub mod policy;
pub mod prelude;
pub mod reaper;
pub mod registry;
pub mod store;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{Allowance, Decision, Denial};
pub use error::RateLimitError;
pub use headers::{RateLimitHeaders, HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET};
pub use limiter::{RateLimiter, RateLimiterBuilder};
pub use middleware::{Composite, IdentifierExtractor, RateLimitLayer, RateLimitMiddleware, RateLimitService};
pub use policy::{BuiltinPolicy, PolicyError, RateLimitPolicy, DEFAULT_DENIAL_STATUS};
pub use reaper::{Reaper, ReaperError, DEFAULT_REAPER_INTERVAL};
pub use registry::{PolicyRegistry, UnknownPolicy};
pub use store::{RateLimitEntry, RateLimitStore};

#[cfg(doctest)]
#[doc = include_str!("../README.md")]
pub struct ReadmeDoctests;
