//! Throttling policies: window length, request ceiling and denial metadata.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;

/// Status code applied to denials unless a policy overrides it.
pub const DEFAULT_DENIAL_STATUS: u16 = 429;

const GENERIC_DENIAL: &str = "Too many requests, please try again later";

/// Errors produced when validating a policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// The window must cover at least one millisecond.
    #[error("window length must be at least 1ms (got {0:?})")]
    InvalidWindow(Duration),
    /// At least one request per window must be admissible.
    #[error("max_requests must be > 0 (got {provided})")]
    InvalidMaxRequests {
        /// Value provided by caller.
        provided: u32,
    },
    /// Denials must carry an HTTP error status.
    #[error("denial status code must be in 400..=599 (got {provided})")]
    InvalidStatusCode {
        /// Value provided by caller.
        provided: u16,
    },
}

/// Immutable, validated rate-limit policy.
///
/// Policies are plain data and can be shared freely across threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    window_ms: u64,
    max_requests: u32,
    message: String,
    status_code: u16,
}

impl RateLimitPolicy {
    /// Create a policy admitting `max_requests` per `window`, denying with status 429.
    ///
    /// # Examples
    /// ```
    /// use ratewindow::RateLimitPolicy;
    /// use std::time::Duration;
    /// let policy = RateLimitPolicy::new(Duration::from_secs(60), 3, "slow down").unwrap();
    /// assert_eq!(policy.max_requests(), 3);
    /// assert!(RateLimitPolicy::new(Duration::ZERO, 3, "slow down").is_err());
    /// ```
    pub fn new(
        window: Duration,
        max_requests: u32,
        message: impl Into<String>,
    ) -> Result<Self, PolicyError> {
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        if window_ms == 0 {
            return Err(PolicyError::InvalidWindow(window));
        }
        if max_requests == 0 {
            return Err(PolicyError::InvalidMaxRequests { provided: max_requests });
        }
        Ok(Self {
            window_ms,
            max_requests,
            message: message.into(),
            status_code: DEFAULT_DENIAL_STATUS,
        })
    }

    /// Override the status code attached to denials.
    pub fn with_status_code(mut self, status_code: u16) -> Result<Self, PolicyError> {
        if !(400..=599).contains(&status_code) {
            return Err(PolicyError::InvalidStatusCode { provided: status_code });
        }
        self.status_code = status_code;
        Ok(self)
    }

    /// Length of one counting window.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Length of one counting window in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Requests admitted per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Message surfaced to callers on denial.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Protocol status the outer layer should apply on denial.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    // Presets are built from constants that always pass validation.
    fn preset(window_ms: u64, max_requests: u32, message: &str) -> Self {
        Self {
            window_ms,
            max_requests,
            message: message.to_string(),
            status_code: DEFAULT_DENIAL_STATUS,
        }
    }

    /// Login and other credential endpoints: 5 per 15 minutes.
    pub fn auth() -> Self {
        Self::preset(15 * MINUTE_MS, 5, "Too many login attempts, please try again later")
    }

    /// General API traffic: 100 per minute.
    pub fn api() -> Self {
        Self::preset(MINUTE_MS, 100, GENERIC_DENIAL)
    }

    /// Read-only endpoints: 300 per minute.
    pub fn read() -> Self {
        Self::preset(MINUTE_MS, 300, GENERIC_DENIAL)
    }

    /// Mutating endpoints: 30 per minute.
    pub fn write() -> Self {
        Self::preset(MINUTE_MS, 30, "Too many write requests, please try again later")
    }

    /// Sensitive operations: 10 per hour.
    pub fn sensitive() -> Self {
        Self::preset(HOUR_MS, 10, "Too many sensitive operations, please try again later")
    }
}

/// The predefined policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinPolicy {
    /// See [`RateLimitPolicy::auth`].
    Auth,
    /// See [`RateLimitPolicy::api`].
    Api,
    /// See [`RateLimitPolicy::read`].
    Read,
    /// See [`RateLimitPolicy::write`].
    Write,
    /// See [`RateLimitPolicy::sensitive`].
    Sensitive,
}

impl BuiltinPolicy {
    /// Every builtin, in registry order.
    pub const ALL: [BuiltinPolicy; 5] = [
        BuiltinPolicy::Auth,
        BuiltinPolicy::Api,
        BuiltinPolicy::Read,
        BuiltinPolicy::Write,
        BuiltinPolicy::Sensitive,
    ];

    /// Registry name.
    pub fn name(self) -> &'static str {
        match self {
            BuiltinPolicy::Auth => "auth",
            BuiltinPolicy::Api => "api",
            BuiltinPolicy::Read => "read",
            BuiltinPolicy::Write => "write",
            BuiltinPolicy::Sensitive => "sensitive",
        }
    }

    /// Build the policy.
    pub fn policy(self) -> RateLimitPolicy {
        match self {
            BuiltinPolicy::Auth => RateLimitPolicy::auth(),
            BuiltinPolicy::Api => RateLimitPolicy::api(),
            BuiltinPolicy::Read => RateLimitPolicy::read(),
            BuiltinPolicy::Write => RateLimitPolicy::write(),
            BuiltinPolicy::Sensitive => RateLimitPolicy::sensitive(),
        }
    }
}

impl fmt::Display for BuiltinPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a name matches no builtin policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown builtin policy '{0}'")]
pub struct UnknownBuiltin(pub String);

impl FromStr for BuiltinPolicy {
    type Err = UnknownBuiltin;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuiltinPolicy::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| UnknownBuiltin(s.to_string()))
    }
}
