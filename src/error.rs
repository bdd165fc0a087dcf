//! Error type surfaced by the tower middleware.
use std::fmt;

use crate::decision::Denial;

/// Error returned by [`RateLimitService`](crate::middleware::RateLimitService).
#[derive(Debug, Clone)]
pub enum RateLimitError<E> {
    /// The request exceeded its allowance and never reached the inner service.
    Limited(Denial),
    /// The underlying service failed
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for RateLimitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(denial) => write!(f, "{}", denial.message),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RateLimitError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Limited(_) => None,
            Self::Inner(e) => Some(e),
        }
    }
}

impl<E> From<Denial> for RateLimitError<E> {
    fn from(denial: Denial) -> Self {
        Self::Limited(denial)
    }
}

impl<E> RateLimitError<E> {
    /// Check if this error is a rate-limit denial
    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited(_))
    }
    /// Status code the protocol layer should answer with, for denials.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Limited(d) => Some(d.status_code),
            Self::Inner(_) => None,
        }
    }
    /// Borrow the denial if present.
    pub fn as_denial(&self) -> Option<&Denial> {
        match self {
            Self::Limited(d) => Some(d),
            Self::Inner(_) => None,
        }
    }
    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Limited(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    fn denial() -> Denial {
        Denial { limit: 1, message: "Too many requests".into(), status_code: 429, reset_at: 0 }
    }

    #[test]
    fn limited_displays_denial_message() {
        let err: RateLimitError<io::Error> = denial().into();
        assert_eq!(err.to_string(), "Too many requests");
        assert!(err.is_limited());
        assert_eq!(err.status_code(), Some(429));
        // The denial is the error itself, not a cause.
        assert!(err.source().is_none());
    }

    #[test]
    fn inner_passes_through() {
        let err = RateLimitError::Inner(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(err.to_string(), "boom");
        assert!(!err.is_limited());
        assert!(err.status_code().is_none());
        assert!(err.as_denial().is_none());
        assert_eq!(err.into_inner().unwrap().to_string(), "boom");
    }
}
