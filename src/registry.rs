//! Named policy registry.
//!
//! The registry only ever holds validated [`RateLimitPolicy`] values, so a lookup
//! can never hand out a policy that would silently misbehave.

use std::collections::HashMap;
use std::sync::Arc;

use crate::policy::{BuiltinPolicy, RateLimitPolicy};
use tracing::warn;

/// Returned when a policy name is not registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit policy '{name}' not found")]
pub struct UnknownPolicy {
    /// Name that could not be located.
    pub name: String,
}

/// Read-only mapping from policy name to policy.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<String, Arc<RateLimitPolicy>>,
}

impl PolicyRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `auth`, `api`, `read`, `write` and `sensitive`.
    pub fn builtin() -> Self {
        BuiltinPolicy::ALL
            .into_iter()
            .fold(Self::new(), |reg, b| reg.with_policy(b.name(), b.policy()))
    }

    /// Add a policy under `name`, replacing any existing one.
    ///
    /// Last registration wins; a replacement is logged.
    pub fn with_policy(mut self, name: impl Into<String>, policy: RateLimitPolicy) -> Self {
        let name = name.into();
        if self.policies.contains_key(&name) {
            warn!(target: "ratewindow::registry", name = %name, "rate limit policy replaced; last registration wins");
        }
        self.policies.insert(name, Arc::new(policy));
        self
    }

    /// Look up a policy by name.
    pub fn get(&self, name: &str) -> Option<&Arc<RateLimitPolicy>> {
        self.policies.get(name)
    }

    /// Look up a policy by name, erroring if missing.
    pub fn require(&self, name: &str) -> Result<&Arc<RateLimitPolicy>, UnknownPolicy> {
        self.get(name).ok_or_else(|| UnknownPolicy { name: name.to_string() })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Iterate `(name, policy)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<RateLimitPolicy>)> {
        self.policies.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> MakeWriter<'a> for SharedWriter {
        type Writer = SharedGuard;
        fn make_writer(&'a self) -> Self::Writer {
            SharedGuard(self.0.clone())
        }
    }

    struct SharedGuard(Arc<Mutex<Vec<u8>>>);
    impl std::io::Write for SharedGuard {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn builtin_registry_has_all_five() {
        let reg = PolicyRegistry::builtin();
        assert_eq!(reg.names(), vec!["api", "auth", "read", "sensitive", "write"]);
        assert_eq!(reg.get("auth").unwrap().max_requests(), 5);
        assert_eq!(reg.get("sensitive").unwrap().window_ms(), 60 * 60 * 1000);
    }

    #[test]
    fn require_reports_missing_name() {
        let reg = PolicyRegistry::new();
        assert!(reg.is_empty());
        let err = reg.require("ghost").unwrap_err();
        assert_eq!(err, UnknownPolicy { name: "ghost".into() });
        assert_eq!(err.to_string(), "rate limit policy 'ghost' not found");
    }

    #[test]
    fn replacing_a_policy_warns_and_last_wins() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::fmt()
            .with_writer(BoxMakeWriter::new(SharedWriter(buffer.clone())))
            .with_target(true)
            .without_time()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let custom = RateLimitPolicy::new(Duration::from_secs(1), 2, "custom").unwrap();
        let reg = PolicyRegistry::builtin().with_policy("api", custom.clone());

        assert_eq!(reg.len(), 5);
        assert_eq!(**reg.get("api").unwrap(), custom);

        let logs = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("rate limit policy replaced"), "warning should be emitted: {logs}");
    }
}
