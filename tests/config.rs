#![cfg(feature = "config")]

use ratewindow::config::{ConfigError, LimiterConfig};
use ratewindow::{PolicyError, RateLimiter};
use std::time::Duration;

const DOC: &str = r#"{
    "reaper_interval_ms": 120000,
    "policies": {
        "api": { "window_ms": 1000, "max_requests": 2, "message": "Slow down" },
        "upload": { "window_ms": 60000, "max_requests": 1, "message": "One upload per minute", "status_code": 503 }
    }
}"#;

#[test]
fn config_overrides_and_extends_builtins() {
    let cfg = LimiterConfig::from_json_str(DOC).unwrap();
    assert_eq!(cfg.reaper_interval(), Duration::from_secs(120));

    let limiter = RateLimiter::from_config(&cfg).unwrap();
    assert_eq!(limiter.reaper().interval(), Duration::from_secs(120));

    let names: Vec<String> = limiter.policies().names().into_iter().map(String::from).collect();
    assert_eq!(names, ["api", "auth", "read", "sensitive", "upload", "write"]);

    assert_eq!(limiter.policy("api").unwrap().max_requests(), 2);
    assert_eq!(limiter.policy("auth").unwrap().max_requests(), 5);

    assert!(limiter.check_named("u1", "upload").unwrap().is_allowed());
    let denied = limiter.check_named("u1", "upload").unwrap().into_result().unwrap_err();
    assert_eq!(denied.status_code, 503);
    assert_eq!(denied.to_string(), "One upload per minute");
}

#[test]
fn zero_max_requests_fails_fast() {
    let doc = r#"{"policies": {"bad": {"window_ms": 1000, "max_requests": 0, "message": "m"}}}"#;
    let cfg = LimiterConfig::from_json_str(doc).unwrap();
    let err = RateLimiter::from_config(&cfg).unwrap_err();
    match err {
        ConfigError::Policy { name, source } => {
            assert_eq!(name, "bad");
            assert_eq!(source, PolicyError::InvalidMaxRequests { provided: 0 });
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn non_error_status_fails_fast() {
    let doc = r#"{"policies": {"bad": {"window_ms": 1000, "max_requests": 1, "message": "m", "status_code": 302}}}"#;
    let cfg = LimiterConfig::from_json_str(doc).unwrap();
    assert!(cfg.to_registry().is_err());
}

#[test]
fn malformed_document_is_a_parse_error() {
    let err = LimiterConfig::from_json_str("{ not json").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
    assert!(err.to_string().starts_with("invalid rate limit config"));
}
