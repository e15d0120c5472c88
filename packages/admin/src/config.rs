//! Admin plane configuration. Every knob is injectable; the environment is
//! only read in `from_env`.

use std::time::Duration;

/// Configuration for the admin control plane.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Bind address for the server binary
    pub bind_addr: String,
    /// HMAC secret for JWT signing
    pub jwt_secret: String,
    /// Access token lifetime
    pub access_ttl_secs: i64,
    /// Refresh token lifetime
    pub refresh_ttl_secs: i64,
    /// Default page size for list endpoints
    pub default_page_size: u32,
    /// Hard cap on the audit window, in days
    pub max_audit_window_days: i64,
    /// Idempotency replay window
    pub idempotency_ttl_secs: i64,
    /// Per-request deadline
    pub request_timeout: Duration,
    /// Consecutive LLM failures before the circuit opens
    pub breaker_failure_threshold: u32,
    /// How long the circuit stays open before a probe
    pub breaker_reset_secs: i64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3007".to_string(),
            jwt_secret: "dev-secret-change-me".to_string(),
            access_ttl_secs: 900,
            refresh_ttl_secs: 7 * 24 * 3600,
            default_page_size: 25,
            max_audit_window_days: 90,
            idempotency_ttl_secs: 3600,
            request_timeout: Duration::from_secs(30),
            breaker_failure_threshold: 5,
            breaker_reset_secs: 30,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl AdminConfig {
    /// Read overrides from the environment on top of the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(port) = std::env::var("PORT") {
            config.bind_addr = format!("0.0.0.0:{port}");
        }
        if let Ok(secret) = std::env::var("CONCORD_JWT_SECRET") {
            config.jwt_secret = secret;
        }
        if let Some(ttl) = env_parse("CONCORD_ACCESS_TTL_SECS") {
            config.access_ttl_secs = ttl;
        }
        if let Some(ttl) = env_parse("CONCORD_REFRESH_TTL_SECS") {
            config.refresh_ttl_secs = ttl;
        }
        if let Some(size) = env_parse("CONCORD_DEFAULT_PAGE_SIZE") {
            config.default_page_size = size;
        }
        if let Some(days) = env_parse("CONCORD_MAX_AUDIT_WINDOW_DAYS") {
            config.max_audit_window_days = days;
        }
        if let Some(ttl) = env_parse("CONCORD_IDEMPOTENCY_TTL_SECS") {
            config.idempotency_ttl_secs = ttl;
        }
        if let Some(secs) = env_parse::<u64>("CONCORD_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(threshold) = env_parse("CONCORD_BREAKER_FAILURES") {
            config.breaker_failure_threshold = threshold;
        }
        if let Some(secs) = env_parse("CONCORD_BREAKER_RESET_SECS") {
            config.breaker_reset_secs = secs;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AdminConfig::default();
        assert_eq!(config.default_page_size, 25);
        assert_eq!(config.max_audit_window_days, 90);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }
}
