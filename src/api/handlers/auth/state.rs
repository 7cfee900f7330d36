//! Auth configuration and shared state.

use std::sync::Arc;
use std::time::Duration;

use super::{presence::PresenceMap, rate_limit::RateLimiter};

const DEFAULT_OTP_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;
const DEFAULT_PRESENCE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    otp_ttl_seconds: i64,
    resend_cooldown_seconds: i64,
    session_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        if seconds > 0 {
            self.otp_ttl_seconds = seconds;
        }
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        if seconds > 0 {
            self.session_ttl_seconds = seconds;
        }
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    pub(super) fn resend_cooldown_seconds(&self) -> i64 {
        self.resend_cooldown_seconds
    }

    pub(super) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(super) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    rate_limiter: Arc<dyn RateLimiter>,
    presence: PresenceMap,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            config,
            rate_limiter,
            presence: PresenceMap::new(DEFAULT_PRESENCE_TTL),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    #[must_use]
    pub fn presence(&self) -> &PresenceMap {
        &self.presence
    }
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::{NoopRateLimiter, RateLimiter};
    use super::{AuthConfig, AuthState};
    use std::sync::Arc;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://panel.mdrecords.dev".to_string());

        assert_eq!(config.frontend_base_url(), "https://panel.mdrecords.dev");
        assert_eq!(config.otp_ttl_seconds(), super::DEFAULT_OTP_TTL_SECONDS);
        assert_eq!(
            config.resend_cooldown_seconds(),
            super::DEFAULT_RESEND_COOLDOWN_SECONDS
        );
        assert_eq!(
            config.session_ttl_seconds(),
            super::DEFAULT_SESSION_TTL_SECONDS
        );
        assert!(config.session_cookie_secure());

        let config = config
            .with_otp_ttl_seconds(120)
            .with_resend_cooldown_seconds(30)
            .with_session_ttl_seconds(3600);

        assert_eq!(config.otp_ttl_seconds(), 120);
        assert_eq!(config.resend_cooldown_seconds(), 30);
        assert_eq!(config.session_ttl_seconds(), 3600);
    }

    #[test]
    fn non_positive_ttls_are_ignored() {
        let config = AuthConfig::new("http://localhost:3000".to_string())
            .with_otp_ttl_seconds(0)
            .with_session_ttl_seconds(-5);
        assert_eq!(config.otp_ttl_seconds(), super::DEFAULT_OTP_TTL_SECONDS);
        assert_eq!(
            config.session_ttl_seconds(),
            super::DEFAULT_SESSION_TTL_SECONDS
        );
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn auth_state_constructs_with_noop_rate_limiter() {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        let state = AuthState::new(config, limiter);
        assert_eq!(state.config().frontend_base_url(), "http://localhost:3000");
    }
}
