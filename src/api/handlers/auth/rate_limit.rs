//! Rate limiting primitives for the OTP login flow.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub enum RateLimitAction {
    Login,
    VerifyOtp,
}

impl RateLimitAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::VerifyOtp => "verify-otp",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_email(&self, _email: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

struct WindowSlot {
    started: Instant,
    count: u32,
}

/// Process-local fixed-window limiter.
///
/// Best effort only: counters are per instance and reset on restart, which is
/// acceptable for an internal admin panel.
pub struct FixedWindowRateLimiter {
    window: Duration,
    max_hits: u32,
    slots: Mutex<HashMap<String, WindowSlot>>,
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new(window: Duration, max_hits: u32) -> Self {
        Self {
            window,
            max_hits: max_hits.max(1),
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn check(&self, key: String) -> RateLimitDecision {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Instant::now();
        slots.retain(|_, slot| now.duration_since(slot.started) < self.window);

        let slot = slots.entry(key).or_insert(WindowSlot {
            started: now,
            count: 0,
        });
        slot.count = slot.count.saturating_add(1);

        if slot.count > self.max_hits {
            RateLimitDecision::Limited
        } else {
            RateLimitDecision::Allowed
        }
    }
}

impl Default for FixedWindowRateLimiter {
    /// 10 attempts per minute per key.
    fn default() -> Self {
        Self::new(Duration::from_secs(60), 10)
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        // Requests without a resolvable client IP are not keyed.
        match ip {
            Some(ip) => self.check(format!("{}:ip:{ip}", action.as_str())),
            None => RateLimitDecision::Allowed,
        }
    }

    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision {
        self.check(format!("{}:email:{email}", action.as_str()))
    }
}
