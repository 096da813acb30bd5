//! Retry and rate-limit policy shared by every RPC request.

use std::{num::NonZeroU32, time::Duration};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use log::info;

use crate::config::RpcSettings;

/// Exponential backoff: `min(base * 2^attempt, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RpcSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.backoff_base_ms),
            max_delay: Duration::from_millis(settings.backoff_max_ms),
        }
    }

    /// Delay to wait after the failed attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Request budget shared by every call of one client: at most `limit`
/// requests per `window`, refilled evenly over the window (GCRA).
///
/// A limit of 0 disables the budget.
pub struct RequestBudget {
    limit: u32,
    window: Duration,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl RequestBudget {
    pub fn new(limit: u32, window: Duration) -> Self {
        let limiter = NonZeroU32::new(limit).and_then(|burst| {
            Quota::with_period(window / limit)
                .map(|quota| RateLimiter::direct(quota.allow_burst(burst)))
        });

        Self {
            limit,
            window,
            limiter,
        }
    }

    pub fn from_settings(settings: &RpcSettings) -> Self {
        Self::new(
            settings.requests_per_window,
            Duration::from_secs(settings.window_secs),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Take a request slot if one is free right now.
    pub fn try_acquire(&self) -> bool {
        self.limiter
            .as_ref()
            .is_none_or(|limiter| limiter.check().is_ok())
    }

    /// Wait until a request slot is available and take it.
    pub async fn acquire(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        if limiter.check().is_ok() {
            return;
        }

        info!(
            "Request budget of {} per {:?} reached, waiting for a free slot",
            self.limit, self.window
        );
        limiter.until_ready().await;
    }
}
