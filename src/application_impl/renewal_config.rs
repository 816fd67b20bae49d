use crate::domain_model::{Ratio, RatioError};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_attempts must be at least 1")]
    NoAttempts,
    #[error("backoff base delay {base:?} must be non-zero and not above max delay {max:?}")]
    BackoffRange { base: Duration, max: Duration },
    #[error("backoff multiplier must be a finite number >= 1.0, got {0}")]
    Multiplier(f64),
    #[error("request timeout must be non-zero")]
    ZeroTimeout,
    #[error("scheduler needs at least one worker")]
    NoWorkers,
    #[error("invalid renewal threshold: {0}")]
    Threshold(#[from] RatioError),
}

/// Timing knobs shared by lease and session renewal.
#[derive(Debug, Clone, PartialEq)]
pub struct RenewalConfig {
    /// Fraction of the TTL after which renewal fires.
    pub threshold: Ratio,
    /// Upper bound on every backend call made from a renewal task.
    pub request_timeout: Duration,
    /// Revoke leases and the session token when the manager closes.
    pub revoke_on_close: bool,
}

impl RenewalConfig {
    pub fn new(
        threshold: Ratio,
        request_timeout: Duration,
        revoke_on_close: bool,
    ) -> Result<Self, ConfigError> {
        if request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(Self {
            threshold,
            request_timeout,
            revoke_on_close,
        })
    }
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            threshold: Ratio::two_thirds(),
            request_timeout: Duration::from_secs(10),
            revoke_on_close: false,
        }
    }
}
