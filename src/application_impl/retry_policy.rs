use super::ConfigError;
use crate::application_port::FailureKind;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { after: Duration },
    Rotate,
    GiveUp,
}

/// Decides what happens after a failed renewal. Bounded exponential backoff
/// for transient failures; once `max_attempts` consecutive failures are
/// reached (or the failure is permanent) the credential is rotated when it
/// can be, otherwise given up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    ) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if base_delay.is_zero() || base_delay > max_delay {
            return Err(ConfigError::BackoffRange {
                base: base_delay,
                max: max_delay,
            });
        }
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::Multiplier(multiplier));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            max_delay,
            multiplier,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `attempt` is the number of consecutive failures so far, starting at 1.
    pub fn decide(&self, attempt: u32, kind: FailureKind, can_rotate: bool) -> RetryDecision {
        if kind == FailureKind::Transient && attempt < self.max_attempts {
            RetryDecision::Retry {
                after: self.backoff(attempt),
            }
        } else {
            self.exhausted(can_rotate)
        }
    }

    pub fn exhausted(&self, can_rotate: bool) -> RetryDecision {
        if can_rotate {
            RetryDecision::Rotate
        } else {
            RetryDecision::GiveUp
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}
