//! Retry delay policy.
//!
//! Drivers pick a policy; the runner asks it how long to wait before each
//! retry. Attempt numbers are 1-based and reset after a successful cycle.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// RetryPolicy
// ============================================================================

/// Delay schedule between reconnection attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor applied per attempt (1.0 for a fixed delay).
    pub multiplier: f64,
    /// Give up after this many consecutive failures (`None` = never).
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl RetryPolicy {
    /// Exponential backoff: 100ms doubling up to 10s, unlimited attempts.
    #[inline]
    #[must_use]
    pub const fn exponential() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_attempts: None,
        }
    }

    /// Same delay before every attempt, unlimited attempts.
    #[inline]
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            max_attempts: None,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl RetryPolicy {
    /// Sets the delay before the first retry.
    #[inline]
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the delay cap.
    #[inline]
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor.
    #[inline]
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Limits the number of consecutive attempts.
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }
}

// ============================================================================
// Schedule
// ============================================================================

impl RetryPolicy {
    /// Returns the delay before retry number `attempt`, or `None` once the
    /// attempt budget is exhausted.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        if self.max_attempts.is_some_and(|max| attempt > max) {
            return None;
        }

        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }

    /// Validates the policy.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "Retry multiplier must be a finite value >= 1.0, got {}",
                self.multiplier
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err("Retry max delay must not be below the initial delay".to_string());
        }
        if self.max_attempts == Some(0) {
            return Err("Retry max attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_schedule() {
        let policy = RetryPolicy::exponential();
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for(8), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_fixed_schedule() {
        let policy = RetryPolicy::fixed(Duration::from_secs(1));
        for attempt in 1..20 {
            assert_eq!(policy.delay_for(attempt), Some(Duration::from_secs(1)));
        }
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::exponential().with_max_attempts(3);
        assert!(policy.delay_for(3).is_some());
        assert!(policy.delay_for(4).is_none());
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let policy = RetryPolicy::exponential();
        assert_eq!(policy.delay_for(u32::MAX), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::exponential().validate().is_ok());
        assert!(RetryPolicy::exponential().with_multiplier(0.5).validate().is_err());
        assert!(RetryPolicy::exponential().with_multiplier(f64::NAN).validate().is_err());
        assert!(
            RetryPolicy::exponential()
                .with_max_delay(Duration::from_millis(1))
                .validate()
                .is_err()
        );
        assert!(RetryPolicy::exponential().with_max_attempts(0).validate().is_err());
    }
}
