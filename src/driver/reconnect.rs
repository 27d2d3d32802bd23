//! Reconnection backoff.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;

use crate::error::{Error, Result};

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Exponential backoff with jitter between reconnection attempts.
///
/// The delay before attempt `n` (zero-based) is
/// `min(initial_delay * multiplier^n, max_delay)`, scaled by a random
/// factor in `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Random spread as a fraction of the delay, in `[0, 1]`.
    pub jitter: f64,
    /// Attempts before giving up; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Creates a policy with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the first and maximum delays.
    #[inline]
    #[must_use]
    pub fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    /// Sets the growth factor.
    #[inline]
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter fraction.
    #[inline]
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Limits the number of attempts.
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Returns `true` if attempt `attempt` (zero-based) is allowed.
    #[inline]
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }

    /// Returns the delay before attempt `attempt`, without jitter.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Returns the delay before attempt `attempt`, with jitter applied.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    /// Returns the jittered delay using the given random source.
    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = rng.gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        base.mul_f64(factor.max(0.0))
    }

    /// Validates the policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a setting is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay.is_zero() {
            return Err(Error::config("Reconnect initial delay must be greater than zero"));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::config(
                "Reconnect max delay must not be below the initial delay",
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::config("Reconnect multiplier must be at least 1.0"));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(Error::config("Reconnect jitter must be between 0.0 and 1.0"));
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

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_base_delay_grows_and_caps() {
        let policy = ReconnectPolicy::new()
            .with_delays(Duration::from_millis(100), Duration::from_secs(1))
            .with_multiplier(2.0);

        assert_eq!(policy.base_delay(0), Duration::from_millis(100));
        assert_eq!(policy.base_delay(1), Duration::from_millis(200));
        assert_eq!(policy.base_delay(3), Duration::from_millis(800));
        assert_eq!(policy.base_delay(4), Duration::from_secs(1));
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = ReconnectPolicy::new()
            .with_delays(Duration::from_secs(1), Duration::from_secs(10))
            .with_jitter(0.5);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let delay = policy.delay_with(0, &mut rng);
            assert!(delay >= Duration::from_millis(500), "{delay:?}");
            assert!(delay <= Duration::from_millis(1500), "{delay:?}");
        }
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let policy = ReconnectPolicy::new().with_jitter(0.0);
        assert_eq!(policy.delay(2), policy.base_delay(2));
    }

    #[test]
    fn test_max_attempts() {
        let policy = ReconnectPolicy::new().with_max_attempts(2);
        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
        assert!(ReconnectPolicy::new().allows(u32::MAX));
    }

    #[test]
    fn test_validate() {
        assert!(ReconnectPolicy::default().validate().is_ok());
        assert!(ReconnectPolicy::new().with_jitter(1.5).validate().is_err());
        assert!(ReconnectPolicy::new().with_multiplier(0.5).validate().is_err());
        assert!(
            ReconnectPolicy::new()
                .with_delays(Duration::from_secs(2), Duration::from_secs(1))
                .validate()
                .is_err()
        );
    }
}
