//! Shared retry backoff policy
//!
//! Audio sources and the streaming output both retry failed I/O. They
//! share one policy shape so that retry behavior is configured in one
//! place: delays start at `base`, multiply on each consecutive failure
//! up to `cap`, and reset to `base` on the first success. Jitter
//! decorrelates retry storms when several components fail at once.

use std::time::Duration;

use rand::Rng;

/// Retry delay policy
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// First delay after a failure
    pub base: Duration,

    /// Growth factor per consecutive failure
    pub multiplier: f64,

    /// Largest delay ever returned (before jitter)
    pub cap: Duration,

    /// Jitter fraction in `[0, 1]`: each delay is scaled by a random
    /// factor in `1 ± jitter`
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            multiplier: 2.0,
            cap: Duration::from_secs(60),
            jitter: 0.1,
        }
    }
}

/// Stateful exponential backoff
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            current: policy.base,
            policy,
        }
    }

    /// Delay to wait after the failure that just happened
    ///
    /// Each call advances the schedule; the returned delay includes
    /// jitter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let grown = self.current.as_secs_f64() * self.policy.multiplier;
        self.current = Duration::from_secs_f64(grown).min(self.policy.cap);

        if self.policy.jitter > 0.0 {
            let factor = rand::thread_rng()
                .gen_range(1.0 - self.policy.jitter..=1.0 + self.policy.jitter);
            Duration::from_secs_f64(delay.as_secs_f64() * factor)
        } else {
            delay
        }
    }

    /// Report a success, resetting the schedule to `base`
    pub fn reset(&mut self) {
        self.current = self.policy.base;
    }

    /// The delay the next failure will receive (without jitter)
    pub fn peek(&self) -> Duration {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(250),
            multiplier: 2.0,
            cap: Duration::from_secs(8),
            jitter: 0.0,
        }
    }

    #[test]
    fn test_doubles_to_cap() {
        let mut bo = Backoff::new(no_jitter());
        assert_eq!(Duration::from_millis(250), bo.next_delay());
        assert_eq!(Duration::from_millis(500), bo.next_delay());
        assert_eq!(Duration::from_millis(1000), bo.next_delay());
        assert_eq!(Duration::from_millis(2000), bo.next_delay());
        assert_eq!(Duration::from_millis(4000), bo.next_delay());
        assert_eq!(Duration::from_millis(8000), bo.next_delay());
        // pinned at the cap
        assert_eq!(Duration::from_millis(8000), bo.next_delay());
        assert_eq!(Duration::from_millis(8000), bo.next_delay());
    }

    #[test]
    fn test_success_resets_to_base() {
        let mut bo = Backoff::new(no_jitter());
        for _ in 0..10 {
            bo.next_delay();
        }
        assert_eq!(Duration::from_secs(8), bo.peek());
        bo.reset();
        assert_eq!(Duration::from_millis(250), bo.next_delay());
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(1),
            multiplier: 2.0,
            cap: Duration::from_secs(60),
            jitter: 0.25,
        };
        let mut bo = Backoff::new(policy);
        let mut nominal = 1.0f64;
        for _ in 0..50 {
            let d = bo.next_delay().as_secs_f64();
            // within 1 +/- jitter of the un-jittered schedule
            assert!(d >= nominal * 0.74 && d <= nominal * 1.26, "delay {}", d);
            nominal = (nominal * 2.0).min(60.0);
        }
    }
}
