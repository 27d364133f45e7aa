//! Retry policy evaluation (§4.3).

use std::time::Duration;

use rand::Rng;

use crate::domain::errors::ErrorKind;
use crate::domain::models::phase::RetryPolicy;

/// What the scheduler should do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Re-run after `delay`.
    Retry { delay: Duration },
    /// No more attempts; the phase is terminally `Failed`.
    Exhausted,
    /// `Abort` additionally tears down the whole run.
    Abort,
}

/// Samples jitter in `[-1.0, 1.0]` for [`RetryPolicy::backoff_for_attempt`].
/// Split out so tests can supply a deterministic sampler.
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

pub struct RngJitter;

impl JitterSource for RngJitter {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen_range(-1.0..=1.0)
    }
}

/// Evaluates the retry policy for a failure of the given `kind`, assuming
/// `attempts` already includes the attempt that just failed (§4.3).
pub fn decide(policy: &RetryPolicy, kind: ErrorKind, attempts: u32, jitter: &dyn JitterSource) -> RetryDecision {
    match kind {
        ErrorKind::Abort => RetryDecision::Abort,
        ErrorKind::Permanent | ErrorKind::Cancellation => RetryDecision::Exhausted,
        ErrorKind::Transient => {
            if attempts < policy.max_attempts {
                let delay = policy.backoff_for_attempt(attempts, jitter.sample());
                RetryDecision::Retry { delay }
            } else {
                RetryDecision::Exhausted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedJitter(f64);
    impl JitterSource for FixedJitter {
        fn sample(&self) -> f64 {
            self.0
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_secs(60), 0.0)
    }

    #[test]
    fn transient_retries_until_max_attempts() {
        let p = policy();
        let jitter = FixedJitter(0.0);
        assert!(matches!(decide(&p, ErrorKind::Transient, 1, &jitter), RetryDecision::Retry { .. }));
        assert!(matches!(decide(&p, ErrorKind::Transient, 2, &jitter), RetryDecision::Retry { .. }));
        assert_eq!(decide(&p, ErrorKind::Transient, 3, &jitter), RetryDecision::Exhausted);
    }

    #[test]
    fn permanent_never_retries() {
        let p = policy();
        let jitter = FixedJitter(0.0);
        assert_eq!(decide(&p, ErrorKind::Permanent, 1, &jitter), RetryDecision::Exhausted);
    }

    #[test]
    fn abort_tears_down() {
        let p = policy();
        let jitter = FixedJitter(0.0);
        assert_eq!(decide(&p, ErrorKind::Abort, 1, &jitter), RetryDecision::Abort);
    }
}
