//! Per-loop retry state: the delay carried between consecutive failures.

use std::time::Duration;

use super::policy::{ErrorKind, RetryDecision, RetryPolicy};

/// Mutable backoff state scoped to one accept loop or one dial loop.
///
/// Reset on every successful operation so a failure after a success starts
/// again at the policy minimum.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            current: Duration::ZERO,
        }
    }

    /// Record a failure of `kind` and return what the loop should do next.
    pub fn next_delay(&mut self, kind: ErrorKind) -> RetryDecision {
        let decision = self.policy.next_delay(self.current, kind);
        if let RetryDecision::RetryAfter(d) = decision {
            self.current = d;
        }
        decision
    }

    /// Record a success.
    pub fn reset(&mut self) {
        self.current = Duration::ZERO;
    }

    /// Delay applied after the most recent failure (zero after a success).
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(d: RetryDecision) -> u64 {
        match d {
            RetryDecision::RetryAfter(d) => d.as_millis() as u64,
            RetryDecision::NoRetry => panic!("expected retry"),
        }
    }

    #[test]
    fn ten_transient_failures_follow_doubling_sequence() {
        let mut b = Backoff::new(RetryPolicy::default());
        let observed: Vec<u64> = (0..10).map(|_| ms(b.next_delay(ErrorKind::Transient))).collect();
        assert_eq!(observed, vec![5, 10, 20, 40, 80, 160, 320, 640, 1000, 1000]);
    }

    #[test]
    fn delays_are_non_decreasing_and_bounded() {
        let policy = RetryPolicy {
            min_delay: Duration::from_millis(3),
            max_delay: Duration::from_millis(250),
            ..RetryPolicy::default()
        };
        let mut b = Backoff::new(policy);
        let mut last = Duration::ZERO;
        for _ in 0..32 {
            let d = Duration::from_millis(ms(b.next_delay(ErrorKind::Transient)));
            assert!(d >= last);
            assert!(d <= policy.max_delay);
            last = d;
        }
        assert_eq!(last, policy.max_delay);
    }

    #[test]
    fn success_restarts_at_min() {
        let mut b = Backoff::new(RetryPolicy::default());
        for _ in 0..4 {
            b.next_delay(ErrorKind::Transient);
        }
        assert_eq!(b.current(), Duration::from_millis(40));
        b.reset();
        assert_eq!(b.current(), Duration::ZERO);
        assert_eq!(ms(b.next_delay(ErrorKind::Transient)), 5);
    }

    #[test]
    fn fatal_leaves_state_untouched() {
        let mut b = Backoff::new(RetryPolicy::default());
        b.next_delay(ErrorKind::Transient);
        assert_eq!(b.next_delay(ErrorKind::Fatal), RetryDecision::NoRetry);
        assert_eq!(b.current(), Duration::from_millis(5));
    }
}
