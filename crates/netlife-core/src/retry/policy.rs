use std::time::Duration;

/// High-level classification of a network error for retry purposes.
///
/// Callers map `std::io::Error`s into these kinds via
/// [`classify_io_error`](super::classify_io_error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Expected to resolve shortly (fd exhaustion, interrupted accept, ...).
    Transient,
    /// The listener or connection is unusable; the owning loop stops.
    Fatal,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry; surface the error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Capped exponential backoff for consecutive transient failures.
///
/// The first failure waits `min_delay`, each further consecutive failure
/// doubles the previous delay, and no delay ever exceeds `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first consecutive transient failure.
    pub min_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
    /// Treat connection reset / aborted handshake as transient.
    pub reset_is_transient: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(5),
            max_delay: Duration::from_secs(1),
            reset_is_transient: true,
        }
    }
}

impl RetryPolicy {
    /// Compute the delay that follows `previous` for an error of `kind`.
    ///
    /// `previous` is zero when there was no failure since the last success.
    pub fn next_delay(&self, previous: Duration, kind: ErrorKind) -> RetryDecision {
        match kind {
            ErrorKind::Fatal => RetryDecision::NoRetry,
            ErrorKind::Transient => {
                let raw = if previous.is_zero() {
                    self.min_delay
                } else {
                    previous.saturating_mul(2)
                };
                RetryDecision::RetryAfter(raw.min(self.max_delay))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delay(d: RetryDecision) -> Duration {
        match d {
            RetryDecision::RetryAfter(d) => d,
            RetryDecision::NoRetry => panic!("expected retry"),
        }
    }

    #[test]
    fn no_retry_for_fatal() {
        let p = RetryPolicy::default();
        assert_eq!(p.next_delay(Duration::ZERO, ErrorKind::Fatal), RetryDecision::NoRetry);
        assert_eq!(
            p.next_delay(Duration::from_millis(40), ErrorKind::Fatal),
            RetryDecision::NoRetry
        );
    }

    #[test]
    fn first_failure_starts_at_min() {
        let p = RetryPolicy::default();
        assert_eq!(
            delay(p.next_delay(Duration::ZERO, ErrorKind::Transient)),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn doubles_and_is_capped() {
        let p = RetryPolicy::default();
        assert_eq!(
            delay(p.next_delay(Duration::from_millis(5), ErrorKind::Transient)),
            Duration::from_millis(10)
        );
        assert_eq!(
            delay(p.next_delay(Duration::from_millis(640), ErrorKind::Transient)),
            Duration::from_secs(1)
        );
        assert_eq!(
            delay(p.next_delay(Duration::from_secs(1), ErrorKind::Transient)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn min_above_max_is_capped() {
        let p = RetryPolicy {
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(2),
            ..RetryPolicy::default()
        };
        assert_eq!(
            delay(p.next_delay(Duration::ZERO, ErrorKind::Transient)),
            Duration::from_secs(2)
        );
    }
}
