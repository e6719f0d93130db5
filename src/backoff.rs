//! How long to wait before retrying a rate-limited request.
//!
//! The server's `retry_after` is authoritative and is only capped. When the server gives none,
//! the wait is exponential in the retry number (`base * 2^(retry - 1)`, capped) with full
//! jitter, so concurrent callers that were limited together do not retry together.
//!
//! ```rust
//! use std::time::Duration;
//! use restlane::backoff::RetryBackoff;
//!
//! let backoff = RetryBackoff::new(Duration::from_millis(500), Duration::from_secs(30)).unwrap();
//! assert_eq!(backoff.ceiling(1), Duration::from_millis(500));
//! assert_eq!(backoff.ceiling(3), Duration::from_secs(2));
//! assert_eq!(backoff.ceiling(20), Duration::from_secs(30)); // capped
//! assert_eq!(backoff.wait(Some(Duration::from_secs(90)), 1), Duration::from_secs(30));
//! ```

use crate::error::BuildError;
use rand::{rng, Rng};
use std::time::Duration;

/// Capped exponential backoff with full jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBackoff {
    base: Duration,
    max: Duration,
}

impl RetryBackoff {
    /// Fails when `max < base`.
    pub fn new(base: Duration, max: Duration) -> Result<Self, BuildError> {
        if max < base {
            return Err(BuildError::BackoffBounds { base, max });
        }
        Ok(Self { base, max })
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Upper bound of the jittered wait before retry number `retry` (1-based).
    pub fn ceiling(&self, retry: usize) -> Duration {
        let exponent = retry.saturating_sub(1).min(u32::MAX as usize) as u32;
        let multiplier = 2u128.saturating_pow(exponent);
        let nanos = self.base.as_nanos().saturating_mul(multiplier);
        let capped = nanos.min(self.max.as_nanos()).min(u64::MAX as u128);
        Duration::from_nanos(capped as u64)
    }

    /// Wait before retry number `retry`: the server's value capped at `max`, or a jittered
    /// exponential wait when the server gave none.
    pub fn wait(&self, server: Option<Duration>, retry: usize) -> Duration {
        self.wait_with_rng(server, retry, &mut rng())
    }

    pub fn wait_with_rng<R: Rng>(&self, server: Option<Duration>, retry: usize, rng: &mut R) -> Duration {
        match server {
            Some(wait) => wait.min(self.max),
            None => full_jitter(self.ceiling(retry), rng),
        }
    }
}

fn full_jitter<R: Rng>(ceiling: Duration, rng: &mut R) -> Duration {
    let millis: u64 = ceiling.as_millis().try_into().unwrap_or(u64::MAX);
    if millis == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.random_range(0..=millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn backoff() -> RetryBackoff {
        RetryBackoff::new(Duration::from_millis(100), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn rejects_inverted_bounds() {
        let err = RetryBackoff::new(Duration::from_secs(2), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, BuildError::BackoffBounds { .. }));
    }

    #[test]
    fn ceiling_doubles_then_caps() {
        let backoff = backoff();
        assert_eq!(backoff.ceiling(1), Duration::from_millis(100));
        assert_eq!(backoff.ceiling(2), Duration::from_millis(200));
        assert_eq!(backoff.ceiling(5), Duration::from_millis(1600));
        assert_eq!(backoff.ceiling(6), Duration::from_secs(2));
        assert_eq!(backoff.ceiling(usize::MAX), Duration::from_secs(2));
    }

    #[test]
    fn server_value_is_capped_not_jittered() {
        let backoff = backoff();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            backoff.wait_with_rng(Some(Duration::from_millis(500)), 1, &mut rng),
            Duration::from_millis(500)
        );
        assert_eq!(
            backoff.wait_with_rng(Some(Duration::from_secs(60)), 1, &mut rng),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn jitter_stays_under_ceiling() {
        let backoff = backoff();
        let mut rng = StdRng::seed_from_u64(42);
        for retry in 1..10 {
            let wait = backoff.wait_with_rng(None, retry, &mut rng);
            assert!(wait <= backoff.ceiling(retry), "retry {retry}: {wait:?}");
        }
    }

    #[test]
    fn zero_base_never_waits() {
        let backoff = RetryBackoff::new(Duration::ZERO, Duration::ZERO).unwrap();
        assert_eq!(backoff.wait(None, 3), Duration::ZERO);
    }
}
