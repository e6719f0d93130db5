use crate::limiter::BucketSnapshot;
use crate::route::BucketKey;
use http::StatusCode;
use std::fmt;
use std::time::Duration;

/// Structured events emitted while dispatching a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestEvent {
    /// A bucket admitted attempt number `attempt` (1-indexed) after waiting `waited`.
    Admitted { bucket: BucketKey, attempt: usize, waited: Duration },
    /// A response's headers updated a bucket.
    BucketUpdated { bucket: BucketKey, snapshot: BucketSnapshot },
    /// The server answered 429.
    RateLimited {
        bucket: BucketKey,
        attempt: usize,
        retry_after: Option<Duration>,
        global: bool,
    },
    /// About to wait `delay` and send attempt number `attempt`.
    Retrying { bucket: BucketKey, attempt: usize, delay: Duration },
    /// The call finished.
    Completed {
        bucket: BucketKey,
        attempts: usize,
        outcome: RequestOutcome,
        duration: Duration,
    },
}

/// Final outcome of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success { status: StatusCode },
    /// Failed; `status` is set when a response was received.
    Failure { status: Option<StatusCode> },
    Cancelled,
}

impl RestEvent {
    pub fn bucket(&self) -> &BucketKey {
        match self {
            RestEvent::Admitted { bucket, .. }
            | RestEvent::BucketUpdated { bucket, .. }
            | RestEvent::RateLimited { bucket, .. }
            | RestEvent::Retrying { bucket, .. }
            | RestEvent::Completed { bucket, .. } => bucket,
        }
    }
}

impl fmt::Display for RestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestEvent::Admitted { bucket, attempt, waited } => {
                write!(f, "Admitted({bucket}, attempt=#{attempt}, waited={waited:?})")
            }
            RestEvent::BucketUpdated { bucket, snapshot } => write!(
                f,
                "BucketUpdated({bucket}, remaining={}/{}, reset_after={:?})",
                snapshot.remaining, snapshot.limit, snapshot.reset_after
            ),
            RestEvent::RateLimited { bucket, attempt, retry_after, global } => write!(
                f,
                "RateLimited({bucket}, attempt=#{attempt}, retry_after={retry_after:?}, global={global})"
            ),
            RestEvent::Retrying { bucket, attempt, delay } => {
                write!(f, "Retrying({bucket}, attempt=#{attempt}, delay={delay:?})")
            }
            RestEvent::Completed { bucket, attempts, outcome, duration } => write!(
                f,
                "Completed({bucket}, attempts={attempts}, outcome={outcome}, duration={duration:?})"
            ),
        }
    }
}

impl fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestOutcome::Success { status } => write!(f, "Success({})", status.as_u16()),
            RequestOutcome::Failure { status: Some(status) } => {
                write!(f, "Failure({})", status.as_u16())
            }
            RequestOutcome::Failure { status: None } => f.write_str("Failure"),
            RequestOutcome::Cancelled => f.write_str("Cancelled"),
        }
    }
}
