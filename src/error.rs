//! Error types surfaced by the dispatch pipeline.
//!
//! Taxonomy:
//! - caller input (`MalformedRoute`, `CheckFailed`, `Encode`): never retried.
//! - rate limits: retried inside the driver, escalated to `RateLimitExceeded` once the attempt
//!   budget is spent.
//! - transport failures: surfaced as-is, never retried here.
//! - decode failures on a nominally successful status: surfaced, never retried.
//! - API errors (structured 4xx/5xx bodies): surfaced with code and message.
use http::StatusCode;
use std::fmt;
use std::time::Duration;

/// Why a waiting request gave up before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's cancellation signal fired.
    Signal,
    /// The caller's deadline elapsed.
    Deadline,
    /// The caller's deadline falls before the reset the server mandated, so waiting is pointless.
    DeadlineTooSoon,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Signal => f.write_str("cancellation signal fired"),
            CancelReason::Deadline => f.write_str("deadline elapsed"),
            CancelReason::DeadlineTooSoon => {
                f.write_str("deadline falls before the bucket reset")
            }
        }
    }
}

/// Bucket admission was abandoned before the bucket opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("bucket admission aborted: {0}")]
pub struct AcquireError(pub CancelReason);

impl From<CancelReason> for AcquireError {
    fn from(reason: CancelReason) -> Self {
        Self(reason)
    }
}

/// Errors produced while compiling a route template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// Number of supplied values does not match the template's placeholders.
    #[error("route {path} expects {expected} parameters, got {got}")]
    ParamCount { path: &'static str, expected: usize, got: usize },
    /// A snowflake placeholder received a non-numeric value.
    #[error("parameter {name} must be a numeric id, got {value:?}")]
    InvalidSnowflake { name: String, value: String },
    /// A string placeholder received a value that cannot be a single path segment.
    #[error("parameter {name} is not a valid path segment: {value:?}")]
    InvalidSegment { name: String, value: String },
    /// The template itself has an unterminated or empty placeholder.
    #[error("route template {path} is malformed")]
    Template { path: &'static str },
}

/// Failure reported by the underlying HTTP transport.
#[derive(Debug, thiserror::Error)]
#[error("transport failure: {source}")]
pub struct TransportError {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
    timeout: bool,
}

impl TransportError {
    pub fn new<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self { source: source.into(), timeout: false }
    }

    /// Mark the failure as a transport-level timeout.
    pub fn timed_out<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self { source: source.into(), timeout: true }
    }

    pub fn is_timeout(&self) -> bool {
        self.timeout
    }
}

/// Unified error type returned to callers of the client.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("malformed route: {0}")]
    MalformedRoute(#[from] RouteError),
    #[error("pre-send check failed")]
    CheckFailed,
    #[error("request cancelled: {0}")]
    Cancelled(CancelReason),
    #[error("rate limited after {attempts} attempts (retry after {retry_after:?}, global: {global})")]
    RateLimitExceeded { attempts: usize, retry_after: Duration, global: bool },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to decode {status} response body: {source}")]
    Decode {
        status: StatusCode,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
    /// A token or caller header could not be turned into a header value.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
    /// Structured API error body (`{"code": .., "message": ..}`).
    #[error("api error {code} ({status}): {message}")]
    Api { status: StatusCode, code: u64, message: String },
    /// Non-retryable status whose body is not decoded (401, 502).
    #[error("http {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("client is closed")]
    Closed,
}

impl From<AcquireError> for RestError {
    fn from(err: AcquireError) -> Self {
        Self::Cancelled(err.0)
    }
}

impl From<CancelReason> for RestError {
    fn from(reason: CancelReason) -> Self {
        Self::Cancelled(reason)
    }
}

impl RestError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }

    /// HTTP status of the response that produced this error, if one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Decode { status, .. } | Self::Api { status, .. } | Self::Http { status, .. } => {
                Some(*status)
            }
            Self::RateLimitExceeded { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            _ => None,
        }
    }
}

/// Errors returned by [`Client::close`](crate::Client::close).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CloseError {
    #[error("shutdown timed out after {waited:?} with {in_flight} requests still in flight")]
    TimedOut { waited: Duration, in_flight: usize },
}

/// Errors produced while building a client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("max_backoff ({max:?}) must be >= base_backoff ({base:?})")]
    BackoffBounds { base: Duration, max: Duration },
    #[error("user agent must not be empty")]
    EmptyUserAgent,
    #[error("invalid base url {url:?}: {reason}")]
    BaseUrl { url: String, reason: String },
    #[error("global rate limit must be > 0")]
    ZeroGlobalLimit,
    #[error("{0} is not a valid header value")]
    InvalidHeader(&'static str),
    #[error("no transport configured and the `reqwest` feature is disabled")]
    MissingTransport,
}
