//! Per-call request options.
//!
//! Options are plain data folded over [`RequestOptions::default`], either through the `with_*`
//! builder methods or by applying a list of [`RequestOpt`] values:
//!
//! ```rust
//! use std::time::Duration;
//! use restlane::{RequestOpt, RequestOptions};
//!
//! let opts = RequestOptions::from_opts([
//!     RequestOpt::Delay(Duration::from_millis(250)),
//!     RequestOpt::Timeout(Duration::from_secs(5)),
//!     RequestOpt::check(|| true),
//! ]);
//! assert_eq!(opts.delay(), Some(Duration::from_millis(250)));
//! ```

use crate::context::{CancelSignal, RequestContext};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Predicate evaluated after admission; returning `false` aborts the request before sending.
pub type Check = Arc<dyn Fn() -> bool + Send + Sync>;

/// One request option.
#[derive(Clone)]
pub enum RequestOpt {
    Header(HeaderName, HeaderValue),
    Check(Check),
    /// Wait this long before the first admission.
    Delay(Duration),
    Deadline(Instant),
    /// Deadline relative to the start of the call.
    Timeout(Duration),
    Cancel(CancelSignal),
    /// Authorize with this OAuth2 bearer token instead of the client's bot token.
    Bearer(String),
}

impl RequestOpt {
    pub fn check<F>(check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        RequestOpt::Check(Arc::new(check))
    }
}

impl fmt::Debug for RequestOpt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestOpt::Header(name, value) => f.debug_tuple("Header").field(name).field(value).finish(),
            RequestOpt::Check(_) => f.write_str("Check(..)"),
            RequestOpt::Delay(delay) => f.debug_tuple("Delay").field(delay).finish(),
            RequestOpt::Deadline(deadline) => f.debug_tuple("Deadline").field(deadline).finish(),
            RequestOpt::Timeout(timeout) => f.debug_tuple("Timeout").field(timeout).finish(),
            RequestOpt::Cancel(_) => f.write_str("Cancel(..)"),
            RequestOpt::Bearer(_) => f.write_str("Bearer(<redacted>)"),
        }
    }
}

/// Headers, checks, delay, deadline and cancellation for one call.
#[derive(Clone, Default)]
pub struct RequestOptions {
    headers: HeaderMap,
    checks: Vec<Check>,
    delay: Option<Duration>,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
    cancel: Option<CancelSignal>,
    bearer: Option<String>,
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("headers", &self.headers)
            .field("checks", &self.checks.len())
            .field("delay", &self.delay)
            .field("deadline", &self.deadline)
            .field("timeout", &self.timeout)
            .field("cancel", &self.cancel.is_some())
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `opts` over the defaults, later options overriding earlier ones.
    pub fn from_opts<I>(opts: I) -> Self
    where
        I: IntoIterator<Item = RequestOpt>,
    {
        let mut options = Self::default();
        for opt in opts {
            options.apply(opt);
        }
        options
    }

    pub fn apply(&mut self, opt: RequestOpt) {
        match opt {
            RequestOpt::Header(name, value) => {
                self.headers.append(name, value);
            }
            RequestOpt::Check(check) => self.checks.push(check),
            RequestOpt::Delay(delay) => self.delay = Some(delay),
            RequestOpt::Deadline(deadline) => self.deadline = Some(deadline),
            RequestOpt::Timeout(timeout) => self.timeout = Some(timeout),
            RequestOpt::Cancel(signal) => self.cancel = Some(signal),
            RequestOpt::Bearer(token) => self.bearer = Some(token),
        }
    }

    pub fn with(mut self, opt: RequestOpt) -> Self {
        self.apply(opt);
        self
    }

    pub fn with_header(self, name: HeaderName, value: HeaderValue) -> Self {
        self.with(RequestOpt::Header(name, value))
    }

    pub fn with_check<F>(self, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.with(RequestOpt::check(check))
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.with(RequestOpt::Delay(delay))
    }

    pub fn with_deadline(self, deadline: Instant) -> Self {
        self.with(RequestOpt::Deadline(deadline))
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with(RequestOpt::Timeout(timeout))
    }

    pub fn with_cancel(self, signal: CancelSignal) -> Self {
        self.with(RequestOpt::Cancel(signal))
    }

    pub fn with_bearer(self, token: impl Into<String>) -> Self {
        self.with(RequestOpt::Bearer(token.into()))
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    /// `true` when every check passes. Checks run in order and stop at the first failure.
    pub fn checks_pass(&self) -> bool {
        self.checks.iter().all(|check| check())
    }

    /// Cancellation context for a call starting at `started`; the earlier of the absolute
    /// deadline and `started + timeout` wins.
    pub fn context(&self, started: Instant) -> RequestContext {
        let relative = self.timeout.map(|timeout| started + timeout);
        let deadline = match (self.deadline, relative) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        RequestContext::new(self.cancel.clone(), deadline)
    }
}
