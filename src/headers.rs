//! Parsing of the `x-ratelimit-*` response header family.
//!
//! A response carries either the full bucket description (`limit`, `remaining`, and at least one
//! of `reset` / `reset-after`), only a global-limit marker, or nothing at all (the route is not
//! limited locally). A partial set is an error and the caller should ignore it rather than guess.

use http::header::{HeaderMap, HeaderName, ToStrError, DATE};
use std::num::{ParseFloatError, ParseIntError};
use std::str::ParseBoolError;
use std::time::Duration;

pub const BUCKET: &str = "x-ratelimit-bucket";
pub const GLOBAL: &str = "x-ratelimit-global";
pub const LIMIT: &str = "x-ratelimit-limit";
pub const REMAINING: &str = "x-ratelimit-remaining";
pub const RESET: &str = "x-ratelimit-reset";
pub const RESET_AFTER: &str = "x-ratelimit-reset-after";
pub const SCOPE: &str = "x-ratelimit-scope";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HeaderParseError {
    #[error("header {name:?} is missing")]
    HeaderMissing { name: &'static str },
    #[error("header {name:?} is not valid utf-8: {value:?}")]
    HeaderNotUtf8 {
        name: &'static str,
        #[source]
        source: ToStrError,
        value: Vec<u8>,
    },
    #[error("header {name:?} should be a bool but is {text:?}")]
    ParsingBoolText {
        name: &'static str,
        #[source]
        source: ParseBoolError,
        text: String,
    },
    #[error("header {name:?} should be a float but is {text:?}")]
    ParsingFloatText {
        name: &'static str,
        #[source]
        source: ParseFloatError,
        text: String,
    },
    #[error("header {name:?} should be an integer but is {text:?}")]
    ParsingIntText {
        name: &'static str,
        #[source]
        source: ParseIntError,
        text: String,
    },
}

/// Who a limit applies to, as reported by `x-ratelimit-scope`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    User,
    Global,
    Shared,
}

impl Scope {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "user" => Some(Scope::User),
            "global" => Some(Scope::Global),
            "shared" => Some(Scope::Shared),
            _ => None,
        }
    }
}

/// Full bucket description from one response.
#[derive(Debug, Clone, PartialEq)]
pub struct Present {
    /// Server-side bucket hash shared by routes with the same limit.
    pub bucket: Option<String>,
    pub global: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Absolute reset as fractional seconds since the Unix epoch (server clock).
    pub reset: Option<f64>,
    /// Relative reset; preferred because it is immune to clock skew.
    pub reset_after: Option<Duration>,
    pub scope: Option<Scope>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RatelimitHeaders {
    /// Only the global marker was sent.
    GlobalLimited { reset_after: Option<Duration> },
    /// No rate-limit headers at all.
    None,
    Present(Present),
}

impl RatelimitHeaders {
    pub fn is_global(&self) -> bool {
        match self {
            Self::GlobalLimited { .. } => true,
            Self::None => false,
            Self::Present(present) => present.global || present.scope == Some(Scope::Global),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn from_map(map: &HeaderMap) -> Result<Self, HeaderParseError> {
        let bucket_headers = [BUCKET, LIMIT, REMAINING, RESET, RESET_AFTER];
        if !bucket_headers.iter().any(|name| map.contains_key(*name)) {
            if map.contains_key(GLOBAL) {
                return Ok(Self::GlobalLimited {
                    reset_after: header_float(map, "retry-after")
                        .ok()
                        .map(secs_to_duration),
                });
            }
            return Ok(Self::None);
        }

        let bucket = header_str(map, BUCKET).ok().map(ToOwned::to_owned);
        let global = match header_bool(map, GLOBAL) {
            Ok(global) => global,
            Err(HeaderParseError::HeaderMissing { .. }) => false,
            Err(other) => return Err(other),
        };
        let limit = header_int(map, LIMIT)?;
        let remaining = header_int(map, REMAINING)?;
        let reset = optional(header_float(map, RESET))?;
        let reset_after = optional(header_float(map, RESET_AFTER))?.map(secs_to_duration);
        if reset.is_none() && reset_after.is_none() {
            return Err(HeaderParseError::HeaderMissing { name: RESET_AFTER });
        }
        let scope = header_str(map, SCOPE).ok().and_then(Scope::parse);

        Ok(Self::Present(Present { bucket, global, limit, remaining, reset, reset_after, scope }))
    }
}

/// Milliseconds since the Unix epoch according to the server's `Date` header.
pub fn server_date_millis(map: &HeaderMap) -> Option<i64> {
    let text = map.get(DATE)?.to_str().ok()?;
    chrono::DateTime::parse_from_rfc2822(text).ok().map(|date| date.timestamp_millis())
}

/// `retry-after` response header in seconds, if present and numeric.
pub fn retry_after(map: &HeaderMap) -> Option<Duration> {
    header_float(map, "retry-after").ok().map(secs_to_duration)
}

/// Float seconds as a `Duration`, clamped to `u32::MAX` seconds; non-finite or negative is zero.
pub(crate) fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs.min(u32::MAX as f64))
    } else {
        Duration::ZERO
    }
}

fn optional<T>(result: Result<T, HeaderParseError>) -> Result<Option<T>, HeaderParseError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(HeaderParseError::HeaderMissing { .. }) => Ok(None),
        Err(other) => Err(other),
    }
}

fn header_str<'a>(map: &'a HeaderMap, name: &'static str) -> Result<&'a str, HeaderParseError> {
    let value = map
        .get(HeaderName::from_static(name))
        .ok_or(HeaderParseError::HeaderMissing { name })?;

    value.to_str().map_err(|source| HeaderParseError::HeaderNotUtf8 {
        name,
        source,
        value: value.as_bytes().to_owned(),
    })
}

fn header_bool(map: &HeaderMap, name: &'static str) -> Result<bool, HeaderParseError> {
    let text = header_str(map, name)?;
    text.parse().map_err(|source| HeaderParseError::ParsingBoolText {
        name,
        source,
        text: text.to_owned(),
    })
}

fn header_float(map: &HeaderMap, name: &'static str) -> Result<f64, HeaderParseError> {
    let text = header_str(map, name)?;
    text.parse().map_err(|source| HeaderParseError::ParsingFloatText {
        name,
        source,
        text: text.to_owned(),
    })
}

fn header_int(map: &HeaderMap, name: &'static str) -> Result<u64, HeaderParseError> {
    let text = header_str(map, name)?;
    text.parse().map_err(|source| HeaderParseError::ParsingIntText {
        name,
        source,
        text: text.to_owned(),
    })
}
