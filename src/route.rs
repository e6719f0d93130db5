//! Route templates and their compiled form.
//!
//! A [`Route`] is a `const` descriptor: method, a path pattern with `{name}` placeholders, and an
//! optional bucket-key pattern. Compiling it with concrete values yields a [`CompiledRoute`] that
//! carries the request path and the [`BucketKey`] the limiter uses.
//!
//! Placeholder rules:
//! - names equal to `id` or ending in `.id` are snowflakes and must be decimal `u64` values;
//! - every other placeholder must be a single non-empty path segment.
//!
//! Bucket keys ignore minor parameters. Without an explicit pattern the key is the path with
//! [`MAJOR_PARAMETERS`] substituted and every other placeholder left as literal `{name}` text,
//! followed by `:` and the method.
//!
//! ```rust
//! use restlane::route::{Method, Route};
//!
//! const DELETE_MESSAGE: Route =
//!     Route::new(Method::Delete, "/channels/{channel.id}/messages/{message.id}");
//!
//! let first = DELETE_MESSAGE.compile(&[&10u64, &1u64]).unwrap();
//! let second = DELETE_MESSAGE.compile(&[&10u64, &2u64]).unwrap();
//! assert_eq!(first.path(), "/channels/10/messages/1");
//! assert_eq!(first.bucket_key(), second.bucket_key());
//! ```

use crate::error::RouteError;
use std::fmt;
use std::sync::Arc;

/// Path parameters that scope a rate-limit bucket.
pub const MAJOR_PARAMETERS: &[&str] =
    &["channel.id", "guild.id", "webhook.id", "webhook.token", "interaction.token"];

/// HTTP methods used by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    pub fn to_http(self) -> http::Method {
        match self {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Patch => http::Method::PATCH,
            Method::Delete => http::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical rate-limit bucket identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey(Arc<str>);

impl BucketKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BucketKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Immutable endpoint descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    method: Method,
    path: &'static str,
    bucket: Option<&'static str>,
    authorized: bool,
}

impl Route {
    pub const fn new(method: Method, path: &'static str) -> Self {
        Self { method, path, bucket: None, authorized: true }
    }

    /// Use an explicit bucket-key pattern. It may only reference placeholders of the path.
    pub const fn with_bucket(mut self, pattern: &'static str) -> Self {
        self.bucket = Some(pattern);
        self
    }

    /// Route authenticated by a token embedded in the path; the bot token is not attached.
    pub const fn unauthorized(mut self) -> Self {
        self.authorized = false;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &'static str {
        self.path
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    /// Placeholder names in path order.
    pub fn placeholders(&self) -> Result<Vec<&'static str>, RouteError> {
        Ok(parse_pattern(self.path)?
            .into_iter()
            .filter_map(|segment| match segment {
                Segment::Param(name) => Some(name),
                Segment::Literal(_) => None,
            })
            .collect())
    }

    /// Bind the template to values given in placeholder order.
    pub fn compile(&self, params: &[&dyn fmt::Display]) -> Result<CompiledRoute, RouteError> {
        self.compile_with_query(params, &[])
    }

    /// Like [`compile`](Self::compile), appending a form-encoded query string.
    pub fn compile_with_query(
        &self,
        params: &[&dyn fmt::Display],
        query: &[(&str, &dyn fmt::Display)],
    ) -> Result<CompiledRoute, RouteError> {
        let segments = parse_pattern(self.path)?;
        let names: Vec<&'static str> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Param(name) => Some(*name),
                Segment::Literal(_) => None,
            })
            .collect();

        if names.len() != params.len() {
            return Err(RouteError::ParamCount {
                path: self.path,
                expected: names.len(),
                got: params.len(),
            });
        }

        let values: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        for (name, value) in names.iter().zip(&values) {
            validate(name, value)?;
        }
        let lookup = |name: &str| names.iter().position(|n| *n == name).map(|i| values[i].as_str());

        let mut path = String::with_capacity(self.path.len() + 16);
        for segment in &segments {
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Param(name) => path.push_str(lookup(*name).unwrap_or_default()),
            }
        }

        if !query.is_empty() {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (key, value) in query {
                serializer.append_pair(key, &value.to_string());
            }
            path.push('?');
            path.push_str(&serializer.finish());
        }

        let bucket = match self.bucket {
            Some(pattern) => {
                let mut key = String::with_capacity(pattern.len() + 16);
                for segment in parse_pattern(pattern)? {
                    match segment {
                        Segment::Literal(text) => key.push_str(text),
                        Segment::Param(name) => key.push_str(
                            lookup(name).ok_or(RouteError::Template { path: self.path })?,
                        ),
                    }
                }
                key
            }
            None => {
                let mut key = String::with_capacity(self.path.len());
                for segment in &segments {
                    match segment {
                        Segment::Literal(text) => key.push_str(text),
                        Segment::Param(name) if MAJOR_PARAMETERS.contains(name) => {
                            key.push_str(lookup(*name).unwrap_or_default())
                        }
                        Segment::Param(name) => {
                            key.push('{');
                            key.push_str(name);
                            key.push('}');
                        }
                    }
                }
                key
            }
        };

        Ok(CompiledRoute {
            route: *self,
            path,
            bucket: BucketKey::new(format!("{}:{}", bucket, self.method.as_str())),
        })
    }
}

/// A route bound to concrete parameter values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRoute {
    route: Route,
    path: String,
    bucket: BucketKey,
}

impl CompiledRoute {
    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn method(&self) -> Method {
        self.route.method
    }

    /// Request path including the query string, relative to the API base URL.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn bucket_key(&self) -> &BucketKey {
        &self.bucket
    }

    /// Absolute URL against `base` (which may carry a path prefix such as `/api/v10`).
    pub fn url(&self, base: &url::Url) -> Result<url::Url, url::ParseError> {
        let mut joined = base.as_str().trim_end_matches('/').to_owned();
        joined.push_str(&self.path);
        url::Url::parse(&joined)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Literal(&'static str),
    Param(&'static str),
}

fn parse_pattern(pattern: &'static str) -> Result<Vec<Segment>, RouteError> {
    let mut segments = Vec::new();
    let mut rest = pattern;
    while let Some(open) = rest.find('{') {
        if open > 0 {
            segments.push(Segment::Literal(&rest[..open]));
        }
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or(RouteError::Template { path: pattern })?;
        let name = &after[..close];
        if name.is_empty() || name.contains('{') {
            return Err(RouteError::Template { path: pattern });
        }
        segments.push(Segment::Param(name));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    Ok(segments)
}

fn is_snowflake(name: &str) -> bool {
    name == "id" || name.ends_with(".id")
}

fn validate(name: &str, value: &str) -> Result<(), RouteError> {
    if is_snowflake(name) {
        if value.is_empty() || value.parse::<u64>().is_err() {
            return Err(RouteError::InvalidSnowflake { name: name.into(), value: value.into() });
        }
        return Ok(());
    }
    let bad = value.is_empty()
        || value.chars().any(|c| matches!(c, '/' | '?' | '#') || c.is_whitespace());
    if bad {
        return Err(RouteError::InvalidSegment { name: name.into(), value: value.into() });
    }
    Ok(())
}
