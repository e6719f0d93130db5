//! Client configuration.
//!
//! `ClientConfig` is plain data and deserializes from any serde format; missing fields take their
//! defaults, so a config file only needs the values it changes.

use crate::backoff::RetryBackoff;
use crate::error::BuildError;
use crate::limiter::DEFAULT_GLOBAL_LIMIT;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://discord.com/api/v10";

pub const DEFAULT_USER_AGENT: &str =
    concat!("DiscordBot (https://github.com/flyingrobots/restlane, ", env!("CARGO_PKG_VERSION"), ")");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Identifying `User-Agent`; caller headers can extend but not replace it.
    pub user_agent: String,
    /// Total attempts per call, counting the first; `0` behaves like `1`.
    pub max_retries: usize,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Account-wide requests per second; `None` disables the local window.
    pub global_rate_limit: Option<u32>,
    /// Default bound for [`Client::close`](crate::Client::close).
    pub shutdown_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_retries: 10,
            base_backoff_ms: 500,
            max_backoff_ms: 30_000,
            global_rate_limit: Some(DEFAULT_GLOBAL_LIMIT),
            shutdown_timeout_ms: None,
        }
    }
}

impl ClientConfig {
    pub fn max_attempts(&self) -> usize {
        self.max_retries.max(1)
    }

    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_ms.map(Duration::from_millis)
    }

    pub fn backoff(&self) -> Result<RetryBackoff, BuildError> {
        RetryBackoff::new(
            Duration::from_millis(self.base_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }

    /// Base URL with a guaranteed trailing-slash-free path.
    pub fn parsed_base_url(&self) -> Result<Url, BuildError> {
        let url = Url::parse(self.base_url.trim_end_matches('/')).map_err(|err| BuildError::BaseUrl {
            url: self.base_url.clone(),
            reason: err.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(BuildError::BaseUrl {
                url: self.base_url.clone(),
                reason: "not a hierarchical url".to_owned(),
            });
        }
        Ok(url)
    }

    /// Check every invariant the client relies on.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.user_agent.trim().is_empty() {
            return Err(BuildError::EmptyUserAgent);
        }
        if self.global_rate_limit == Some(0) {
            return Err(BuildError::ZeroGlobalLimit);
        }
        self.backoff()?;
        self.parsed_base_url()?;
        Ok(())
    }
}
