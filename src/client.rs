//! The client and its retry driver.
//!
//! A call moves through `admitted -> sent -> classified` and then either finishes or goes round
//! again. The loop is bounded by [`ClientConfig::max_attempts`]. Every wait a 429 asks for is
//! handed to the limiter (a bucket exhaust or a global lock) so the next admission, and every
//! other caller on the same bucket, honors it.

use crate::backoff::RetryBackoff;
use crate::body::Body;
use crate::classify::{classify, decode, Classified};
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::context::RequestContext;
use crate::error::{BuildError, CloseError, RestError};
use crate::executor::{EncodedBody, Executor, Token};
use crate::limiter::BucketLimiter;
use crate::options::RequestOptions;
use crate::route::CompiledRoute;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::telemetry::{RequestOutcome, RestEvent, Telemetry, TelemetrySink};
use crate::transport::Transport;
use bytes::Bytes;
use http::StatusCode;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Builder for [`Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    token: Option<Token>,
    transport: Option<Arc<dyn Transport>>,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
    telemetry: Telemetry,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("token", &self.token)
            .field("transport", &self.transport)
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            config: ClientConfig::default(),
            token: None,
            transport: None,
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(SystemClock),
            telemetry: Telemetry::default(),
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Bot token attached to every authorized route.
    pub fn bot_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(Token::Bot(token.into()));
        self
    }

    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn telemetry<S>(mut self, sink: S) -> Self
    where
        S: TelemetrySink,
        S::Future: Send + 'static,
    {
        self.telemetry = Telemetry::new(sink);
        self
    }

    pub fn build(self) -> Result<Client, BuildError> {
        self.config.validate()?;
        let backoff = self.config.backoff()?;
        let base_url = self.config.parsed_base_url()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };

        if let Some(token) = &self.token {
            token.header_value().map_err(|_| BuildError::InvalidHeader("bot token"))?;
        }
        let executor =
            Executor::new(base_url, &self.config.user_agent, self.token.as_ref(), transport)
                .map_err(|_| BuildError::InvalidHeader("user agent"))?;

        let limiter = BucketLimiter::builder()
            .global_limit(self.config.global_rate_limit)
            .sleeper(self.sleeper)
            .clock(self.clock)
            .build();

        Ok(Client {
            inner: Arc::new(ClientInner {
                config: self.config,
                limiter,
                executor,
                backoff,
                telemetry: self.telemetry,
                in_flight: InFlight::default(),
            }),
        })
    }
}

#[cfg(feature = "reqwest")]
fn default_transport() -> Result<Arc<dyn Transport>, BuildError> {
    Ok(Arc::new(crate::transport::ReqwestTransport::new()))
}

#[cfg(not(feature = "reqwest"))]
fn default_transport() -> Result<Arc<dyn Transport>, BuildError> {
    Err(BuildError::MissingTransport)
}

/// Counts calls in progress and lets `close` wait for them.
#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    closed: AtomicBool,
    idle: Notify,
}

struct InFlightGuard<'a>(&'a InFlight);

impl InFlight {
    fn enter(&self) -> Option<InFlightGuard<'_>> {
        self.count.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            self.leave();
            return None;
        }
        Some(InFlightGuard(self))
    }

    fn leave(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn drained(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.leave();
    }
}

struct ClientInner {
    config: ClientConfig,
    limiter: BucketLimiter,
    executor: Executor,
    backoff: RetryBackoff,
    telemetry: Telemetry,
    in_flight: InFlight,
}

/// Rate-governed REST client. Cheap to clone; clones share buckets and shutdown state.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.config.base_url)
            .field("limiter", &self.inner.limiter)
            .field("in_flight", &self.in_flight())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Client with default configuration and the default transport.
    pub fn new(bot_token: impl Into<String>) -> Result<Self, BuildError> {
        Self::builder().bot_token(bot_token).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn limiter(&self) -> &BucketLimiter {
        &self.inner.limiter
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.count.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.in_flight.closed.load(Ordering::SeqCst)
    }

    /// Send `route` and decode a JSON response into `T`. Returns `Ok(None)` when the response
    /// had no body.
    pub async fn request<T: DeserializeOwned>(
        &self,
        route: &CompiledRoute,
        body: Option<Body>,
        options: RequestOptions,
    ) -> Result<Option<T>, RestError> {
        self.dispatch(route, body, options, |status, raw| decode(status, raw.as_ref())).await
    }

    /// Send `route` and return the raw response body, if any.
    pub async fn execute(
        &self,
        route: &CompiledRoute,
        body: Option<Body>,
        options: RequestOptions,
    ) -> Result<Option<Bytes>, RestError> {
        self.dispatch(route, body, options, |_, raw| Ok(raw)).await
    }

    /// Send `route`, ignoring any response body.
    pub async fn request_empty(
        &self,
        route: &CompiledRoute,
        body: Option<Body>,
        options: RequestOptions,
    ) -> Result<(), RestError> {
        self.dispatch(route, body, options, |_, _| Ok(())).await
    }

    /// Stop accepting calls, wait for the ones in progress, then close the transport.
    ///
    /// `timeout` falls back to `shutdown_timeout_ms`; with neither, waits indefinitely. On
    /// timeout the transport is left open for the calls still running.
    pub async fn close(&self, timeout: Option<Duration>) -> Result<(), CloseError> {
        let in_flight = &self.inner.in_flight;
        in_flight.closed.store(true, Ordering::SeqCst);
        let limit = timeout.or_else(|| self.inner.config.shutdown_timeout());
        tracing::info!(in_flight = self.in_flight(), timeout = ?limit, "closing rest client");

        let started = Instant::now();
        match limit {
            Some(limit) => {
                if tokio::time::timeout(limit, in_flight.drained()).await.is_err() {
                    let pending = self.in_flight();
                    tracing::warn!(in_flight = pending, "rest client shutdown timed out");
                    return Err(CloseError::TimedOut { waited: started.elapsed(), in_flight: pending });
                }
            }
            None => in_flight.drained().await,
        }
        self.inner.executor.close_transport().await;
        tracing::info!(waited = ?started.elapsed(), "rest client closed");
        Ok(())
    }

    /// Runs the call and `finish` on its response, then reports the combined outcome.
    async fn dispatch<R>(
        &self,
        route: &CompiledRoute,
        body: Option<Body>,
        options: RequestOptions,
        finish: impl FnOnce(StatusCode, Option<Bytes>) -> Result<R, RestError>,
    ) -> Result<R, RestError> {
        let _guard = self.inner.in_flight.enter().ok_or(RestError::Closed)?;
        let started = Instant::now();
        let body = body.as_ref().map(EncodedBody::new).transpose()?;
        let ctx = options.context(started);

        let mut attempts = 0;
        let result = self
            .drive(route, body.as_ref(), &options, &ctx, &mut attempts)
            .await
            .and_then(|(status, raw)| finish(status, raw).map(|value| (status, value)));

        let outcome = match &result {
            Ok((status, _)) => RequestOutcome::Success { status: *status },
            Err(RestError::Cancelled(_)) => RequestOutcome::Cancelled,
            Err(err) => RequestOutcome::Failure { status: err.status() },
        };
        self.inner
            .telemetry
            .emit(RestEvent::Completed {
                bucket: route.bucket_key().clone(),
                attempts,
                outcome,
                duration: started.elapsed(),
            })
            .await;
        result.map(|(_, value)| value)
    }

    async fn drive(
        &self,
        route: &CompiledRoute,
        body: Option<&EncodedBody>,
        options: &RequestOptions,
        ctx: &RequestContext,
        attempts: &mut usize,
    ) -> Result<(StatusCode, Option<Bytes>), RestError> {
        let inner = &self.inner;
        let key = route.bucket_key();
        let max_attempts = inner.config.max_attempts();

        if let Some(delay) = options.delay() {
            ctx.sleep(inner.limiter.sleeper().as_ref(), delay).await?;
        }

        loop {
            *attempts += 1;
            let attempt = *attempts;

            let waiting = Instant::now();
            let admission = inner.limiter.acquire(key, ctx).await?;
            inner
                .telemetry
                .emit(RestEvent::Admitted { bucket: key.clone(), attempt, waited: waiting.elapsed() })
                .await;

            if !options.checks_pass() {
                admission.release();
                return Err(RestError::CheckFailed);
            }

            let request = inner.executor.build(route, body, options)?;
            let response = match ctx.run(inner.executor.send(request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    admission.update(None);
                    return Err(err.into());
                }
                Err(reason) => {
                    admission.release();
                    return Err(reason.into());
                }
            };

            if let Some(snapshot) = admission.update(Some(&response.headers)) {
                inner
                    .telemetry
                    .emit(RestEvent::BucketUpdated { bucket: key.clone(), snapshot })
                    .await;
            }

            let (retry_after, global) = match classify(&response) {
                Classified::Success(raw) => return Ok((response.status, raw)),
                Classified::Failed(err) => return Err(err),
                Classified::RateLimited { retry_after, global } => (retry_after, global),
            };

            tracing::warn!(bucket = %key, attempt, retry_after = ?retry_after, global, "rate limited");
            inner
                .telemetry
                .emit(RestEvent::RateLimited { bucket: key.clone(), attempt, retry_after, global })
                .await;

            let wait = inner.backoff.wait(retry_after, attempt);
            if global {
                inner.limiter.lock_global(wait);
            } else {
                inner.limiter.exhaust(key, wait);
            }

            if attempt >= max_attempts {
                return Err(RestError::RateLimitExceeded { attempts: attempt, retry_after: wait, global });
            }
            inner
                .telemetry
                .emit(RestEvent::Retrying { bucket: key.clone(), attempt: attempt + 1, delay: wait })
                .await;
        }
    }
}
