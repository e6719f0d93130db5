//! Bucket-locking rate limiter.
//!
//! One [`Bucket`] per [`BucketKey`], created lazily, plus a single global limiter. Admission to a
//! bucket is exclusive: the caller holding an [`Admission`] is the only one allowed to send on
//! that bucket until it reports the response headers through [`Admission::update`] or gives the
//! admission up. Buckets with different keys never wait on each other.
//!
//! ```rust
//! use restlane::limiter::BucketLimiter;
//! use restlane::{BucketKey, RequestContext};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let limiter = BucketLimiter::new();
//! let key = BucketKey::new("/channels/10/messages:POST");
//! let admission = limiter.acquire(&key, &RequestContext::default()).await.unwrap();
//! // ... send the request, then report its headers (or nothing) ...
//! admission.update(None);
//! # }
//! ```

mod bucket;
mod global;

pub use bucket::BucketSnapshot;

use crate::clock::{Clock, SystemClock};
use crate::context::RequestContext;
use crate::error::AcquireError;
use crate::headers::{self, Present, RatelimitHeaders};
use crate::route::BucketKey;
use crate::sleeper::{Sleeper, TokioSleeper};
use bucket::Bucket;
use global::GlobalLimiter;
use http::HeaderMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;

/// Default account-wide request ceiling per second.
pub const DEFAULT_GLOBAL_LIMIT: u32 = 50;

struct Inner {
    buckets: Mutex<HashMap<BucketKey, Arc<Bucket>>>,
    global: GlobalLimiter,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
    /// Server clock minus local clock, in milliseconds.
    skew_ms: AtomicI64,
    skew_known: AtomicBool,
}

/// Shared handle to the limiter state; clones observe the same buckets.
#[derive(Clone)]
pub struct BucketLimiter {
    inner: Arc<Inner>,
}

impl fmt::Debug for BucketLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketLimiter")
            .field("buckets", &self.bucket_count())
            .field("global_limit", &self.inner.global.per_second())
            .field("globally_locked", &self.is_globally_locked())
            .finish()
    }
}

impl Default for BucketLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`BucketLimiter`].
#[derive(Debug, Clone)]
pub struct BucketLimiterBuilder {
    global_limit: Option<u32>,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
}

impl Default for BucketLimiterBuilder {
    fn default() -> Self {
        Self {
            global_limit: Some(DEFAULT_GLOBAL_LIMIT),
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(SystemClock),
        }
    }
}

impl BucketLimiterBuilder {
    /// Requests per second allowed across all buckets; `None` disables the window (global 429
    /// locks still apply).
    pub fn global_limit(mut self, per_second: Option<u32>) -> Self {
        self.global_limit = per_second;
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

    pub fn build(self) -> BucketLimiter {
        BucketLimiter {
            inner: Arc::new(Inner {
                buckets: Mutex::new(HashMap::new()),
                global: GlobalLimiter::new(self.global_limit.filter(|limit| *limit > 0)),
                sleeper: self.sleeper,
                clock: self.clock,
                skew_ms: AtomicI64::new(0),
                skew_known: AtomicBool::new(false),
            }),
        }
    }
}

impl BucketLimiter {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> BucketLimiterBuilder {
        BucketLimiterBuilder::default()
    }

    pub(crate) fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.inner.sleeper
    }

    fn buckets(&self) -> MutexGuard<'_, HashMap<BucketKey, Arc<Bucket>>> {
        self.inner.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bucket_for(&self, key: &BucketKey) -> Arc<Bucket> {
        let mut buckets = self.buckets();
        Arc::clone(buckets.entry(key.clone()).or_insert_with(|| Arc::new(Bucket::new())))
    }

    /// Wait until `key` may send: take the bucket's exclusive gate, wait out an exhausted
    /// bucket's reset, then take a slot from the global limiter.
    ///
    /// Every wait is raced against `ctx`. If the context's deadline falls before a reset the
    /// server mandated, this fails at once with
    /// [`CancelReason::DeadlineTooSoon`](crate::CancelReason::DeadlineTooSoon).
    pub async fn acquire(
        &self,
        key: &BucketKey,
        ctx: &RequestContext,
    ) -> Result<Admission, AcquireError> {
        let bucket = self.bucket_for(key);
        let guard = ctx.run(Arc::clone(&bucket.gate).lock_owned()).await?;

        let blocked = bucket.state().blocked_until(Instant::now());
        if let Some(until) = blocked {
            ctx.ensure_reachable(until)?;
            let wait = until.saturating_duration_since(Instant::now());
            tracing::debug!(bucket = %key, wait = ?wait, "bucket exhausted, waiting for reset");
            ctx.sleep(self.inner.sleeper.as_ref(), wait).await?;
            bucket.state().replenish();
        }

        self.inner.global.acquire(ctx, self.inner.sleeper.as_ref()).await?;
        bucket.state().touch(Instant::now());

        Ok(Admission {
            key: key.clone(),
            bucket,
            limiter: self.clone(),
            guard: Some(guard),
        })
    }

    /// Exhaust `key` for `wait`, as after a bucket-scoped 429 without usable headers.
    pub fn exhaust(&self, key: &BucketKey, wait: Duration) {
        let bucket = self.bucket_for(key);
        bucket.state().exhaust_for(wait, Instant::now());
    }

    /// Pause every bucket for `wait`.
    pub fn lock_global(&self, wait: Duration) {
        tracing::warn!(wait = ?wait, "global rate limit engaged");
        self.inner.global.lock_for(wait);
    }

    pub fn is_globally_locked(&self) -> bool {
        self.inner.global.is_locked()
    }

    pub fn bucket(&self, key: &BucketKey) -> Option<BucketSnapshot> {
        let bucket = self.buckets().get(key).cloned()?;
        let snapshot = bucket.state().snapshot(Instant::now());
        Some(snapshot)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets().len()
    }

    /// Evict buckets nobody holds or waits on whose reset (or last use) is more than `grace` in
    /// the past. Returns how many were removed.
    pub fn sweep_idle(&self, grace: Duration) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets();
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            Arc::strong_count(bucket) > 1
                || Arc::strong_count(&bucket.gate) > 1
                || !bucket.state().is_idle(now, grace)
        });
        let removed = before - buckets.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = buckets.len(), "swept idle buckets");
        }
        removed
    }

    /// Last measured server-minus-local clock offset, once a `Date` header has been seen.
    pub fn clock_skew(&self) -> Option<Duration> {
        if !self.inner.skew_known.load(Ordering::Acquire) {
            return None;
        }
        let skew = self.inner.skew_ms.load(Ordering::Acquire);
        Some(Duration::from_millis(skew.unsigned_abs()))
    }

    fn record_skew(&self, headers: &HeaderMap) {
        if let Some(server) = headers::server_date_millis(headers) {
            let skew = server - self.inner.clock.now_millis();
            self.inner.skew_ms.store(skew, Ordering::Release);
            self.inner.skew_known.store(true, Ordering::Release);
        }
    }

    /// How long until the bucket described by `present` resets.
    fn reset_in(&self, present: &Present) -> Option<Duration> {
        if let Some(after) = present.reset_after {
            return Some(after);
        }
        let reset = present.reset?;
        if !reset.is_finite() {
            return None;
        }
        let reset_ms = (reset * 1000.0) as i64;
        let server_now = self.inner.clock.now_millis() + self.inner.skew_ms.load(Ordering::Acquire);
        let ahead = reset_ms.saturating_sub(server_now).max(0);
        Some(Duration::from_millis(ahead.unsigned_abs()))
    }
}

/// Exclusive right to send one request on a bucket.
///
/// Consume it with [`update`](Admission::update) once the response headers (or the lack of
/// them) are known. [`release`](Admission::release) and dropping both give the bucket up
/// without touching its counters.
#[must_use = "dropping an admission releases the bucket immediately"]
pub struct Admission {
    key: BucketKey,
    bucket: Arc<Bucket>,
    limiter: BucketLimiter,
    guard: Option<OwnedMutexGuard<()>>,
}

impl fmt::Debug for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admission").field("key", &self.key).finish_non_exhaustive()
    }
}

impl Admission {
    pub fn key(&self) -> &BucketKey {
        &self.key
    }

    /// Learn from a response's headers and release the bucket.
    ///
    /// Returns the bucket's counters after the update, or `None` when the headers were absent or
    /// unusable and the counters were left alone.
    pub fn update(mut self, headers: Option<&HeaderMap>) -> Option<BucketSnapshot> {
        let snapshot = headers.and_then(|headers| self.apply(headers));
        self.guard.take();
        snapshot
    }

    /// Give the bucket up without reporting anything.
    pub fn release(mut self) {
        self.guard.take();
    }

    fn apply(&self, headers: &HeaderMap) -> Option<BucketSnapshot> {
        let limiter = &self.limiter;
        limiter.record_skew(headers);

        let parsed = match RatelimitHeaders::from_map(headers) {
            Ok(parsed) => parsed,
            Err(source) => {
                tracing::debug!(bucket = %self.key, error = %source, "ignoring rate limit headers");
                return None;
            }
        };

        match parsed {
            RatelimitHeaders::None => None,
            RatelimitHeaders::GlobalLimited { reset_after } => {
                if let Some(wait) = reset_after {
                    limiter.lock_global(wait);
                }
                None
            }
            RatelimitHeaders::Present(present) => {
                let reset_in = limiter.reset_in(&present);
                let now = Instant::now();
                let snapshot = {
                    let mut state = self.bucket.state();
                    state.apply(&present, reset_in, now);
                    state.snapshot(now)
                };
                if present.global && present.remaining == 0 {
                    if let Some(wait) = reset_in {
                        limiter.lock_global(wait);
                    }
                }
                tracing::debug!(
                    bucket = %self.key,
                    limit = snapshot.limit,
                    remaining = snapshot.remaining,
                    reset_after = ?snapshot.reset_after,
                    "bucket updated"
                );
                Some(snapshot)
            }
        }
    }
}
