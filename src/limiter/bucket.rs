use crate::headers::Present;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

/// One bucket: an exclusive admission gate plus the counters learned from responses.
#[derive(Debug)]
pub(crate) struct Bucket {
    pub(crate) gate: Arc<AsyncMutex<()>>,
    state: Mutex<BucketState>,
}

impl Bucket {
    pub(crate) fn new() -> Self {
        Self { gate: Arc::new(AsyncMutex::new(())), state: Mutex::new(BucketState::new()) }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BucketState {
    limit: u64,
    remaining: u64,
    reset_at: Option<Instant>,
    hash: Option<String>,
    last_used: Instant,
}

impl BucketState {
    fn new() -> Self {
        Self { limit: 0, remaining: 0, reset_at: None, hash: None, last_used: Instant::now() }
    }

    /// When the bucket is exhausted and its reset is still ahead, the instant to wait for.
    pub(crate) fn blocked_until(&self, now: Instant) -> Option<Instant> {
        if self.remaining > 0 {
            return None;
        }
        self.reset_at.filter(|reset| *reset > now)
    }

    /// Refill an exhausted bucket whose reset has been waited out.
    pub(crate) fn replenish(&mut self) {
        if self.remaining == 0 && self.reset_at.is_some() {
            self.remaining = self.limit;
            self.reset_at = None;
        }
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_used = now;
    }

    pub(crate) fn apply(&mut self, present: &Present, reset_in: Option<Duration>, now: Instant) {
        self.limit = present.limit;
        self.remaining = present.remaining;
        self.reset_at = reset_in.map(|after| now + after);
        if present.bucket.is_some() {
            self.hash = present.bucket.clone();
        }
        self.last_used = now;
    }

    /// Exhaust the bucket until `now + wait`, used when a bucket-scoped 429 arrives.
    pub(crate) fn exhaust_for(&mut self, wait: Duration, now: Instant) {
        self.remaining = 0;
        let until = now + wait;
        self.reset_at = Some(self.reset_at.map_or(until, |reset| reset.max(until)));
    }

    pub(crate) fn is_idle(&self, now: Instant, grace: Duration) -> bool {
        let settled = self.reset_at.map_or(self.last_used, |reset| reset.max(self.last_used));
        now >= settled + grace
    }

    pub(crate) fn snapshot(&self, now: Instant) -> BucketSnapshot {
        BucketSnapshot {
            limit: self.limit,
            remaining: self.remaining,
            reset_after: self.reset_at.map(|reset| reset.saturating_duration_since(now)),
            hash: self.hash.clone(),
        }
    }
}

/// Point-in-time view of a bucket's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub limit: u64,
    pub remaining: u64,
    /// Time until reset, if a reset is scheduled.
    pub reset_after: Option<Duration>,
    /// Server-side bucket hash, once one has been seen.
    pub hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn present(limit: u64, remaining: u64) -> Present {
        Present {
            bucket: Some("hash".into()),
            global: false,
            limit,
            remaining,
            reset: None,
            reset_after: Some(Duration::from_secs(2)),
            scope: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_bucket_blocks_until_reset() {
        let now = Instant::now();
        let mut state = BucketState::new();
        state.apply(&present(5, 0), Some(Duration::from_secs(2)), now);
        assert_eq!(state.blocked_until(now), Some(now + Duration::from_secs(2)));
        assert_eq!(state.blocked_until(now + Duration::from_secs(3)), None);

        state.replenish();
        assert_eq!(state.snapshot(now).remaining, 5);
        assert_eq!(state.blocked_until(now), None);
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_bucket_never_blocks() {
        let now = Instant::now();
        let mut state = BucketState::new();
        state.apply(&present(5, 3), Some(Duration::from_secs(2)), now);
        assert_eq!(state.blocked_until(now), None);
        let snapshot = state.snapshot(now);
        assert_eq!(snapshot.hash.as_deref(), Some("hash"));
        assert_eq!(snapshot.reset_after, Some(Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_bucket_is_probed() {
        let state = BucketState::new();
        assert_eq!(state.blocked_until(Instant::now()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaust_keeps_later_reset() {
        let now = Instant::now();
        let mut state = BucketState::new();
        state.apply(&present(5, 1), Some(Duration::from_secs(10)), now);
        state.exhaust_for(Duration::from_secs(1), now);
        assert_eq!(state.blocked_until(now), Some(now + Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_after_reset_and_grace() {
        let now = Instant::now();
        let mut state = BucketState::new();
        state.apply(&present(5, 0), Some(Duration::from_secs(2)), now);
        assert!(!state.is_idle(now + Duration::from_secs(3), Duration::from_secs(5)));
        assert!(state.is_idle(now + Duration::from_secs(7), Duration::from_secs(5)));
    }
}
