use crate::context::RequestContext;
use crate::error::CancelReason;
use crate::sleeper::Sleeper;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(1);

/// Account-wide ceiling: an optional requests-per-second window plus a lock installed by global
/// 429 responses.
#[derive(Debug)]
pub(crate) struct GlobalLimiter {
    per_second: Option<u32>,
    state: Mutex<GlobalState>,
}

#[derive(Debug)]
struct GlobalState {
    window_start: Instant,
    used: u32,
    locked_until: Option<Instant>,
}

enum Gate {
    Open,
    Wait(Instant),
}

impl GlobalLimiter {
    pub(crate) fn new(per_second: Option<u32>) -> Self {
        Self {
            per_second,
            state: Mutex::new(GlobalState {
                window_start: Instant::now(),
                used: 0,
                locked_until: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, GlobalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn per_second(&self) -> Option<u32> {
        self.per_second
    }

    /// Block until the global lock is lifted and the window has a free slot.
    pub(crate) async fn acquire(
        &self,
        ctx: &RequestContext,
        sleeper: &dyn Sleeper,
    ) -> Result<(), CancelReason> {
        loop {
            let until = match self.try_take() {
                Gate::Open => return Ok(()),
                Gate::Wait(until) => until,
            };
            ctx.ensure_reachable(until)?;
            let wait = until.saturating_duration_since(Instant::now());
            tracing::debug!(wait = ?wait, "waiting for global rate limit");
            ctx.sleep(sleeper, wait).await?;
            self.passed(until);
        }
    }

    fn try_take(&self) -> Gate {
        let mut state = self.state();
        let now = Instant::now();

        if let Some(until) = state.locked_until {
            if until > now {
                return Gate::Wait(until);
            }
            state.locked_until = None;
        }

        let Some(limit) = self.per_second else {
            return Gate::Open;
        };
        if now.saturating_duration_since(state.window_start) >= WINDOW {
            state.window_start = now;
            state.used = 0;
        }
        if state.used < limit {
            state.used += 1;
            Gate::Open
        } else {
            Gate::Wait(state.window_start + WINDOW)
        }
    }

    /// The caller has waited until `until`; move state forward even if the sleeper did not
    /// advance the clock.
    fn passed(&self, until: Instant) {
        let mut state = self.state();
        if state.locked_until.is_some_and(|locked| locked <= until) {
            state.locked_until = None;
        }
        if state.window_start + WINDOW <= until {
            state.window_start = until;
            state.used = 0;
        }
    }

    pub(crate) fn lock_for(&self, wait: Duration) {
        let until = Instant::now() + wait;
        let mut state = self.state();
        state.locked_until = Some(state.locked_until.map_or(until, |locked| locked.max(until)));
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.state().locked_until.is_some_and(|until| until > Instant::now())
    }
}
