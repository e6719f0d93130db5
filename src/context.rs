//! Cancellation and deadlines for a single call.
//!
//! Every suspension point of a request (pre-send delay, bucket admission, the exchange itself,
//! rate-limit backoff) is raced against the call's [`RequestContext`].

use crate::error::CancelReason;
use crate::sleeper::Sleeper;
use futures::future::pending;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Owner side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal { rx: self.tx.subscribe() }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a cancellation signal; cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires. Never resolves if the handle is dropped uncancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let fired = rx.wait_for(|cancelled| *cancelled).await.is_ok();
        if !fired {
            pending::<()>().await;
        }
    }
}

/// Cancellation signal plus optional deadline for one call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: Option<CancelSignal>,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(cancel: Option<CancelSignal>, deadline: Option<Instant>) -> Self {
        Self { cancel, deadline }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Reason the context is already done, without waiting.
    pub fn fired(&self) -> Option<CancelReason> {
        if self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled) {
            return Some(CancelReason::Signal);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(CancelReason::Deadline),
            _ => None,
        }
    }

    /// Resolves when the signal fires or the deadline passes.
    pub async fn done(&self) -> CancelReason {
        let signal = async {
            match &self.cancel {
                Some(signal) => signal.cancelled().await,
                None => pending::<()>().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = signal => CancelReason::Signal,
            _ = deadline => CancelReason::Deadline,
        }
    }

    /// Drive `future` unless the context finishes first.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, CancelReason> {
        if let Some(reason) = self.fired() {
            return Err(reason);
        }
        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            output = future => Ok(output),
        }
    }

    /// Cancellable wait through `sleeper`.
    pub async fn sleep(&self, sleeper: &dyn Sleeper, duration: Duration) -> Result<(), CancelReason> {
        if duration.is_zero() {
            return self.fired().map_or(Ok(()), Err);
        }
        self.run(sleeper.sleep(duration)).await
    }

    /// Fail fast when the deadline would pass before `until`.
    pub fn ensure_reachable(&self, until: Instant) -> Result<(), CancelReason> {
        match self.deadline {
            Some(deadline) if deadline < until => Err(CancelReason::DeadlineTooSoon),
            _ => Ok(()),
        }
    }
}
