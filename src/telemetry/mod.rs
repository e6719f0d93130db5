//! Structured telemetry for the dispatch pipeline.
//!
//! The client emits a [`RestEvent`] at each step of a call (admission, bucket update, 429,
//! retry, completion). Sinks are `tower::Service<RestEvent>` values; emission is best-effort and
//! never fails a request.

pub mod events;
pub mod sinks;

pub use events::{RequestOutcome, RestEvent};
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, Telemetry, TelemetrySink};
