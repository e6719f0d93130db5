#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # restlane
//!
//! Rate-governed request dispatch for chat-platform REST APIs.
//!
//! Callers hand the [`Client`] a compiled route, an optional body and per-call options; the
//! client paces the request against the server's per-route buckets and account-wide limit,
//! sends it, learns from the response headers, and retries 429s within a bounded budget.
//!
//! ## Features
//!
//! - **Route compiler**: `const` route templates compiled into a path and a bucket key that
//!   ignores minor parameters
//! - **Bucket limiter**: one exclusive admission per bucket, reset-aware waits, a global
//!   requests-per-second window and global 429 locks
//! - **Retry driver**: explicit bounded loop with capped, jittered backoff
//! - **Cancellation**: every wait honors the call's cancel signal and deadline
//! - **Graceful shutdown**: `close` drains in-flight calls
//! - **Telemetry**: structured events to any `tower::Service` sink
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use restlane::{routes, Client, RequestOptions};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("bot-token")?;
//!     let route = routes::GET_CHANNEL.compile(&[&81384788765712384u64])?;
//!     let channel: Option<Value> = client.request(&route, None, RequestOptions::new()).await?;
//!     println!("{channel:?}");
//!     client.close(None).await?;
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod body;
pub mod classify;
pub mod client;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod headers;
pub mod limiter;
pub mod options;
pub mod prelude;
pub mod route;
pub mod routes;
pub mod sleeper;
pub mod telemetry;
pub mod transport;

// Re-exports
pub use backoff::RetryBackoff;
pub use body::{Body, FilePart, Multipart};
pub use classify::{ApiError, Classified};
pub use client::{Client, ClientBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ClientConfig;
pub use context::{CancelHandle, CancelSignal, RequestContext};
pub use error::{
    AcquireError, BuildError, CancelReason, CloseError, RestError, RouteError, TransportError,
};
pub use executor::Token;
pub use limiter::{Admission, BucketLimiter, BucketSnapshot};
pub use options::{RequestOpt, RequestOptions};
pub use route::{BucketKey, CompiledRoute, Method, Route};
pub use sleeper::{Sleeper, TokioSleeper, TrackingSleeper};
pub use telemetry::{LogSink, MemorySink, NullSink, RestEvent};
#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;
pub use transport::{HttpRequest, HttpResponse, Transport};
