//! Convenient re-exports for common restlane types.
pub use crate::{
    body::{Body, Multipart},
    client::{Client, ClientBuilder},
    config::ClientConfig,
    context::{CancelHandle, RequestContext},
    error::{CancelReason, RestError, RouteError},
    options::{RequestOpt, RequestOptions},
    route::{BucketKey, CompiledRoute, Method, Route},
    routes,
    telemetry::{LogSink, MemorySink, RestEvent},
    transport::{HttpRequest, HttpResponse, Transport},
};
