//! The HTTP seam.
//!
//! Everything below the request/response exchange (TLS, pooling, proxies) belongs to the
//! [`Transport`]. The client hands it a fully built [`HttpRequest`] and expects the raw status,
//! headers and body back.

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use url::Url;

/// One outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// One raw response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self { status, headers, body: body.into() }
    }
}

/// Performs a single HTTP exchange. Implementations must not retry.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Release pooled resources. Called by `Client::close` once in-flight calls have drained.
    async fn close(&self) {}
}

#[cfg(feature = "reqwest")]
pub use self::reqwest_transport::ReqwestTransport;

#[cfg(feature = "reqwest")]
mod reqwest_transport {
    use super::*;

    /// [`Transport`] backed by a shared `reqwest::Client`.
    ///
    /// `reqwest` has no explicit shutdown; idle connections are released when the last clone of
    /// the client is dropped, so `close` keeps the default no-op.
    ///
    /// `reqwest` has no explicit shutdown; its idle connections are released when the last
    /// clone of the client is dropped, so `close` keeps the default no-op.
    #[derive(Debug, Clone, Default)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    fn map_error(err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::timed_out(err)
        } else {
            TransportError::new(err)
        }
    }

    #[async_trait]
    impl Transport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let mut builder =
                self.client.request(request.method, request.url).headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }
            let response = builder.send().await.map_err(map_error)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(map_error)?;
            Ok(HttpResponse { status, headers, body })
        }
    }
}
