//! Builds and performs single HTTP exchanges.
//!
//! The executor knows nothing about buckets or retries: it turns a compiled route, an encoded
//! body and the call's options into an [`HttpRequest`], and hands it to the transport.

use crate::body::Body;
use crate::error::{RestError, RouteError, TransportError};
use crate::options::RequestOptions;
use crate::route::CompiledRoute;
use crate::transport::{HttpRequest, HttpResponse, Transport};
use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Credential attached to authorized routes.
#[derive(Clone, PartialEq, Eq)]
pub enum Token {
    Bot(String),
    Bearer(String),
}

impl Token {
    pub fn header_value(&self) -> Result<HeaderValue, RestError> {
        let raw = match self {
            Token::Bot(token) => format!("Bot {token}"),
            Token::Bearer(token) => format!("Bearer {token}"),
        };
        let mut value = HeaderValue::from_str(&raw)?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Bot(_) => f.write_str("Bot(<redacted>)"),
            Token::Bearer(_) => f.write_str("Bearer(<redacted>)"),
        }
    }
}

/// A body encoded once per call and reused across attempts.
#[derive(Debug, Clone)]
pub(crate) struct EncodedBody {
    content_type: HeaderValue,
    bytes: Bytes,
    loggable: bool,
}

impl EncodedBody {
    pub(crate) fn new(body: &Body) -> Result<Self, RestError> {
        Ok(Self {
            content_type: HeaderValue::from_str(&body.content_type())?,
            bytes: body.encode(),
            loggable: !matches!(body, Body::Multipart(_)),
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Executor {
    base_url: Url,
    user_agent: HeaderValue,
    bot_token: Option<HeaderValue>,
    transport: Arc<dyn Transport>,
}

impl Executor {
    pub(crate) fn new(
        base_url: Url,
        user_agent: &str,
        bot_token: Option<&Token>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, RestError> {
        Ok(Self {
            base_url,
            user_agent: HeaderValue::from_str(user_agent)?,
            bot_token: bot_token.map(Token::header_value).transpose()?,
            transport,
        })
    }

    pub(crate) fn build(
        &self,
        route: &CompiledRoute,
        body: Option<&EncodedBody>,
        options: &RequestOptions,
    ) -> Result<HttpRequest, RestError> {
        let url = route
            .url(&self.base_url)
            .map_err(|_| RouteError::Template { path: route.route().path() })?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, self.user_agent.clone());
        if let Some(body) = body {
            headers.insert(CONTENT_TYPE, body.content_type.clone());
        }
        self.merge_caller_headers(&mut headers, options.headers())?;

        if let Some(bearer) = options.bearer() {
            headers.insert(AUTHORIZATION, Token::Bearer(bearer.to_owned()).header_value()?);
        } else if route.route().is_authorized() {
            if let Some(bot) = &self.bot_token {
                headers.insert(AUTHORIZATION, bot.clone());
            }
        }

        if let Some(body) = body {
            if body.loggable {
                tracing::debug!(
                    method = route.method().as_str(),
                    url = %url,
                    body = %String::from_utf8_lossy(&body.bytes),
                    "request"
                );
            } else {
                tracing::debug!(method = route.method().as_str(), url = %url, bytes = body.bytes.len(), "request");
            }
        }

        Ok(HttpRequest {
            method: route.method().to_http(),
            url,
            headers,
            body: body.map(|body| body.bytes.clone()),
        })
    }

    /// Caller headers replace defaults, except `User-Agent`, which is appended to ours.
    fn merge_caller_headers(&self, headers: &mut HeaderMap, caller: &HeaderMap) -> Result<(), RestError> {
        let mut agent = self.user_agent.to_str().unwrap_or_default().to_owned();
        for value in caller.get_all(USER_AGENT) {
            if let Ok(extra) = value.to_str() {
                agent.push(' ');
                agent.push_str(extra);
            }
        }
        for name in caller.keys() {
            if name == USER_AGENT {
                continue;
            }
            headers.remove(name);
            for value in caller.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        headers.insert(USER_AGENT, HeaderValue::from_str(&agent)?);
        Ok(())
    }

    pub(crate) async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.clone();
        let response = self.transport.send(request).await?;
        tracing::debug!(
            url = %url,
            status = response.status.as_u16(),
            body = %String::from_utf8_lossy(&response.body),
            "response"
        );
        Ok(response)
    }

    pub(crate) async fn close_transport(&self) {
        self.transport.close().await;
    }
}
