//! Maps a raw response onto the retry driver's next move.
//!
//! | status            | outcome                                                   |
//! |-------------------|-----------------------------------------------------------|
//! | 200, 201, 204     | `Success` with the body, if any                           |
//! | other 2xx         | `Success`                                                 |
//! | 429               | `RateLimited` with the server's wait and scope            |
//! | 401, 502          | `Failed(Http)` with the raw body                          |
//! | other 4xx / 5xx   | `Failed(Api)`, or `Failed(Decode)` if the body is garbage |
//! | anything else     | `Failed(Http)`                                            |

use crate::error::RestError;
use crate::headers;
use crate::transport::HttpResponse;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Structured error body returned by the API for failed requests.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiError {
    pub code: u64,
    pub message: String,
    /// Per-field validation errors, kept opaque.
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
}

/// Body of a 429 response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RateLimitBody {
    #[serde(default)]
    pub message: Option<String>,
    /// Seconds to wait, possibly fractional.
    #[serde(default)]
    pub retry_after: Option<f64>,
    #[serde(default)]
    pub global: bool,
    #[serde(default)]
    pub code: Option<u64>,
}

/// Tagged outcome of one exchange.
#[derive(Debug)]
pub enum Classified {
    /// 2xx; `None` when the body was empty.
    Success(Option<Bytes>),
    RateLimited { retry_after: Option<Duration>, global: bool },
    Failed(RestError),
}

pub fn classify(response: &HttpResponse) -> Classified {
    let status = response.status;
    match status {
        StatusCode::TOO_MANY_REQUESTS => rate_limited(&response.headers, &response.body),
        StatusCode::UNAUTHORIZED | StatusCode::BAD_GATEWAY => Classified::Failed(RestError::Http {
            status,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        }),
        _ if status.is_success() => {
            if response.body.is_empty() {
                Classified::Success(None)
            } else {
                Classified::Success(Some(response.body.clone()))
            }
        }
        _ if status.is_client_error() || status.is_server_error() => {
            match serde_json::from_slice::<ApiError>(&response.body) {
                Ok(api) => {
                    if let Some(errors) = &api.errors {
                        tracing::debug!(%status, code = api.code, %errors, "api error details");
                    }
                    Classified::Failed(RestError::Api { status, code: api.code, message: api.message })
                }
                Err(source) => Classified::Failed(RestError::Decode { status, source }),
            }
        }
        _ => Classified::Failed(RestError::Http {
            status,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        }),
    }
}

fn rate_limited(headers: &HeaderMap, body: &[u8]) -> Classified {
    let parsed: RateLimitBody = serde_json::from_slice(body).unwrap_or_default();
    let retry_after = parsed
        .retry_after
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(headers::secs_to_duration)
        .or_else(|| headers::retry_after(headers));
    let global = parsed.global || header_says_global(headers);
    Classified::RateLimited { retry_after, global }
}

fn header_says_global(headers: &HeaderMap) -> bool {
    let value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_ascii_lowercase);
    value(headers::GLOBAL).as_deref() == Some("true") || value(headers::SCOPE).as_deref() == Some("global")
}

/// Decode a success body into `T`. An absent body yields `None` without decoding.
pub fn decode<T: DeserializeOwned>(
    status: StatusCode,
    body: Option<&Bytes>,
) -> Result<Option<T>, RestError> {
    match body {
        None => Ok(None),
        Some(raw) => serde_json::from_slice(raw)
            .map(Some)
            .map_err(|source| RestError::Decode { status, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderName, HeaderValue};

    fn response(status: u16, body: &'static str) -> HttpResponse {
        HttpResponse::new(StatusCode::from_u16(status).unwrap(), HeaderMap::new(), body)
    }

    #[test]
    fn no_content_is_empty_success() {
        let Classified::Success(body) = classify(&response(204, "")) else { panic!() };
        assert!(body.is_none());
        assert_eq!(decode::<serde_json::Value>(StatusCode::NO_CONTENT, body.as_ref()).unwrap(), None);
    }

    #[test]
    fn ok_body_decodes() {
        let Classified::Success(body) = classify(&response(200, r#"{"id":"1"}"#)) else { panic!() };
        let value: serde_json::Value = decode(StatusCode::OK, body.as_ref()).unwrap().unwrap();
        assert_eq!(value["id"], "1");
    }

    #[test]
    fn garbage_success_body_is_decode_error() {
        let Classified::Success(body) = classify(&response(200, "<html>")) else { panic!() };
        let err = decode::<serde_json::Value>(StatusCode::OK, body.as_ref()).unwrap_err();
        assert!(matches!(err, RestError::Decode { status: StatusCode::OK, .. }));
    }

    #[test]
    fn rate_limit_body_wins_over_header() {
        let mut res = response(429, r#"{"message":"slow down","retry_after":0.5,"global":false}"#);
        res.headers.insert(HeaderName::from_static("retry-after"), HeaderValue::from_static("9"));
        let Classified::RateLimited { retry_after, global } = classify(&res) else { panic!() };
        assert_eq!(retry_after, Some(Duration::from_millis(500)));
        assert!(!global);
    }

    #[test]
    fn huge_body_retry_after_is_clamped() {
        let res = response(429, r#"{"message":"slow down","retry_after":1e20,"global":false}"#);
        let Classified::RateLimited { retry_after, .. } = classify(&res) else { panic!() };
        assert_eq!(retry_after, Some(Duration::from_secs(u64::from(u32::MAX))));
    }

    #[test]
    fn rate_limit_falls_back_to_headers() {
        let mut res = response(429, "");
        res.headers.insert(HeaderName::from_static("retry-after"), HeaderValue::from_static("2"));
        res.headers.insert(HeaderName::from_static(headers::SCOPE), HeaderValue::from_static("global"));
        let Classified::RateLimited { retry_after, global } = classify(&res) else { panic!() };
        assert_eq!(retry_after, Some(Duration::from_secs(2)));
        assert!(global);
    }

    #[test]
    fn unauthorized_and_bad_gateway_are_raw() {
        for code in [401, 502] {
            let Classified::Failed(err) = classify(&response(code, "nope")) else { panic!() };
            assert!(matches!(err, RestError::Http { ref body, .. } if body == "nope"));
            assert_eq!(err.status().map(|s| s.as_u16()), Some(code));
        }
    }

    #[test]
    fn api_error_body() {
        let res = response(404, r#"{"code":10003,"message":"Unknown Channel"}"#);
        let Classified::Failed(err) = classify(&res) else { panic!() };
        match err {
            RestError::Api { status, code, message } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(code, 10003);
                assert_eq!(message, "Unknown Channel");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn undecodable_error_body_is_decode_error() {
        let Classified::Failed(err) = classify(&response(500, "oops")) else { panic!() };
        assert!(matches!(err, RestError::Decode { status: StatusCode::INTERNAL_SERVER_ERROR, .. }));
    }
}
