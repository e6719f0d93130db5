#![allow(dead_code)]

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use restlane::{
    Client, ClientBuilder, ClientConfig, HttpRequest, HttpResponse, Transport, TransportError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted transport reaction.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(HttpResponse),
    RespondAfter(Duration, HttpResponse),
    Fail(&'static str),
    /// Never answers; only the caller's context can end the exchange.
    Hang,
}

#[derive(Debug, Default)]
struct Script {
    steps: VecDeque<Step>,
    requests: Vec<HttpRequest>,
}

/// Transport that plays back a script and records what it was sent.
///
/// Once the script runs out every request gets `204 No Content`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

struct Active(Arc<AtomicUsize>);

impl Drop for Active {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        let transport = Self::default();
        transport.script.lock().unwrap().steps.extend(steps);
        transport
    }

    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().steps.push_back(step);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.script.lock().unwrap().requests.len()
    }

    /// Highest number of exchanges that were in progress at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let step = {
            let mut script = self.script.lock().unwrap();
            script.requests.push(request);
            script.steps.pop_front()
        };
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _active = Active(Arc::clone(&self.active));

        match step.unwrap_or_else(|| Step::Respond(no_content())) {
            Step::Respond(response) => Ok(response),
            Step::RespondAfter(delay, response) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Step::Fail(message) => Err(TransportError::new(message)),
            Step::Hang => futures::future::pending().await,
        }
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn response(status: u16, body: &str, headers: &[(&str, &str)]) -> HttpResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    HttpResponse::new(StatusCode::from_u16(status).unwrap(), map, body.to_owned())
}

pub fn no_content() -> HttpResponse {
    response(204, "", &[])
}

pub fn rate_limited(retry_after: f64, global: bool) -> HttpResponse {
    let body = format!(
        r#"{{"message":"You are being rate limited.","retry_after":{retry_after},"global":{global}}}"#
    );
    response(429, &body, &[])
}

pub fn config(max_retries: usize) -> ClientConfig {
    ClientConfig {
        base_url: "https://api.test/api/v10".into(),
        max_retries,
        global_rate_limit: None,
        ..Default::default()
    }
}

pub fn builder(transport: &ScriptedTransport, max_retries: usize) -> ClientBuilder {
    Client::builder().config(config(max_retries)).bot_token("token").transport(transport.clone())
}

pub fn client(transport: &ScriptedTransport, max_retries: usize) -> Client {
    builder(transport, max_retries).build().unwrap()
}
