//! Compile-time prelude coverage test.
mod common;

use common::{ScriptedTransport, Step};
use restlane::prelude::*;
use std::time::Duration;
use tower::ServiceExt;

#[tokio::test]
async fn prelude_reexports_core_types() {
    let transport = ScriptedTransport::new([Step::Respond(common::no_content())]);
    let sink = MemorySink::new();
    let client = Client::builder()
        .config(ClientConfig { global_rate_limit: None, ..Default::default() })
        .bot_token("token")
        .transport(transport.clone())
        .telemetry(sink.clone())
        .build()
        .expect("client");

    let route: CompiledRoute = routes::GET_CHANNEL.compile(&[&1u64]).expect("route");
    let options = RequestOptions::from_opts([RequestOpt::Timeout(Duration::from_secs(5))]);
    client.request_empty(&route, None, options).await.expect("request");

    assert!(sink.events().iter().any(|event| matches!(event, RestEvent::Completed { .. })));
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn sinks_are_tower_services() {
    let sink = MemorySink::new();
    let event = RestEvent::Retrying {
        bucket: BucketKey::new("/channels/1:GET"),
        attempt: 2,
        delay: Duration::from_millis(10),
    };
    sink.clone().oneshot(event.clone()).await.expect("infallible");
    LogSink.oneshot(event.clone()).await.expect("infallible");
    assert_eq!(sink.events(), vec![event]);
}
