mod common;

use common::{builder, client, no_content, rate_limited, response, ScriptedTransport, Step};
use restlane::telemetry::{RequestOutcome, RestEvent};
use restlane::{routes, ClientConfig, MemorySink, RequestOptions, RestError, TrackingSleeper};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn message_deletes_in_one_channel_are_serialized() {
    let transport = ScriptedTransport::new([
        Step::RespondAfter(Duration::from_millis(100), no_content()),
        Step::Respond(no_content()),
    ]);
    let client = client(&transport, 3);
    let first = routes::DELETE_MESSAGE.compile(&[&10u64, &1u64]).unwrap();
    let second = routes::DELETE_MESSAGE.compile(&[&10u64, &2u64]).unwrap();
    assert_eq!(first.bucket_key().as_str(), "channel:10:DELETE");
    assert_eq!(first.bucket_key(), second.bucket_key());

    let a = {
        let client = client.clone();
        tokio::spawn(async move { client.request_empty(&first, None, RequestOptions::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let b = {
        let client = client.clone();
        tokio::spawn(async move { client.request_empty(&second, None, RequestOptions::new()).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.request_count(), 1, "second delete must wait for the first to finish");

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
    assert_eq!(transport.peak_concurrency(), 1);
    let paths: Vec<String> = transport.requests().iter().map(|r| r.url.path().to_owned()).collect();
    assert!(paths[0].ends_with("/messages/1"));
    assert!(paths[1].ends_with("/messages/2"));
}

#[tokio::test(start_paused = true)]
async fn same_bucket_is_never_concurrent() {
    let transport = ScriptedTransport::new(
        (0..8).map(|_| Step::RespondAfter(Duration::from_millis(20), no_content())),
    );
    let client = client(&transport, 3);

    let calls = (0..8u64).map(|message| {
        let client = client.clone();
        let route = routes::DELETE_MESSAGE.compile(&[&42u64, &message]).unwrap();
        tokio::spawn(async move { client.request_empty(&route, None, RequestOptions::new()).await })
    });
    for call in futures::future::join_all(calls).await {
        call.unwrap().unwrap();
    }
    assert_eq!(transport.request_count(), 8);
    assert_eq!(transport.peak_concurrency(), 1);
}

#[tokio::test(start_paused = true)]
async fn different_buckets_run_concurrently() {
    let transport = ScriptedTransport::new([
        Step::RespondAfter(Duration::from_millis(100), no_content()),
        Step::RespondAfter(Duration::from_millis(100), no_content()),
    ]);
    let client = client(&transport, 3);
    let a = routes::GET_CHANNEL.compile(&[&1u64]).unwrap();
    let b = routes::GET_CHANNEL.compile(&[&2u64]).unwrap();
    assert_ne!(a.bucket_key(), b.bucket_key());

    let start = Instant::now();
    let (ra, rb) = tokio::join!(
        client.request_empty(&a, None, RequestOptions::new()),
        client.request_empty(&b, None, RequestOptions::new()),
    );
    ra.unwrap();
    rb.unwrap();
    assert_eq!(transport.peak_concurrency(), 2);
    assert!(start.elapsed() < Duration::from_millis(150));
}

#[tokio::test(start_paused = true)]
async fn exhausted_bucket_delays_next_call_until_reset() {
    let transport = ScriptedTransport::new([
        Step::Respond(response(
            200,
            "{}",
            &[
                ("x-ratelimit-limit", "5"),
                ("x-ratelimit-remaining", "0"),
                ("x-ratelimit-reset-after", "2"),
            ],
        )),
        Step::Respond(no_content()),
    ]);
    let client = client(&transport, 3);
    let route = routes::CREATE_MESSAGE.compile(&[&3u64]).unwrap();

    client.request_empty(&route, None, RequestOptions::new()).await.unwrap();
    let snapshot = client.limiter().bucket(route.bucket_key()).unwrap();
    assert_eq!(snapshot.remaining, 0);

    let start = Instant::now();
    client.request_empty(&route, None, RequestOptions::new()).await.unwrap();
    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(2), "waited {waited:?}");
    assert!(waited < Duration::from_millis(2100), "waited {waited:?}");
}

#[tokio::test(start_paused = true)]
async fn rate_limited_calls_retry_then_give_up() {
    let transport = ScriptedTransport::new((0..3).map(|_| Step::Respond(rate_limited(0.5, false))));
    let sleeper = TrackingSleeper::new();
    let sink = MemorySink::new();
    let client = builder(&transport, 3)
        .sleeper(Arc::new(sleeper.clone()))
        .telemetry(sink.clone())
        .build()
        .unwrap();
    let route = routes::CREATE_MESSAGE.compile(&[&3u64]).unwrap();

    let err = client.request_empty(&route, None, RequestOptions::new()).await.unwrap_err();
    match err {
        RestError::RateLimitExceeded { attempts, retry_after, global } => {
            assert_eq!(attempts, 3);
            assert_eq!(retry_after, Duration::from_millis(500));
            assert!(!global);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(transport.request_count(), 3);
    assert_eq!(sleeper.calls(), vec![Duration::from_millis(500); 2]);

    let events = sink.events();
    let limited = events.iter().filter(|e| matches!(e, RestEvent::RateLimited { .. })).count();
    let retries = events.iter().filter(|e| matches!(e, RestEvent::Retrying { .. })).count();
    assert_eq!(limited, 3);
    assert_eq!(retries, 2);
    assert!(matches!(
        events.last(),
        Some(RestEvent::Completed { attempts: 3, outcome: RequestOutcome::Failure { .. }, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn rate_limited_call_recovers() {
    let transport = ScriptedTransport::new([
        Step::Respond(rate_limited(0.25, false)),
        Step::Respond(response(200, r#"{"ok":true}"#, &[])),
    ]);
    let client = client(&transport, 3);
    let route = routes::GET_CHANNEL.compile(&[&1u64]).unwrap();

    let start = Instant::now();
    let value: Option<serde_json::Value> =
        client.request(&route, None, RequestOptions::new()).await.unwrap();
    assert_eq!(value, Some(serde_json::json!({"ok": true})));
    assert!(start.elapsed() >= Duration::from_millis(250));
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn zero_retries_means_one_attempt() {
    let transport = ScriptedTransport::new([Step::Respond(rate_limited(0.5, false))]);
    let sleeper = TrackingSleeper::new();
    let client = builder(&transport, 0).sleeper(Arc::new(sleeper.clone())).build().unwrap();
    let route = routes::GET_CHANNEL.compile(&[&1u64]).unwrap();

    let err = client.request_empty(&route, None, RequestOptions::new()).await.unwrap_err();
    assert!(matches!(err, RestError::RateLimitExceeded { attempts: 1, .. }));
    assert_eq!(transport.request_count(), 1);
    assert!(sleeper.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn server_wait_is_capped() {
    let transport = ScriptedTransport::new([Step::Respond(rate_limited(600.0, false))]);
    let sleeper = TrackingSleeper::new();
    let config = ClientConfig { max_backoff_ms: 5_000, ..common::config(2) };
    let client = builder(&transport, 2)
        .config(config)
        .sleeper(Arc::new(sleeper.clone()))
        .build()
        .unwrap();
    let route = routes::GET_CHANNEL.compile(&[&1u64]).unwrap();

    client.request_empty(&route, None, RequestOptions::new()).await.unwrap();
    assert_eq!(sleeper.calls(), vec![Duration::from_secs(5)]);
}

#[tokio::test(start_paused = true)]
async fn absurd_body_retry_after_is_capped() {
    let transport = ScriptedTransport::new([Step::Respond(response(
        429,
        r#"{"message":"slow down","retry_after":1e20,"global":false}"#,
        &[],
    ))]);
    let sleeper = TrackingSleeper::new();
    let config = ClientConfig { max_backoff_ms: 5_000, ..common::config(1) };
    let client = builder(&transport, 1)
        .config(config)
        .sleeper(Arc::new(sleeper.clone()))
        .build()
        .unwrap();
    let route = routes::GET_CHANNEL.compile(&[&1u64]).unwrap();

    let err = client.request_empty(&route, None, RequestOptions::new()).await.unwrap_err();
    match err {
        RestError::RateLimitExceeded { attempts, retry_after, .. } => {
            assert_eq!(attempts, 1);
            assert_eq!(retry_after, Duration::from_secs(5));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn global_rate_limit_pauses_every_bucket() {
    let transport = ScriptedTransport::new([
        Step::Respond(response(
            429,
            r#"{"message":"global","retry_after":1.0,"global":true}"#,
            &[("x-ratelimit-global", "true"), ("retry-after", "1")],
        )),
        Step::Respond(no_content()),
    ]);
    let client = client(&transport, 3);
    let route = routes::GET_CHANNEL.compile(&[&1u64]).unwrap();

    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.request_empty(&route, None, RequestOptions::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(client.limiter().is_globally_locked());

    let other = routes::GET_CHANNEL.compile(&[&2u64]).unwrap();
    let start = Instant::now();
    client.request_empty(&other, None, RequestOptions::new()).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(900));

    call.await.unwrap().unwrap();
    assert!(!client.limiter().is_globally_locked());
}

#[tokio::test(start_paused = true)]
async fn global_window_spaces_out_requests() {
    let transport = ScriptedTransport::default();
    let config = ClientConfig { global_rate_limit: Some(2), ..common::config(3) };
    let client = builder(&transport, 3).config(config).build().unwrap();

    let start = Instant::now();
    for channel in 0..3u64 {
        let route = routes::GET_CHANNEL.compile(&[&channel]).unwrap();
        client.request_empty(&route, None, RequestOptions::new()).await.unwrap();
    }
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(transport.request_count(), 3);
}
