#![allow(missing_docs)]
//! Failover transparency across all three call shapes.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use dramatis_engine::test_support::StubBackend;
use dramatis_engine::{
    BackendError, BackendRoute, EngineError, Evaluation, FailoverBackend, GenerationRequest,
};

fn request() -> GenerationRequest {
    GenerationRequest::new("system".to_string(), "prompt".to_string())
}

fn failover(primary: StubBackend, backup: StubBackend) -> FailoverBackend {
    FailoverBackend::new(
        Arc::new(primary),
        Arc::new(backup),
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn text_call_falls_over_to_backup() {
    let wrapped = failover(
        StubBackend::failing("primary"),
        StubBackend::healthy("backup").with_digest("from backup"),
    );
    let routed = wrapped.generate_text(request()).await.expect("backup serves");
    assert_eq!(routed.value, "from backup");
    assert_eq!(routed.route, BackendRoute::Fallback);
}

#[tokio::test]
async fn structured_call_falls_over_to_backup() {
    let wrapped = failover(
        StubBackend::failing("primary"),
        StubBackend::healthy("backup").with_evaluation(json!({
            "situation": "rescued by the backup",
        })),
    );
    let routed = wrapped
        .generate_structured::<Evaluation>(request())
        .await
        .expect("backup serves");
    assert_eq!(routed.value.situation, "rescued by the backup");
    assert_eq!(routed.route, BackendRoute::Fallback);
}

#[tokio::test]
async fn stream_call_falls_over_to_backup() {
    let wrapped = failover(
        StubBackend::failing("primary"),
        StubBackend::healthy("backup").with_reply_chunks(&["Hel", "lo"]),
    );
    let routed = wrapped
        .generate_stream(request())
        .await
        .expect("backup serves");
    assert_eq!(routed.route, BackendRoute::Fallback);
    let mut rx = routed.value;
    let mut text = String::new();
    while let Some(item) = rx.recv().await {
        text.push_str(&item.expect("clean stream"));
    }
    assert_eq!(text, "Hello");
}

#[tokio::test]
async fn healthy_primary_is_served_as_primary() {
    let wrapped = failover(
        StubBackend::healthy("primary").with_digest("from primary"),
        StubBackend::healthy("backup").with_digest("from backup"),
    );
    let routed = wrapped.generate_text(request()).await.expect("primary serves");
    assert_eq!(routed.value, "from primary");
    assert_eq!(routed.route, BackendRoute::Primary);
}

#[tokio::test]
async fn both_backends_failing_attaches_both_errors() {
    let wrapped = failover(StubBackend::failing("primary"), StubBackend::failing("backup"));
    let error = wrapped
        .generate_text(request())
        .await
        .expect_err("both fail");
    match error {
        EngineError::BothBackendsFailed { ref primary, ref backup } => {
            assert!(primary.to_string().contains("scripted failure from primary"));
            assert!(backup.to_string().contains("scripted failure from backup"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(error.to_string().contains("both processors failed"));
}

#[tokio::test]
async fn malformed_structured_output_counts_as_failure() {
    // Primary answers, but with JSON that does not fit the requested shape.
    let wrapped = failover(
        StubBackend::healthy("primary").with_evaluation(json!("not an object")),
        StubBackend::healthy("backup").with_evaluation(json!({
            "situation": "well formed",
        })),
    );
    let routed = wrapped
        .generate_structured::<Evaluation>(request())
        .await
        .expect("backup serves");
    assert_eq!(routed.value.situation, "well formed");
    assert_eq!(routed.route, BackendRoute::Fallback);
}

#[tokio::test]
async fn failed_first_chunk_falls_over_before_any_relay() {
    let wrapped = failover(
        StubBackend::healthy("primary")
            .with_reply_chunks(&[])
            .with_stream_error("connection reset"),
        StubBackend::healthy("backup").with_reply_chunks(&["backup text"]),
    );
    let routed = wrapped
        .generate_stream(request())
        .await
        .expect("backup serves");
    assert_eq!(routed.route, BackendRoute::Fallback);
    let mut rx = routed.value;
    let mut text = String::new();
    while let Some(item) = rx.recv().await {
        text.push_str(&item.expect("clean stream"));
    }
    assert_eq!(text, "backup text");
}

#[tokio::test]
async fn mid_stream_failure_after_relay_aborts_the_sequence() {
    let wrapped = failover(
        StubBackend::healthy("primary")
            .with_reply_chunks(&["partial "])
            .with_stream_error("server hiccup"),
        StubBackend::healthy("backup"),
    );
    let routed = wrapped
        .generate_stream(request())
        .await
        .expect("stream established");
    assert_eq!(routed.route, BackendRoute::Primary);
    let mut rx = routed.value;
    let first = rx.recv().await.expect("first item");
    assert_eq!(first.expect("first chunk"), "partial ");
    let second = rx.recv().await.expect("second item");
    match second {
        Err(BackendError::Stream { reason }) => assert_eq!(reason, "server hiccup"),
        other => panic!("expected stream abort, got {other:?}"),
    }
    assert!(rx.recv().await.is_none());
}
