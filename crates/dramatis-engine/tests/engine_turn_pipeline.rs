#![allow(missing_docs)]
//! One-turn pipeline: evaluation, streamed reply, atomic triple persistence.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use dramatis_engine::test_support::StubBackend;
use dramatis_engine::{
    CharacterProfile, EngineConfig, EngineError, Evaluation, InMemoryMessageLog,
    InMemorySummaryStore, MessageLog, SummaryStore, ThinkingStage, TurnEngine, TurnEvent,
};
use dramatis_window::{FragmentKind, Role};

fn profile() -> CharacterProfile {
    CharacterProfile::new("innkeeper", "Marta", "A wary but warm-hearted innkeeper.")
}

fn engine_with(
    primary: Arc<StubBackend>,
    backup: Arc<StubBackend>,
    config: EngineConfig,
) -> (TurnEngine, Arc<InMemoryMessageLog>, Arc<InMemorySummaryStore>) {
    let log = Arc::new(InMemoryMessageLog::new());
    let summaries = Arc::new(InMemorySummaryStore::new());
    let engine = TurnEngine::new(config, log.clone(), summaries.clone(), primary, backup);
    (engine, log, summaries)
}

async fn run_turn(
    engine: &TurnEngine,
    session_id: &str,
    message: &str,
) -> (Result<String, EngineError>, Vec<TurnEvent>) {
    let (tx, mut rx) = mpsc::channel(256);
    let result = engine.handle_turn(session_id, message, &tx).await;
    drop(tx);
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (result, events)
}

#[tokio::test]
async fn turn_persists_an_atomic_triple() {
    dramatis_engine::test_support::init_tracing();
    let primary = Arc::new(StubBackend::healthy("primary").with_reply_chunks(&["Wel", "come!"]));
    let backup = Arc::new(StubBackend::healthy("backup"));
    let (engine, log, _) = engine_with(primary, backup, EngineConfig::default());
    let handle = engine
        .load_or_create_session(Some("s1".to_string()), profile())
        .await
        .expect("session loads");

    let (result, _) = run_turn(&engine, &handle.session_id, "hello there").await;
    assert_eq!(result.expect("turn succeeds"), "Welcome!");

    let fragments = log.read_all("s1").await.expect("log readable");
    assert_eq!(fragments.len(), 3);
    let offsets: Vec<u64> = fragments.iter().map(|f| f.offset).collect();
    assert_eq!(offsets, vec![0, 1, 2]);
    assert_eq!(fragments[0].role, Role::User);
    assert_eq!(fragments[0].kind, FragmentKind::Conversation);
    assert_eq!(fragments[0].content, "hello there");
    assert_eq!(fragments[1].kind, FragmentKind::Evaluation);
    assert_eq!(fragments[2].role, Role::Assistant);
    assert_eq!(fragments[2].kind, FragmentKind::Conversation);
    assert_eq!(fragments[2].content, "Welcome!");
}

#[tokio::test]
async fn offsets_stay_gapless_across_turns_and_compressions() {
    let primary = Arc::new(StubBackend::healthy("primary"));
    let backup = Arc::new(StubBackend::healthy("backup"));
    let config = EngineConfig {
        compression_threshold_fragments: 6,
        window_keep_after_compression: 0,
        ..EngineConfig::default()
    };
    let (engine, log, summaries) = engine_with(primary, backup, config);
    engine
        .load_or_create_session(Some("s1".to_string()), profile())
        .await
        .expect("session loads");

    for i in 0..4 {
        let (result, _) = run_turn(&engine, "s1", &format!("message {i}")).await;
        result.expect("turn succeeds");
    }

    let fragments = log.read_all("s1").await.expect("log readable");
    let offsets: Vec<u64> = fragments.iter().map(|f| f.offset).collect();
    assert_eq!(offsets, (0..12).collect::<Vec<u64>>());
    assert!(
        !summaries
            .list_by_session("s1")
            .await
            .expect("store readable")
            .is_empty(),
        "at least one compression should have run"
    );
}

#[tokio::test]
async fn chunks_and_lifecycle_events_arrive_in_order() {
    let primary = Arc::new(StubBackend::healthy("primary").with_reply_chunks(&["a", "b", "c"]));
    let backup = Arc::new(StubBackend::healthy("backup"));
    let (engine, _, _) = engine_with(primary, backup, EngineConfig::default());
    engine
        .load_or_create_session(Some("s1".to_string()), profile())
        .await
        .expect("session loads");

    let (result, events) = run_turn(&engine, "s1", "hi").await;
    result.expect("turn succeeds");

    let mut stages = Vec::new();
    let mut chunks = Vec::new();
    for event in events {
        match event {
            TurnEvent::Thinking(stage) => stages.push(stage.as_str()),
            TurnEvent::Chunk(chunk) => chunks.push(chunk),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(stages, vec!["thinking:evaluating", "thinking:responding"]);
    assert_eq!(chunks, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn newly_stated_user_name_reaches_the_next_reply_prompt() {
    let primary = Arc::new(
        StubBackend::healthy("primary").with_evaluation(json!({
            "situation": "introductions made",
            "user_name": "Alice",
        })),
    );
    let backup = Arc::new(StubBackend::healthy("backup"));
    let (engine, _, _) = engine_with(primary.clone(), backup, EngineConfig::default());
    engine
        .load_or_create_session(Some("s1".to_string()), profile())
        .await
        .expect("session loads");

    let (result, _) = run_turn(&engine, "s1", "call me Alice").await;
    result.expect("first turn succeeds");
    let (result, _) = run_turn(&engine, "s1", "what was my name again?").await;
    result.expect("second turn succeeds");

    let stream_calls: Vec<_> = primary
        .recorded_calls()
        .into_iter()
        .filter(|call| call.shape == "stream")
        .collect();
    assert_eq!(stream_calls.len(), 2);
    assert!(
        stream_calls[1]
            .request
            .system_prompt
            .contains("The user goes by: Alice")
    );
}

#[tokio::test]
async fn evaluation_fragment_parses_back() {
    let primary = Arc::new(
        StubBackend::healthy("primary").with_evaluation(json!({
            "avoid_patterns": ["raises an eyebrow"],
            "situation": "the stew is burning",
        })),
    );
    let backup = Arc::new(StubBackend::healthy("backup"));
    let (engine, log, _) = engine_with(primary, backup, EngineConfig::default());
    engine
        .load_or_create_session(Some("s1".to_string()), profile())
        .await
        .expect("session loads");

    let (result, _) = run_turn(&engine, "s1", "smells like smoke").await;
    result.expect("turn succeeds");

    let fragments = log.read_all("s1").await.expect("log readable");
    let parsed = Evaluation::from_fragment_text(&fragments[1].content)
        .expect("evaluation fragment parses");
    assert_eq!(parsed.situation, "the stew is burning");
    assert_eq!(parsed.avoid_patterns, vec!["raises an eyebrow".to_string()]);
}

#[tokio::test]
async fn engine_survives_a_dead_primary() {
    let primary = Arc::new(StubBackend::failing("primary"));
    let backup = Arc::new(StubBackend::healthy("backup").with_reply_chunks(&["backup reply"]));
    let (engine, log, _) = engine_with(primary, backup, EngineConfig::default());
    engine
        .load_or_create_session(Some("s1".to_string()), profile())
        .await
        .expect("session loads");

    let (result, _) = run_turn(&engine, "s1", "anyone there?").await;
    assert_eq!(result.expect("backup serves the turn"), "backup reply");
    assert_eq!(log.read_all("s1").await.expect("log readable").len(), 3);
}

#[tokio::test]
async fn total_backend_failure_leaves_no_trace() {
    let primary = Arc::new(StubBackend::failing("primary"));
    let backup = Arc::new(StubBackend::failing("backup"));
    let (engine, log, _) = engine_with(primary, backup, EngineConfig::default());
    engine
        .load_or_create_session(Some("s1".to_string()), profile())
        .await
        .expect("session loads");

    let (result, events) = run_turn(&engine, "s1", "hello?").await;
    match result {
        Err(EngineError::BothBackendsFailed { .. }) => {}
        other => panic!("expected both-backends failure, got {other:?}"),
    }
    assert!(
        events
            .iter()
            .any(|event| matches!(event, TurnEvent::Error(_))),
        "error must surface on the event channel"
    );
    assert!(log.read_all("s1").await.expect("log readable").is_empty());
}

#[tokio::test]
async fn mid_stream_failure_aborts_with_nothing_persisted() {
    let primary = Arc::new(
        StubBackend::healthy("primary")
            .with_reply_chunks(&["half a rep"])
            .with_stream_error("connection lost"),
    );
    let backup = Arc::new(StubBackend::healthy("backup"));
    let (engine, log, _) = engine_with(primary, backup, EngineConfig::default());
    engine
        .load_or_create_session(Some("s1".to_string()), profile())
        .await
        .expect("session loads");

    let (result, events) = run_turn(&engine, "s1", "tell me everything").await;
    match result {
        Err(EngineError::StreamAborted(_)) => {}
        other => panic!("expected stream abort, got {other:?}"),
    }
    assert!(
        events
            .iter()
            .any(|event| matches!(event, TurnEvent::Error(_)))
    );
    assert!(log.read_all("s1").await.expect("log readable").is_empty());
}

#[tokio::test]
async fn turn_on_an_unloaded_session_is_rejected() {
    let primary = Arc::new(StubBackend::healthy("primary"));
    let backup = Arc::new(StubBackend::healthy("backup"));
    let (engine, _, _) = engine_with(primary, backup, EngineConfig::default());

    let (result, _) = run_turn(&engine, "ghost", "hello").await;
    match result {
        Err(EngineError::SessionNotLoaded { session_id }) => assert_eq!(session_id, "ghost"),
        other => panic!("expected session-not-loaded, got {other:?}"),
    }
}

#[tokio::test]
async fn thinking_stage_labels_are_stable() {
    assert_eq!(ThinkingStage::Summarizing.as_str(), "thinking:summarizing");
    assert_eq!(ThinkingStage::Evaluating.as_str(), "thinking:evaluating");
    assert_eq!(ThinkingStage::Responding.as_str(), "thinking:responding");
}
