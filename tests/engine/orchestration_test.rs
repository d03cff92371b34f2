//! Coverage for the synchronous dial flow.

use outdial::history::CallState;

use super::mocks::{harness, request, MockCarrier, MockSessions};

#[tokio::test]
async fn happy_path_reaches_in_progress() {
    let h = harness(MockSessions::default(), MockCarrier::default());
    let outcome = h.engine.place_call(request()).await.expect("no integrity error");

    assert!(outcome.is_live());
    assert_eq!(outcome.state, CallState::InProgress);
    assert_eq!(outcome.session_id.as_deref(), Some("uv-123"));
    assert_eq!(outcome.carrier_call_id.as_deref(), Some("CA123"));
    assert!(outcome.error.is_none());

    let entry = h.history.get(outcome.entry_id).expect("entry exists");
    assert_eq!(entry.state, CallState::InProgress);
    assert_eq!(entry.session_id.as_deref(), Some("uv-123"));
    assert_eq!(entry.stream_url.as_deref(), Some("wss://stream.example/uv-123"));
    assert_eq!(entry.carrier_call_id.as_deref(), Some("CA123"));

    // The carrier was handed the session's stream endpoint and the
    // template's originating number.
    let dialed = h.carrier.dialed.lock().expect("dialed lock");
    assert_eq!(
        dialed.as_slice(),
        &[(
            "+15551234567".to_owned(),
            "+16416663498".to_owned(),
            "wss://stream.example/uv-123".to_owned(),
        )]
    );
}

#[tokio::test]
async fn session_creation_failure_is_terminal_without_dialing() {
    let h = harness(
        MockSessions {
            fail_create: true,
            ..MockSessions::default()
        },
        MockCarrier::default(),
    );
    let outcome = h.engine.place_call(request()).await.expect("no integrity error");

    assert_eq!(outcome.state, CallState::Failed);
    assert!(outcome.session_id.is_none());
    assert!(outcome.carrier_call_id.is_none());

    let entry = h.history.get(outcome.entry_id).expect("entry exists");
    assert_eq!(entry.state, CallState::Failed);
    // Upstream error body preserved verbatim for operator diagnosis.
    let detail = entry.error_detail.expect("detail recorded");
    assert!(detail.contains("quota exhausted"));
    assert!(detail.contains("402"));

    // The carrier was never contacted; nothing to tear down either.
    assert!(h.carrier.dialed.lock().expect("dialed lock").is_empty());
    assert!(h.sessions.torn_down.lock().expect("torn_down lock").is_empty());
}

#[tokio::test]
async fn dial_failure_records_detail_and_tears_down_session() {
    let h = harness(
        MockSessions::default(),
        MockCarrier {
            fail_create: true,
            ..MockCarrier::default()
        },
    );
    let outcome = h.engine.place_call(request()).await.expect("no integrity error");

    assert_eq!(outcome.state, CallState::Failed);
    assert_eq!(outcome.session_id.as_deref(), Some("uv-123"));
    assert!(outcome.carrier_call_id.is_none());

    let entry = h.history.get(outcome.entry_id).expect("entry exists");
    assert_eq!(entry.state, CallState::Failed);
    let detail = entry.error_detail.expect("detail recorded");
    assert!(detail.contains("internal carrier error"));
    assert!(detail.contains("500"));

    // Best-effort teardown was attempted; its own failure (the mock always
    // reports one) did not disturb the terminal state.
    assert_eq!(
        h.sessions.torn_down.lock().expect("torn_down lock").as_slice(),
        &["uv-123".to_owned()]
    );
    assert_eq!(h.history.get(outcome.entry_id).expect("entry").state, CallState::Failed);
}

#[tokio::test]
async fn each_attempt_gets_its_own_entry() {
    let h = harness(MockSessions::default(), MockCarrier::default());
    let first = h.engine.place_call(request()).await.expect("first attempt");
    let second = h.engine.place_call(request()).await.expect("second attempt");

    assert_ne!(first.entry_id, second.entry_id);
    assert_eq!(h.history.len(), 2);
    // Most recent first.
    assert_eq!(h.history.list()[0].id, second.entry_id);
}

#[tokio::test]
async fn session_spec_carries_the_rendered_prompt() {
    let h = harness(MockSessions::default(), MockCarrier::default());
    h.engine.place_call(request()).await.expect("attempt");

    let created = h.sessions.created.lock().expect("created lock");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].prompt, "Hello Ava, calling from Acme.");
    assert_eq!(created[0].model, "fixie-ai/ultravox");
}
