//! Coverage for asynchronous carrier event intake.

use outdial::history::CallState;
use outdial::providers::{CarrierCallEvent, CarrierCallStatus};
use tokio::sync::mpsc;

use super::mocks::{harness, request, MockCarrier, MockSessions};

fn event(status: CarrierCallStatus) -> CarrierCallEvent {
    CarrierCallEvent {
        carrier_call_id: "CA123".to_owned(),
        status,
        detail: None,
    }
}

#[tokio::test]
async fn completed_event_finishes_the_call() {
    let h = harness(MockSessions::default(), MockCarrier::default());
    let outcome = h.engine.place_call(request()).await.expect("attempt");

    let applied = h
        .engine
        .handle_carrier_event(&event(CarrierCallStatus::Completed))
        .expect("event applies");
    assert_eq!(applied, Some(CallState::Completed));
    assert_eq!(h.history.get(outcome.entry_id).expect("entry").state, CallState::Completed);
}

#[tokio::test]
async fn failure_classes_map_to_failed_with_detail() {
    for status in [
        CarrierCallStatus::Busy,
        CarrierCallStatus::NoAnswer,
        CarrierCallStatus::Failed,
        CarrierCallStatus::Canceled,
    ] {
        let h = harness(MockSessions::default(), MockCarrier::default());
        let outcome = h.engine.place_call(request()).await.expect("attempt");

        let applied = h
            .engine
            .handle_carrier_event(&CarrierCallEvent {
                carrier_call_id: "CA123".to_owned(),
                status,
                detail: Some("carrier error code 31000".to_owned()),
            })
            .expect("event applies");
        assert_eq!(applied, Some(CallState::Failed));

        let entry = h.history.get(outcome.entry_id).expect("entry");
        assert_eq!(entry.state, CallState::Failed);
        assert_eq!(entry.error_detail.as_deref(), Some("carrier error code 31000"));
    }
}

#[tokio::test]
async fn duplicate_completed_event_is_a_no_op() {
    let h = harness(MockSessions::default(), MockCarrier::default());
    let outcome = h.engine.place_call(request()).await.expect("attempt");

    h.engine
        .handle_carrier_event(&event(CarrierCallStatus::Completed))
        .expect("first event");
    let repeat = h
        .engine
        .handle_carrier_event(&event(CarrierCallStatus::Completed))
        .expect("duplicate is not an error");
    assert_eq!(repeat, Some(CallState::Completed));
    assert_eq!(h.history.get(outcome.entry_id).expect("entry").state, CallState::Completed);
}

#[tokio::test]
async fn progress_events_do_not_transition() {
    let h = harness(MockSessions::default(), MockCarrier::default());
    let outcome = h.engine.place_call(request()).await.expect("attempt");

    for status in [
        CarrierCallStatus::Queued,
        CarrierCallStatus::Ringing,
        CarrierCallStatus::Answered, // already InProgress: same-state no-op
    ] {
        let applied = h.engine.handle_carrier_event(&event(status)).expect("event");
        let state = h.history.get(outcome.entry_id).expect("entry").state;
        assert_eq!(state, CallState::InProgress);
        assert!(applied == None || applied == Some(CallState::InProgress));
    }
}

#[tokio::test]
async fn stale_answered_after_terminal_is_dropped() {
    let h = harness(MockSessions::default(), MockCarrier::default());
    let outcome = h.engine.place_call(request()).await.expect("attempt");
    h.engine
        .handle_carrier_event(&event(CarrierCallStatus::Completed))
        .expect("completed");

    let stale = h
        .engine
        .handle_carrier_event(&event(CarrierCallStatus::Answered))
        .expect("stale event tolerated");
    assert_eq!(stale, None);
    assert_eq!(h.history.get(outcome.entry_id).expect("entry").state, CallState::Completed);
}

#[tokio::test]
async fn unknown_carrier_call_id_is_dropped() {
    let h = harness(MockSessions::default(), MockCarrier::default());
    h.engine.place_call(request()).await.expect("attempt");

    let applied = h
        .engine
        .handle_carrier_event(&CarrierCallEvent {
            carrier_call_id: "CA999".to_owned(),
            status: CarrierCallStatus::Completed,
            detail: None,
        })
        .expect("unknown id tolerated");
    assert_eq!(applied, None);
}

#[tokio::test]
async fn intake_channel_applies_events_until_closed() {
    let h = harness(MockSessions::default(), MockCarrier::default());
    let outcome = h.engine.place_call(request()).await.expect("attempt");

    let (tx, rx) = mpsc::channel(8);
    tx.send(event(CarrierCallStatus::Ringing)).await.expect("send");
    tx.send(event(CarrierCallStatus::Answered)).await.expect("send");
    tx.send(event(CarrierCallStatus::Completed)).await.expect("send");
    drop(tx);

    h.engine.run_event_intake(rx).await;
    assert_eq!(h.history.get(outcome.entry_id).expect("entry").state, CallState::Completed);
}
