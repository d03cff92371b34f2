//! Ultravox wire format tests.

use serde_json::{json, Value};

use outdial::config::VoiceSelection;
use outdial::providers::ultravox::{build_call_request, parse_call_response, parse_transcript};
use outdial::providers::{SessionSpec, TranscriptRole, UpstreamError};

fn spec(voice: VoiceSelection) -> SessionSpec {
    SessionSpec {
        prompt: "Hello Ava, calling from Acme.".to_owned(),
        model: "fixie-ai/ultravox".to_owned(),
        temperature: 0.3,
        voice,
    }
}

#[test]
fn build_request_with_built_in_voice() {
    let request = build_call_request(&spec(VoiceSelection::BuiltIn {
        voice: "Maansvi".to_owned(),
    }));
    let value = serde_json::to_value(&request).expect("serializes");

    assert_eq!(value["systemPrompt"], "Hello Ava, calling from Acme.");
    assert_eq!(value["model"], "fixie-ai/ultravox");
    assert_eq!(value["voice"], "Maansvi");
    assert_eq!(value["medium"], json!({ "twilio": {} }));
    assert_eq!(value["firstSpeakerSettings"], json!({ "user": {} }));
    assert_eq!(value.get("externalVoice"), None);
}

#[test]
fn build_request_with_elevenlabs_voice() {
    let request = build_call_request(&spec(VoiceSelection::ElevenLabs {
        voice_id: "z3L1naUiX6l4xiMWzigO".to_owned(),
        model: "eleven_turbo_v2_5".to_owned(),
    }));
    let value = serde_json::to_value(&request).expect("serializes");

    assert_eq!(value.get("voice"), None);
    assert_eq!(
        value["externalVoice"],
        json!({
            "elevenLabs": {
                "voiceId": "z3L1naUiX6l4xiMWzigO",
                "model": "eleven_turbo_v2_5",
            }
        })
    );
}

#[test]
fn parse_call_response_extracts_handle() {
    let body = r#"{"callId": "uv-123", "joinUrl": "wss://stream.example/uv-123", "created": "now"}"#;
    let handle = parse_call_response(body).expect("parses");
    assert_eq!(handle.session_id, "uv-123");
    assert_eq!(handle.stream_url, "wss://stream.example/uv-123");
}

#[test]
fn parse_call_response_requires_join_url() {
    let body = r#"{"callId": "uv-123"}"#;
    let result = parse_call_response(body);
    match result {
        Err(UpstreamError::Parse(message)) => assert!(message.contains("joinUrl")),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn parse_call_response_rejects_non_json() {
    let result = parse_call_response("<html>gateway timeout</html>");
    assert!(matches!(result, Err(UpstreamError::Parse(_))));
}

#[test]
fn parse_transcript_keeps_agent_and_customer_rows() {
    let body = serde_json::to_string(&json!({
        "results": [
            { "role": "MESSAGE_ROLE_AGENT", "text": "Hello Ava." },
            { "role": "MESSAGE_ROLE_USER", "text": "Hi, who is this?" },
            { "role": "MESSAGE_ROLE_TOOL_CALL", "text": "lookup()" },
            { "role": "MESSAGE_ROLE_AGENT", "text": "" },
            { "text": "orphaned" }
        ]
    }))
    .expect("serializes");

    let lines = parse_transcript(&body).expect("parses");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].role, TranscriptRole::Agent);
    assert_eq!(lines[0].text, "Hello Ava.");
    assert_eq!(lines[1].role, TranscriptRole::Customer);
}

#[test]
fn parse_transcript_tolerates_empty_results() {
    let lines = parse_transcript("{}").expect("parses");
    assert!(lines.is_empty());

    let empty: Value = json!({ "results": [] });
    let lines = parse_transcript(&empty.to_string()).expect("parses");
    assert!(lines.is_empty());
}
