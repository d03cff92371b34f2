//! Coverage for call request construction and its pre-flight ordering.

use std::collections::BTreeMap;

use outdial::config::{Template, TemplateStore, VoiceSelection};
use outdial::credentials::{CredentialName, Credentials};
use outdial::prompt::PromptError;
use outdial::request::{BuildError, CallRequestBuilder, OperatorInput};

fn store() -> TemplateStore {
    let followup = Template {
        key: "sales-followup".to_owned(),
        default: true,
        prompt: "Hello {{name}}, calling from {{company}}.".to_owned(),
        defaults: BTreeMap::from([("company".to_owned(), "Acme".to_owned())]),
        voice: VoiceSelection::ElevenLabs {
            voice_id: "z3L1naUiX6l4xiMWzigO".to_owned(),
            model: "eleven_turbo_v2_5".to_owned(),
        },
        model: "fixie-ai/ultravox".to_owned(),
        temperature: 0.3,
        from_number: "+16416663498".to_owned(),
    };
    TemplateStore::from_templates(vec![followup]).expect("valid store")
}

fn all_credentials() -> Credentials {
    Credentials::from_map(BTreeMap::from([
        ("TWILIO_ACCOUNT_SID".to_owned(), "AC0000".to_owned()),
        ("TWILIO_AUTH_TOKEN".to_owned(), "tok".to_owned()),
        ("ULTRAVOX_API_KEY".to_owned(), "uv-key".to_owned()),
        ("ELEVENLABS_API_KEY".to_owned(), "el-key".to_owned()),
    ]))
}

fn input(destination: &str) -> OperatorInput {
    OperatorInput {
        template_key: None,
        destination: destination.to_owned(),
        customer_name: Some("Ava".to_owned()),
        gender: Some("Female".to_owned()),
        params: BTreeMap::new(),
    }
}

#[test]
fn builds_a_fully_resolved_request() {
    let store = store();
    let credentials = all_credentials();
    let builder = CallRequestBuilder::new(&store, &credentials);

    let request = builder.build(&input("+15551234567")).expect("builds");
    assert_eq!(request.template_key, "sales-followup");
    assert_eq!(request.destination, "+15551234567");
    assert_eq!(request.from_number, "+16416663498");
    assert_eq!(request.prompt, "Hello Ava, calling from Acme.");
    assert_eq!(request.metadata.get("gender").map(String::as_str), Some("Female"));
    assert_eq!(
        request.metadata.get("phone_number").map(String::as_str),
        Some("+15551234567")
    );
}

#[test]
fn originating_number_cannot_be_overridden() {
    let store = store();
    let credentials = all_credentials();
    let builder = CallRequestBuilder::new(&store, &credentials);

    let mut attempt = input("+15551234567");
    attempt
        .params
        .insert("from_number".to_owned(), "+19990000000".to_owned());
    let request = builder.build(&attempt).expect("builds");
    // The param rides along as metadata but never reaches the wire field.
    assert_eq!(request.from_number, "+16416663498");
}

#[test]
fn missing_credential_fails_before_any_formatting() {
    let store = store();
    let credentials = Credentials::from_map(BTreeMap::from([
        ("TWILIO_ACCOUNT_SID".to_owned(), "AC0000".to_owned()),
        ("TWILIO_AUTH_TOKEN".to_owned(), "tok".to_owned()),
        ("ELEVENLABS_API_KEY".to_owned(), "el-key".to_owned()),
    ]));
    let builder = CallRequestBuilder::new(&store, &credentials);

    // Destination is malformed AND a variable is missing, but the
    // credential gap must be reported first.
    let result = builder.build(&OperatorInput {
        destination: "not-a-number".to_owned(),
        customer_name: None,
        ..OperatorInput::default()
    });
    match result {
        Err(BuildError::MissingCredentials { missing }) => {
            assert_eq!(missing.len(), 1);
            assert!(missing.contains(&CredentialName::AiServiceKey));
        }
        other => panic!("expected MissingCredentials, got {other:?}"),
    }
}

#[test]
fn malformed_destination_is_rejected() {
    let store = store();
    let credentials = all_credentials();
    let builder = CallRequestBuilder::new(&store, &credentials);

    let result = builder.build(&input("555-1234"));
    assert!(matches!(result, Err(BuildError::InvalidDestination(_))));
}

#[test]
fn unresolved_placeholder_is_reported_by_name() {
    let store = store();
    let credentials = all_credentials();
    let builder = CallRequestBuilder::new(&store, &credentials);

    let mut attempt = input("+15551234567");
    attempt.customer_name = None; // prompt requires {{name}}
    let result = builder.build(&attempt);
    match result {
        Err(BuildError::Prompt(PromptError::MissingVariable { token })) => {
            assert_eq!(token, "name");
        }
        other => panic!("expected MissingVariable, got {other:?}"),
    }
}

#[test]
fn unknown_template_key_is_not_found() {
    let store = store();
    let credentials = all_credentials();
    let builder = CallRequestBuilder::new(&store, &credentials);

    let mut attempt = input("+15551234567");
    attempt.template_key = Some("cold-outreach".to_owned());
    let result = builder.build(&attempt);
    assert!(matches!(result, Err(BuildError::Config(_))));
}
