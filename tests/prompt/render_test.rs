//! Coverage for placeholder scanning and prompt rendering.

use std::collections::BTreeMap;

use outdial::config::{Template, VoiceSelection};
use outdial::prompt::{merge_variables, placeholders, render, render_text, PromptError};

fn template(prompt: &str, defaults: &[(&str, &str)]) -> Template {
    Template {
        key: "sales-followup".to_owned(),
        default: true,
        prompt: prompt.to_owned(),
        defaults: defaults
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect(),
        voice: VoiceSelection::BuiltIn {
            voice: "Maansvi".to_owned(),
        },
        model: "fixie-ai/ultravox".to_owned(),
        temperature: 0.3,
        from_number: "+16416663498".to_owned(),
    }
}

fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

#[test]
fn placeholders_in_first_occurrence_order() {
    let found = placeholders("Hi {{name}}, {{amount}} is due, {{name}}.");
    assert_eq!(found, vec!["name".to_owned(), "amount".to_owned()]);
}

#[test]
fn placeholders_ignores_malformed_tokens() {
    let found = placeholders("{{no spaces}} {{}} {{ok_1}} {{unterminated");
    assert_eq!(found, vec!["ok_1".to_owned()]);
}

#[test]
fn renders_with_defaults_and_overrides() {
    let template = template("Hello {{name}}, gender {{gender}}.", &[("name", "Amit"), ("gender", "Male")]);
    let rendered = render(&template, &vars(&[("name", "Ava")])).expect("renders");
    assert_eq!(rendered, "Hello Ava, gender Male.");
    assert!(!rendered.contains("{{"));
}

#[test]
fn override_wins_over_default() {
    let template = template("{{greeting}}", &[("greeting", "hello")]);
    let merged = merge_variables(&template, &vars(&[("greeting", "namaste")]));
    assert_eq!(merged.get("greeting").map(String::as_str), Some("namaste"));
}

#[test]
fn missing_variable_fails_fast_with_first_token() {
    let template = template("Hi {{name}}, {{amount}} due.", &[]);
    let err = render(&template, &vars(&[("amount", "50000")]));
    assert_eq!(
        err,
        Err(PromptError::MissingVariable {
            token: "name".to_owned()
        })
    );
}

#[test]
fn empty_value_counts_as_missing() {
    let template = template("Hi {{name}}.", &[("name", "  ")]);
    let err = render(&template, &BTreeMap::new());
    assert!(matches!(err, Err(PromptError::MissingVariable { token }) if token == "name"));
}

#[test]
fn substitution_is_not_recursive() {
    // A substituted value containing placeholder syntax is emitted literally.
    let rendered = render_text("Say {{a}}.", &vars(&[("a", "{{b}}"), ("b", "boom")]))
        .expect("renders");
    assert_eq!(rendered, "Say {{b}}.");
}

#[test]
fn extraneous_override_keys_are_accepted() {
    let template = template("Hello {{name}}.", &[("name", "Amit")]);
    let rendered = render(&template, &vars(&[("loan_amount", "50000")])).expect("renders");
    assert_eq!(rendered, "Hello Amit.");
}

#[test]
fn deterministic_first_missing_token() {
    let text = "{{b}} then {{a}}";
    for _ in 0..3 {
        let err = render_text(text, &BTreeMap::new());
        assert!(matches!(err, Err(PromptError::MissingVariable { token }) if token == "b"));
    }
}
