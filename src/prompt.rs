//! System-prompt rendering with `{{placeholder}}` substitution.
//!
//! Template defaults are merged with operator overrides (override wins),
//! then the prompt text is scanned once left-to-right. Every well-formed
//! token must resolve to a non-empty value; substitution is literal and a
//! substituted value is never re-scanned, so recursive or self-referential
//! expansion cannot occur. Extraneous override keys are accepted silently —
//! they flow into call metadata without appearing in the prompt.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::config::Template;

/// Error type for prompt rendering.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PromptError {
    /// A placeholder in the prompt has no non-empty resolved value.
    #[error("prompt placeholder {{{{{token}}}}} has no value")]
    MissingVariable {
        /// The unresolved placeholder name.
        token: String,
    },
}

/// Whether a candidate placeholder name is well-formed.
///
/// Tokens are non-empty runs of ASCII alphanumerics and underscores,
/// matching the original `{{key}}` convention. Anything else between
/// braces is emitted literally.
fn is_token(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Placeholder names referenced by a prompt, in first-occurrence order.
pub fn placeholders(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let (_, tail) = rest.split_at(start);
        let after = &tail[2..];
        match after.find("}}") {
            Some(end) => {
                let (candidate, remainder) = after.split_at(end);
                if is_token(candidate) {
                    if !found.iter().any(|t| t == candidate) {
                        found.push(candidate.to_owned());
                    }
                    rest = &remainder[2..];
                } else {
                    rest = after;
                }
            }
            None => break,
        }
    }
    found
}

/// Merge template defaults with operator overrides; override wins.
pub fn merge_variables(
    template: &Template,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = template.defaults.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Render a template's prompt with merged variables.
///
/// # Errors
///
/// Fails fast with [`PromptError::MissingVariable`] naming the first
/// (leftmost) placeholder whose merged value is absent or empty.
pub fn render(
    template: &Template,
    overrides: &BTreeMap<String, String>,
) -> Result<String, PromptError> {
    let variables = merge_variables(template, overrides);
    render_text(&template.prompt, &variables)
}

/// Single-pass, non-recursive substitution over already-merged variables.
///
/// # Errors
///
/// Fails with [`PromptError::MissingVariable`] on the first unresolved token.
pub fn render_text(
    text: &str,
    variables: &BTreeMap<String, String>,
) -> Result<String, PromptError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        let (head, tail) = rest.split_at(start);
        out.push_str(head);
        let after = &tail[2..];

        match after.find("}}") {
            Some(end) => {
                let (candidate, remainder) = after.split_at(end);
                if is_token(candidate) {
                    let value = variables
                        .get(candidate)
                        .filter(|v| !v.trim().is_empty())
                        .ok_or_else(|| PromptError::MissingVariable {
                            token: candidate.to_owned(),
                        })?;
                    out.push_str(value);
                    rest = &remainder[2..];
                } else {
                    out.push_str("{{");
                    rest = after;
                }
            }
            None => {
                // Unterminated opener: emit the tail literally.
                out.push_str(tail);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}
