//! Call request construction from a template plus operator input.
//!
//! Pre-flight order is deliberate: template lookup, then credential check
//! (the cheapest failure, before any formatting work), then destination
//! validation, then prompt rendering. Only a request that clears all four
//! reaches the orchestration engine, so every network attempt starts from a
//! fully validated [`CallRequest`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, TemplateStore, VoiceSelection};
use crate::credentials::{required_for, CredentialName, Credentials};
use crate::prompt::{self, PromptError};

/// Error type for call request construction. All variants are pre-flight:
/// no network call has been made and no history entry exists.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Template lookup or store problem.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// One or more required secrets are absent; the call was not attempted.
    #[error("missing required credentials: {}", format_names(missing))]
    MissingCredentials {
        /// The absent credential names.
        missing: BTreeSet<CredentialName>,
    },
    /// The destination number is not E.164.
    #[error("destination number is not E.164: {0:?}")]
    InvalidDestination(String),
    /// A prompt placeholder could not be resolved.
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

fn format_names(names: &BTreeSet<CredentialName>) -> String {
    names
        .iter()
        .map(|n| n.env_var())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Untrusted per-call input from the operator.
///
/// There is deliberately no field for the originating number or voice/model
/// settings: those are template-owned and read-only from this path.
#[derive(Debug, Clone, Default)]
pub struct OperatorInput {
    /// Template to use; the store's default when absent.
    pub template_key: Option<String>,
    /// Destination phone number (E.164).
    pub destination: String,
    /// Customer name, overriding the template's `name` default.
    pub customer_name: Option<String>,
    /// Customer gender, overriding the template's `gender` default.
    pub gender: Option<String>,
    /// Free-form key/value parameters; placeholder overrides and metadata.
    pub params: BTreeMap<String, String>,
}

impl OperatorInput {
    /// The placeholder override map this input contributes.
    ///
    /// Mirrors the original form fields: `name`, `gender`, and
    /// `phone_number` are named variables; custom params ride along as-is.
    pub fn overrides(&self) -> BTreeMap<String, String> {
        let mut overrides = self.params.clone();
        if let Some(name) = &self.customer_name {
            overrides.insert("name".to_owned(), name.clone());
        }
        if let Some(gender) = &self.gender {
            overrides.insert("gender".to_owned(), gender.clone());
        }
        if !self.destination.trim().is_empty() {
            overrides.insert("phone_number".to_owned(), self.destination.clone());
        }
        overrides
    }
}

/// A fully resolved, validated specification for one outbound call attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    /// Key of the template this request was built from.
    pub template_key: String,
    /// Destination phone number (E.164).
    pub destination: String,
    /// Originating phone number (E.164), fixed from the template.
    pub from_number: String,
    /// Fully rendered system prompt. Contains no placeholder tokens.
    pub prompt: String,
    /// Voice selection for the AI side of the call.
    pub voice: VoiceSelection,
    /// AI model identifier.
    pub model: String,
    /// Sampling temperature for the AI model.
    pub temperature: f64,
    /// Merged custom metadata carried on the history entry.
    pub metadata: BTreeMap<String, String>,
}

/// Whether a string is a valid E.164 number: `+`, a 1-9 lead digit, then
/// up to 14 more digits.
pub fn is_e164(number: &str) -> bool {
    let Some(digits) = number.strip_prefix('+') else {
        return false;
    };
    let len = digits.chars().count();
    if !(2..=15).contains(&len) {
        return false;
    }
    let mut chars = digits.chars();
    matches!(chars.next(), Some('1'..='9')) && chars.all(|c| c.is_ascii_digit())
}

/// Builds validated [`CallRequest`]s from operator input.
///
/// Holds the immutable template store and the credentials loaded for this
/// build. Callers reload credentials per call rather than reusing a
/// long-lived builder, since secrets can change between calls.
pub struct CallRequestBuilder<'a> {
    store: &'a TemplateStore,
    credentials: &'a Credentials,
}

impl<'a> CallRequestBuilder<'a> {
    /// Create a builder over a template store and freshly loaded credentials.
    pub fn new(store: &'a TemplateStore, credentials: &'a Credentials) -> Self {
        Self { store, credentials }
    }

    /// Build a validated call request.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] on unknown template, missing credentials,
    /// malformed destination, or an unresolved prompt placeholder — in that
    /// order, before any network work.
    pub fn build(&self, input: &OperatorInput) -> Result<CallRequest, BuildError> {
        let template = match &input.template_key {
            Some(key) => self.store.get(key)?,
            None => self.store.default_template(),
        };

        let check = self.credentials.check(&required_for(template));
        if !check.is_satisfied() {
            return Err(BuildError::MissingCredentials {
                missing: check.missing,
            });
        }

        if !is_e164(&input.destination) {
            return Err(BuildError::InvalidDestination(input.destination.clone()));
        }

        let overrides = input.overrides();
        let rendered = prompt::render(template, &overrides)?;

        Ok(CallRequest {
            template_key: template.key.clone(),
            destination: input.destination.clone(),
            from_number: template.from_number.clone(),
            prompt: rendered,
            voice: template.voice.clone(),
            model: template.model.clone(),
            temperature: template.temperature,
            metadata: prompt::merge_variables(template, &overrides),
        })
    }
}
