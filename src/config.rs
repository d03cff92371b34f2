//! Call template loading and validation.
//!
//! Templates are human-owned TOML files, one template per file, living in
//! the runtime `templates/` directory. Each template bundles a system prompt
//! with `{{placeholder}}` tokens, default placeholder values, voice/model
//! settings, and the originating phone number. Exactly one template must be
//! marked default; the store is read-only after load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::prompt;

/// Error type for template configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the templates directory or a template file.
    #[error("failed to read template files at {path}: {source}")]
    Io {
        /// Directory or file that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Failed to parse a template TOML file.
    #[error("failed to parse template file {path}: {source}")]
    Parse {
        /// File that failed to parse.
        path: String,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
    /// Two template files declare the same key.
    #[error("duplicate template key: {0}")]
    DuplicateKey(String),
    /// No template is marked `default = true`.
    #[error("no template is marked default")]
    NoDefault,
    /// More than one template is marked `default = true`.
    #[error("multiple templates marked default: {0} and {1}")]
    MultipleDefaults(String, String),
    /// A template's originating number is not E.164.
    #[error("template {key}: from_number is not E.164: {number:?}")]
    InvalidFromNumber {
        /// Offending template key.
        key: String,
        /// The rejected number.
        number: String,
    },
    /// Lookup for an unknown template key.
    #[error("template not found: {0}")]
    TemplateNotFound(String),
}

/// Voice used for the AI side of the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider")]
pub enum VoiceSelection {
    /// A voice built into the AI call service, selected by name.
    #[serde(rename = "built-in")]
    BuiltIn {
        /// Voice name (e.g. "Maansvi").
        voice: String,
    },
    /// An ElevenLabs voice routed through the AI call service.
    #[serde(rename = "elevenlabs")]
    ElevenLabs {
        /// ElevenLabs voice identifier.
        voice_id: String,
        /// ElevenLabs TTS model.
        #[serde(default = "default_speech_model")]
        model: String,
    },
}

impl VoiceSelection {
    /// Whether this voice is served by the external speech provider.
    pub fn uses_speech_provider(&self) -> bool {
        matches!(self, Self::ElevenLabs { .. })
    }
}

/// A reusable call configuration loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Unique key identifying this template (e.g. "sales-followup").
    pub key: String,
    /// Whether this template is the designated default. Exactly one
    /// template in the store may set this.
    #[serde(default)]
    pub default: bool,
    /// System prompt with `{{placeholder}}` tokens.
    pub prompt: String,
    /// Default placeholder values, overridable per call.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
    /// Voice selection for the AI side of the call.
    pub voice: VoiceSelection,
    /// AI model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature for the AI model.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Originating phone number (E.164). Never operator-settable.
    pub from_number: String,
}

fn default_model() -> String {
    "fixie-ai/ultravox".to_owned()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_speech_model() -> String {
    "eleven_turbo_v2_5".to_owned()
}

/// Read-only store of named call templates with one designated default.
pub struct TemplateStore {
    templates: BTreeMap<String, Template>,
    default_key: String,
}

impl TemplateStore {
    /// Build a store from already-parsed templates, enforcing invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on duplicate keys, an invalid originating
    /// number, or when the set does not contain exactly one default.
    pub fn from_templates(templates: Vec<Template>) -> Result<Self, ConfigError> {
        let mut map: BTreeMap<String, Template> = BTreeMap::new();
        let mut default_key: Option<String> = None;

        for template in templates {
            if !crate::request::is_e164(&template.from_number) {
                return Err(ConfigError::InvalidFromNumber {
                    key: template.key.clone(),
                    number: template.from_number.clone(),
                });
            }
            if template.default {
                if let Some(existing) = &default_key {
                    return Err(ConfigError::MultipleDefaults(
                        existing.clone(),
                        template.key.clone(),
                    ));
                }
                default_key = Some(template.key.clone());
            }
            if template.defaults.values().any(|v| !v.trim().is_empty())
                && prompt::placeholders(&template.prompt).is_empty()
            {
                // Non-fatal: the defaults still flow into call metadata.
                warn!(
                    key = %template.key,
                    "template has default variables but its prompt references no placeholders"
                );
            }
            if map.contains_key(&template.key) {
                return Err(ConfigError::DuplicateKey(template.key));
            }
            map.insert(template.key.clone(), template);
        }

        let default_key = default_key.ok_or(ConfigError::NoDefault)?;
        Ok(Self {
            templates: map,
            default_key,
        })
    }

    /// Load all `.toml` files from a directory as templates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the directory cannot be read, a file fails
    /// to parse, or the resulting set violates a store invariant.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| ConfigError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        let mut templates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ConfigError::Io {
                path: dir.display().to_string(),
                source,
            })?;
            let file_path = entry.path();
            if file_path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let contents =
                std::fs::read_to_string(&file_path).map_err(|source| ConfigError::Io {
                    path: file_path.display().to_string(),
                    source,
                })?;
            let template: Template =
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: file_path.display().to_string(),
                    source,
                })?;
            templates.push(template);
        }

        Self::from_templates(templates)
    }

    /// Look up a template by key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TemplateNotFound`] when the key is absent.
    pub fn get(&self, key: &str) -> Result<&Template, ConfigError> {
        self.templates
            .get(key)
            .ok_or_else(|| ConfigError::TemplateNotFound(key.to_owned()))
    }

    /// The designated default template.
    pub fn default_template(&self) -> &Template {
        // Invariant: default_key is validated at construction.
        self.templates
            .get(&self.default_key)
            .unwrap_or_else(|| unreachable!("default key validated at load"))
    }

    /// Key of the designated default template.
    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    /// All template keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// All templates in key order.
    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }
}

// ---------------------------------------------------------------------------
// Runtime paths
// ---------------------------------------------------------------------------

/// Resolved filesystem layout under the runtime directory.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    /// Base runtime directory (`~/.outdial` unless overridden).
    pub base: PathBuf,
    /// Directory of template TOML files.
    pub templates_dir: PathBuf,
    /// Dotenv file holding upstream credentials.
    pub env_file: PathBuf,
    /// Directory for rotated log files.
    pub logs_dir: PathBuf,
}

/// Resolve the runtime directory layout.
///
/// Uses `$OUTDIAL_HOME` when set, otherwise `~/.outdial`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn runtime_paths() -> anyhow::Result<RuntimePaths> {
    let base = match std::env::var_os("OUTDIAL_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let home = directories::BaseDirs::new()
                .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
            home.home_dir().join(".outdial")
        }
    };
    Ok(RuntimePaths {
        templates_dir: base.join("templates"),
        env_file: base.join(".env"),
        logs_dir: base.join("logs"),
        base,
    })
}
