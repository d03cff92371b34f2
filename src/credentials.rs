//! Credential loading from the runtime `.env` file and pre-flight checks.
//!
//! Secrets are re-read from disk for every call build rather than cached,
//! since an operator may edit them between calls. A missing secret is a
//! reportable result ([`CredentialCheck`]), never an error: the UI has to
//! render absence.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::config::{runtime_paths, Template};

/// A named upstream secret the call flow may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CredentialName {
    /// Carrier account identifier (Twilio account SID).
    CarrierAccountId,
    /// Carrier API auth token (Twilio auth token).
    CarrierAuthToken,
    /// Conversational-AI service API key (Ultravox).
    AiServiceKey,
    /// Speech-synthesis service API key (ElevenLabs).
    SpeechServiceKey,
    /// Optional base-URL override for the AI service. Never required.
    AiServiceUrl,
}

impl CredentialName {
    /// The `.env` variable name holding this credential.
    pub fn env_var(self) -> &'static str {
        match self {
            Self::CarrierAccountId => "TWILIO_ACCOUNT_SID",
            Self::CarrierAuthToken => "TWILIO_AUTH_TOKEN",
            Self::AiServiceKey => "ULTRAVOX_API_KEY",
            Self::SpeechServiceKey => "ELEVENLABS_API_KEY",
            Self::AiServiceUrl => "ULTRAVOX_API_URL",
        }
    }

    /// Every known credential name, required and optional.
    pub fn all() -> [Self; 5] {
        [
            Self::CarrierAccountId,
            Self::CarrierAuthToken,
            Self::AiServiceKey,
            Self::SpeechServiceKey,
            Self::AiServiceUrl,
        ]
    }
}

impl std::fmt::Display for CredentialName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.env_var())
    }
}

/// Result of a pre-flight credential check. Missing names are data, not
/// an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialCheck {
    /// Required names with a non-empty value in the source.
    pub present: BTreeSet<CredentialName>,
    /// Required names absent or empty in the source.
    pub missing: BTreeSet<CredentialName>,
}

impl CredentialCheck {
    /// Whether every required credential is present.
    pub fn is_satisfied(&self) -> bool {
        self.missing.is_empty()
    }
}

/// The minimum credential set a template's providers need.
///
/// The carrier pair and the AI-service key are always required; the speech
/// key only when the template's voice uses the external speech provider.
pub fn required_for(template: &Template) -> BTreeSet<CredentialName> {
    let mut required = BTreeSet::from([
        CredentialName::CarrierAccountId,
        CredentialName::CarrierAuthToken,
        CredentialName::AiServiceKey,
    ]);
    if template.voice.uses_speech_provider() {
        required.insert(CredentialName::SpeechServiceKey);
    }
    required
}

/// Runtime credentials loaded from the `.env` file.
#[derive(Clone, Default)]
pub struct Credentials {
    vars: BTreeMap<String, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("keys", &self.vars.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Build credentials from a key-value map.
    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    /// Returns a credential value for a key, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Returns the value for a named credential, if present and non-empty.
    pub fn value_of(&self, name: CredentialName) -> Option<&str> {
        self.vars
            .get(name.env_var())
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Partition a required set into present and missing names.
    ///
    /// Never fails: missing credentials are a normal result. Monotonic in
    /// the source — adding a secret can only move a name to `present`.
    pub fn check(&self, required: &BTreeSet<CredentialName>) -> CredentialCheck {
        let mut present = BTreeSet::new();
        let mut missing = BTreeSet::new();
        for name in required {
            if self.value_of(*name).is_some() {
                present.insert(*name);
            } else {
                missing.insert(*name);
            }
        }
        CredentialCheck { present, missing }
    }

    /// Returns all non-empty credential values for redaction purposes.
    pub fn known_secrets(&self) -> Vec<String> {
        self.vars
            .values()
            .filter(|value| !value.trim().is_empty())
            .cloned()
            .collect()
    }
}

/// Load credentials from a specific `.env` path.
///
/// # Errors
///
/// Returns an error if the file does not exist, permissions are too broad,
/// or parsing fails.
pub fn load_credentials(path: &Path) -> anyhow::Result<Credentials> {
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "credentials file does not exist: {}",
            path.display()
        ));
    }

    validate_private_permissions(path)?;

    let mut vars = BTreeMap::new();
    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("failed to read credentials at {}", path.display()))?;

    for item in iter {
        let (key, value) = item.with_context(|| {
            format!(
                "failed to parse key-value entry in credentials file {}",
                path.display()
            )
        })?;
        vars.insert(key, value);
    }

    Ok(Credentials { vars })
}

/// Load credentials from `~/.outdial/.env`.
///
/// # Errors
///
/// Returns an error when runtime paths cannot be resolved or the credentials
/// file is invalid.
pub fn load_default_credentials() -> anyhow::Result<Credentials> {
    let paths = runtime_paths()?;
    load_credentials(&paths.env_file)
}

/// Ensure a file exists and has private permissions when supported.
///
/// # Errors
///
/// Returns an error if metadata cannot be read or permissions cannot be updated.
pub fn enforce_private_file_permissions(path: &Path) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

#[cfg(unix)]
fn validate_private_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to inspect credentials file {}", path.display()))?;
    let mode = metadata.permissions().mode() & 0o777;

    if mode & 0o077 != 0 {
        return Err(anyhow::anyhow!(
            "credentials file {} must be 0600, found {:o}",
            path.display(),
            mode
        ));
    }

    Ok(())
}

#[cfg(not(unix))]
fn validate_private_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
