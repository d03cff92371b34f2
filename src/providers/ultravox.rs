//! Ultravox client — AI call sessions over the `/api/calls` REST API.
//!
//! A created call carries the rendered system prompt, model settings, and
//! voice selection, and is marked `medium: twilio` so Ultravox returns a
//! `joinUrl` the carrier can stream call audio to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::config::VoiceSelection;

use super::{
    check_http_response, map_transport_error, AiSessionClient, SessionHandle, SessionSpec,
    SessionStatus, TranscriptLine, TranscriptRole, UpstreamError,
};

/// Default API endpoint for call creation.
pub const DEFAULT_API_URL: &str = "https://api.ultravox.ai/api/calls";

/// HTTP connect timeout for the reqwest client.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP request timeout for normal operations.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Prefix Ultravox puts on transcript message roles.
const ROLE_PREFIX: &str = "MESSAGE_ROLE_";

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Ultravox call-creation request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UltravoxCallRequest {
    /// Rendered system prompt.
    pub system_prompt: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Who speaks first; the customer, for outbound calls.
    pub first_speaker_settings: Value,
    /// Call medium; always the carrier bridge.
    pub medium: Value,
    /// Built-in voice name, absent when an external voice is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// External voice routing (ElevenLabs), absent for built-in voices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_voice: Option<Value>,
}

/// Ultravox call-creation response body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UltravoxCallResponse {
    /// Stream endpoint for the carrier.
    pub join_url: Option<String>,
    /// Session identifier.
    pub call_id: Option<String>,
}

/// Ultravox call status response body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UltravoxCallStatus {
    /// Whether the call has ended.
    #[serde(default)]
    pub ended: bool,
    /// End reason, once ended.
    pub end_reason: Option<String>,
}

/// Ultravox transcript messages response body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct UltravoxMessages {
    /// Message rows.
    #[serde(default)]
    pub results: Vec<UltravoxMessage>,
}

/// A single transcript message row.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct UltravoxMessage {
    /// Role string, e.g. `MESSAGE_ROLE_AGENT`.
    pub role: Option<String>,
    /// Spoken text.
    pub text: Option<String>,
}

// ---------------------------------------------------------------------------
// Request / Response builders (pub for integration testing)
// ---------------------------------------------------------------------------

/// Build an Ultravox call-creation body from a session spec.
#[doc(hidden)]
pub fn build_call_request(spec: &SessionSpec) -> UltravoxCallRequest {
    let (voice, external_voice) = match &spec.voice {
        VoiceSelection::BuiltIn { voice } => (Some(voice.clone()), None),
        VoiceSelection::ElevenLabs { voice_id, model } => (
            None,
            Some(json!({
                "elevenLabs": {
                    "voiceId": voice_id,
                    "model": model,
                }
            })),
        ),
    };

    UltravoxCallRequest {
        system_prompt: spec.prompt.clone(),
        model: spec.model.clone(),
        temperature: spec.temperature,
        first_speaker_settings: json!({ "user": {} }),
        medium: json!({ "twilio": {} }),
        voice,
        external_voice,
    }
}

/// Parse a call-creation response body into a session handle.
///
/// # Errors
///
/// Returns `UpstreamError::Parse` when the body is not JSON or lacks a
/// `joinUrl` or `callId`.
#[doc(hidden)]
pub fn parse_call_response(body: &str) -> Result<SessionHandle, UpstreamError> {
    let parsed: UltravoxCallResponse = serde_json::from_str(body)
        .map_err(|e| UpstreamError::Parse(format!("call response: {e}")))?;
    let stream_url = parsed
        .join_url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| UpstreamError::Parse("call response missing joinUrl".to_owned()))?;
    let session_id = parsed
        .call_id
        .filter(|c| !c.is_empty())
        .ok_or_else(|| UpstreamError::Parse("call response missing callId".to_owned()))?;
    Ok(SessionHandle {
        session_id,
        stream_url,
    })
}

/// Parse a transcript messages body into transcript lines.
///
/// Keeps only agent/customer rows with non-empty text; system and tool
/// rows are dropped.
///
/// # Errors
///
/// Returns `UpstreamError::Parse` when the body is not valid JSON.
#[doc(hidden)]
pub fn parse_transcript(body: &str) -> Result<Vec<TranscriptLine>, UpstreamError> {
    let parsed: UltravoxMessages = serde_json::from_str(body)
        .map_err(|e| UpstreamError::Parse(format!("messages response: {e}")))?;

    let lines = parsed
        .results
        .into_iter()
        .filter_map(|message| {
            let text = message.text.filter(|t| !t.is_empty())?;
            let role = message.role?;
            let role = match role.strip_prefix(ROLE_PREFIX).unwrap_or(&role) {
                "AGENT" => TranscriptRole::Agent,
                "USER" => TranscriptRole::Customer,
                _ => return None,
            };
            Some(TranscriptLine { role, text })
        })
        .collect();
    Ok(lines)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for the Ultravox call API.
pub struct UltravoxClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for UltravoxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UltravoxClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl UltravoxClient {
    /// Create a client against the default API endpoint.
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_API_URL.to_owned())
    }

    /// Create a client against an overridden base URL.
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
        }
    }

    fn session_url(&self, session_id: &str) -> String {
        format!("{}/{session_id}", self.base_url)
    }
}

#[async_trait]
impl AiSessionClient for UltravoxClient {
    async fn create_session(&self, spec: &SessionSpec) -> Result<SessionHandle, UpstreamError> {
        let body = build_call_request(spec);
        let response = self
            .client
            .post(&self.base_url)
            .header("X-API-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;
        let body = check_http_response(response).await?;
        parse_call_response(&body)
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, UpstreamError> {
        let response = self
            .client
            .get(self.session_url(session_id))
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;
        let body = check_http_response(response).await?;
        let parsed: UltravoxCallStatus = serde_json::from_str(&body)
            .map_err(|e| UpstreamError::Parse(format!("status response: {e}")))?;
        Ok(SessionStatus {
            ended: parsed.ended,
            end_reason: parsed.end_reason,
        })
    }

    async fn fetch_transcript(
        &self,
        session_id: &str,
    ) -> Result<Vec<TranscriptLine>, UpstreamError> {
        let url = format!("{}/messages", self.session_url(session_id));
        let response = self
            .client
            .get(url)
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;
        let body = check_http_response(response).await?;
        parse_transcript(&body)
    }

    async fn end_session(&self, session_id: &str) -> Result<(), UpstreamError> {
        let response = self
            .client
            .delete(self.session_url(session_id))
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;
        check_http_response(response).await?;
        Ok(())
    }
}
