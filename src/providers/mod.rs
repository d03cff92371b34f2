//! Upstream service abstraction layer.
//!
//! Defines the [`AiSessionClient`] and [`TelephonyClient`] traits and the
//! shared request/response types used by the concrete implementations:
//!
//! - [`ultravox::UltravoxClient`] — conversational-AI call sessions
//! - [`twilio::TwilioClient`] — the telephony carrier
//!
//! The orchestration engine only sees these traits, so tests drive it with
//! mock clients and no network.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::VoiceSelection;

pub mod twilio;
pub mod ultravox;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// What the AI call service needs to open a session.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    /// Fully rendered system prompt.
    pub prompt: String,
    /// AI model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Voice for the AI side of the call.
    pub voice: VoiceSelection,
}

impl SessionSpec {
    /// Build a session spec from a validated call request.
    pub fn from_request(request: &crate::request::CallRequest) -> Self {
        Self {
            prompt: request.prompt.clone(),
            model: request.model.clone(),
            temperature: request.temperature,
            voice: request.voice.clone(),
        }
    }
}

/// A created AI session: its identifier and audio streaming endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Upstream session identifier.
    pub session_id: String,
    /// WebSocket/stream URL the carrier connects the call audio to.
    pub stream_url: String,
}

/// Lifecycle snapshot of an AI session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    /// Whether the session has ended.
    pub ended: bool,
    /// Upstream end reason, verbatim, once ended.
    pub end_reason: Option<String>,
}

/// Who spoke a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranscriptRole {
    /// The AI agent.
    Agent,
    /// The called customer.
    Customer,
}

/// One line of the call transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    /// Speaker of this line.
    pub role: TranscriptRole,
    /// Spoken text.
    pub text: String,
}

/// A call created at the carrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierCall {
    /// Carrier-assigned call identifier.
    pub call_id: String,
}

/// Call progress classes reported by the carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarrierCallStatus {
    /// Accepted by the carrier, not yet dialing.
    Queued,
    /// Destination is ringing.
    Ringing,
    /// Call was answered and is live.
    Answered,
    /// Call ended normally.
    Completed,
    /// Destination was busy.
    Busy,
    /// Destination did not answer.
    NoAnswer,
    /// Carrier-side failure.
    Failed,
    /// Call was canceled before connecting.
    Canceled,
}

/// An inbound status event from the carrier, keyed by its call identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierCallEvent {
    /// Carrier call identifier this event belongs to.
    pub carrier_call_id: String,
    /// Reported progress class.
    pub status: CarrierCallStatus,
    /// Verbatim extra detail from the carrier, if any.
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by upstream service clients.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// HTTP transport failure.
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response did not match expected schema.
    #[error("upstream response parse error: {0}")]
    Parse(String),
    /// Upstream service responded with an error status.
    #[error("upstream returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Raw response body, sanitized and truncated.
        body: String,
    },
    /// The request exceeded its bounded timeout.
    #[error("upstream request timed out: {0}")]
    Timeout(String),
    /// Client cannot satisfy the request with current configuration.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}

/// Map a transport error, surfacing timeouts as their own class.
pub(crate) fn map_transport_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout(e.to_string())
    } else {
        UpstreamError::Request(e)
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers (shared by both clients)
// ---------------------------------------------------------------------------

/// Check HTTP response status and return body text or a structured error.
///
/// # Errors
///
/// Returns `UpstreamError::Request`/`Timeout` on transport failure,
/// `UpstreamError::HttpStatus` on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, UpstreamError> {
    let status = response.status();
    let body = response.text().await.map_err(map_transport_error)?;
    if !status.is_success() {
        return Err(UpstreamError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [
        r"sk_[A-Za-z0-9]{20,}",
        r"SK[a-f0-9]{32}",
        r"Bearer [A-Za-z0-9._\-]{16,}",
        r"X-API-Key: ?[A-Za-z0-9._\-]{16,}",
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 512;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Conversational-AI call service interface.
///
/// All implementations must be `Send + Sync` for use across async task
/// boundaries in the orchestration engine.
#[async_trait]
pub trait AiSessionClient: Send + Sync {
    /// Create a call session and return its identifier and stream endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on API, network, timeout, or parse failure.
    async fn create_session(&self, spec: &SessionSpec) -> Result<SessionHandle, UpstreamError>;

    /// Fetch the session's lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on API, network, timeout, or parse failure.
    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, UpstreamError>;

    /// Fetch the conversation transcript for an ended session.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on API, network, timeout, or parse failure.
    async fn fetch_transcript(
        &self,
        session_id: &str,
    ) -> Result<Vec<TranscriptLine>, UpstreamError>;

    /// Tear down a session. Used best-effort after a failed dial.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on API, network, or timeout failure.
    async fn end_session(&self, session_id: &str) -> Result<(), UpstreamError>;
}

/// Telephony carrier interface.
#[async_trait]
pub trait TelephonyClient: Send + Sync {
    /// Place a call from `from` to `to`, streaming its audio to
    /// `stream_url`.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on API, network, timeout, or parse failure.
    async fn create_call(
        &self,
        to: &str,
        from: &str,
        stream_url: &str,
    ) -> Result<CarrierCall, UpstreamError>;
}
