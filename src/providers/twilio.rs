//! Twilio client — places carrier calls whose audio streams to an AI session.
//!
//! The call is created with inline TwiML: a `<Connect><Stream>` pointing at
//! the session's join URL. Status callbacks posted by Twilio are parsed into
//! [`CarrierCallEvent`]s for the engine's inbound event intake.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::{
    check_http_response, map_transport_error, CarrierCall, CarrierCallEvent, CarrierCallStatus,
    TelephonyClient, UpstreamError,
};

/// Twilio REST API base.
pub const DEFAULT_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// HTTP connect timeout for the reqwest client.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP request timeout for normal operations.
const REQUEST_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// TwiML / callback parsing (pub for integration testing)
// ---------------------------------------------------------------------------

/// Render the TwiML that bridges a call's audio to a stream endpoint.
pub fn stream_twiml(stream_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect><Stream url="{}"/></Connect></Response>"#,
        escape_xml_attr(stream_url)
    )
}

fn escape_xml_attr(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl CarrierCallStatus {
    /// Map a Twilio call status string to a progress class.
    ///
    /// Returns `None` for unrecognized statuses so callers can log and
    /// drop them instead of failing the intake.
    pub fn from_carrier(status: &str) -> Option<Self> {
        match status {
            "queued" | "initiated" => Some(Self::Queued),
            "ringing" => Some(Self::Ringing),
            "in-progress" | "answered" => Some(Self::Answered),
            "completed" => Some(Self::Completed),
            "busy" => Some(Self::Busy),
            "no-answer" => Some(Self::NoAnswer),
            "failed" => Some(Self::Failed),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

/// Parse a form-encoded Twilio status callback body into an event.
///
/// Twilio posts `CallSid`, `CallStatus`, and assorted detail fields.
///
/// # Errors
///
/// Returns `UpstreamError::Parse` when `CallSid` or `CallStatus` is absent
/// or the status string is unrecognized.
pub fn parse_status_callback(body: &str) -> Result<CarrierCallEvent, UpstreamError> {
    let mut call_sid = None;
    let mut call_status = None;
    let mut error_code = None;
    for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
        match key.as_ref() {
            "CallSid" => call_sid = Some(value.into_owned()),
            "CallStatus" => call_status = Some(value.into_owned()),
            "ErrorCode" => error_code = Some(value.into_owned()),
            _ => {}
        }
    }

    let carrier_call_id = call_sid
        .filter(|s| !s.is_empty())
        .ok_or_else(|| UpstreamError::Parse("status callback missing CallSid".to_owned()))?;
    let raw_status = call_status
        .ok_or_else(|| UpstreamError::Parse("status callback missing CallStatus".to_owned()))?;
    let status = CarrierCallStatus::from_carrier(&raw_status).ok_or_else(|| {
        UpstreamError::Parse(format!("unrecognized carrier call status: {raw_status:?}"))
    })?;

    let detail = error_code.map(|code| format!("carrier error code {code}"));
    Ok(CarrierCallEvent {
        carrier_call_id,
        status,
        detail,
    })
}

/// Twilio call-creation response body (subset).
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct TwilioCallResponse {
    /// Carrier call identifier.
    pub sid: Option<String>,
}

/// Parse a call-creation response body into a carrier call handle.
///
/// # Errors
///
/// Returns `UpstreamError::Parse` when the body is not JSON or lacks a
/// call `sid`.
#[doc(hidden)]
pub fn parse_call_response(body: &str) -> Result<CarrierCall, UpstreamError> {
    let parsed: TwilioCallResponse = serde_json::from_str(body)
        .map_err(|e| UpstreamError::Parse(format!("call response: {e}")))?;
    let call_id = parsed
        .sid
        .filter(|s| !s.is_empty())
        .ok_or_else(|| UpstreamError::Parse("call response missing sid".to_owned()))?;
    Ok(CarrierCall { call_id })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for the Twilio calls API.
pub struct TwilioClient {
    client: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
}

impl std::fmt::Debug for TwilioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioClient")
            .field("base_url", &self.base_url)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .finish()
    }
}

impl TwilioClient {
    /// Create a client against the production Twilio API.
    pub fn new(account_sid: String, auth_token: String) -> Self {
        Self::with_base_url(account_sid, auth_token, DEFAULT_API_BASE.to_owned())
    }

    /// Create a client against an overridden base URL (used by tests).
    pub fn with_base_url(account_sid: String, auth_token: String, base_url: String) -> Self {
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
            account_sid,
            auth_token,
        }
    }

    fn calls_url(&self) -> String {
        format!("{}/Accounts/{}/Calls.json", self.base_url, self.account_sid)
    }
}

#[async_trait]
impl TelephonyClient for TwilioClient {
    async fn create_call(
        &self,
        to: &str,
        from: &str,
        stream_url: &str,
    ) -> Result<CarrierCall, UpstreamError> {
        let twiml = stream_twiml(stream_url);
        let params = [("To", to), ("From", from), ("Twiml", twiml.as_str())];
        let response = self
            .client
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(map_transport_error)?;
        let body = check_http_response(response).await?;
        parse_call_response(&body)
    }
}
