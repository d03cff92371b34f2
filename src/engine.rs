//! Call orchestration — sequences the two upstream calls and owns every
//! history state transition.
//!
//! The synchronous flow ([`OrchestrationEngine::place_call`]) creates the
//! AI session, then instructs the carrier to stream it to the destination.
//! Asynchronous carrier callbacks and session polling reuse the same
//! transition discipline, so there is one transition function with two
//! callers. Upstream failures are terminal for the attempt: a retry is a
//! new operator-triggered call, never a hidden loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::history::{CallHistoryStore, CallState, HistoryError};
use crate::providers::{
    AiSessionClient, CarrierCallEvent, CarrierCallStatus, SessionSpec, TelephonyClient,
};
use crate::request::CallRequest;

/// Interval between AI session status polls.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on how long [`OrchestrationEngine::watch_session`] waits.
pub const DEFAULT_WATCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Result of the synchronous dial flow. The history entry always exists,
/// whichever state was reached.
#[derive(Debug, Clone)]
pub struct DialOutcome {
    /// History entry recording this attempt.
    pub entry_id: Uuid,
    /// State the entry reached: `InProgress` on success, `Failed` otherwise.
    pub state: CallState,
    /// AI session identifier, when session creation succeeded.
    pub session_id: Option<String>,
    /// Carrier call identifier, when dialing succeeded.
    pub carrier_call_id: Option<String>,
    /// Verbatim upstream error detail, when a step failed.
    pub error: Option<String>,
}

impl DialOutcome {
    /// Whether the call reached the carrier and is live.
    pub fn is_live(&self) -> bool {
        self.state == CallState::InProgress
    }
}

/// Result of watching an AI session for completion.
#[derive(Debug, Clone)]
pub struct WatchOutcome {
    /// Entry state after the watch.
    pub state: CallState,
    /// Whether a transcript was attached.
    pub transcript_available: bool,
    /// Whether the watch gave up before the session ended. The call may
    /// still be live; the entry's state is untouched in that case.
    pub timed_out: bool,
}

/// Sequences upstream calls for one attempt and applies lifecycle events.
pub struct OrchestrationEngine {
    sessions: Arc<dyn AiSessionClient>,
    carrier: Arc<dyn TelephonyClient>,
    history: Arc<CallHistoryStore>,
}

impl OrchestrationEngine {
    /// Create an engine over the two upstream clients and a history store.
    pub fn new(
        sessions: Arc<dyn AiSessionClient>,
        carrier: Arc<dyn TelephonyClient>,
        history: Arc<CallHistoryStore>,
    ) -> Self {
        Self {
            sessions,
            carrier,
            history,
        }
    }

    /// The history store this engine writes to.
    pub fn history(&self) -> &Arc<CallHistoryStore> {
        &self.history
    }

    /// Run the synchronous dial flow for a validated request.
    ///
    /// Appends a history entry, creates the AI session, then the carrier
    /// call. Either upstream failure records a terminal `Failed` entry with
    /// the upstream detail preserved verbatim; a failed dial additionally
    /// triggers a best-effort session teardown whose own outcome cannot
    /// change the already-recorded state.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] only on bookkeeping integrity bugs; upstream
    /// failures are reported inside the returned [`DialOutcome`].
    pub async fn place_call(&self, request: CallRequest) -> Result<DialOutcome, HistoryError> {
        let spec = SessionSpec::from_request(&request);
        let destination = request.destination.clone();
        let from_number = request.from_number.clone();
        let entry_id = self.history.append(request);
        self.history
            .update_state(entry_id, CallState::SessionCreating, None)?;
        info!(%entry_id, %destination, "creating AI call session");

        let handle = match self.sessions.create_session(&spec).await {
            Ok(handle) => handle,
            Err(e) => {
                let detail = e.to_string();
                warn!(%entry_id, error = %detail, "AI session creation failed");
                self.history
                    .update_state(entry_id, CallState::Failed, Some(detail.clone()))?;
                return Ok(DialOutcome {
                    entry_id,
                    state: CallState::Failed,
                    session_id: None,
                    carrier_call_id: None,
                    error: Some(detail),
                });
            }
        };

        self.history
            .set_session(entry_id, handle.session_id.clone(), handle.stream_url.clone())?;
        self.history
            .update_state(entry_id, CallState::SessionCreated, None)?;
        self.history
            .update_state(entry_id, CallState::CallDialing, None)?;
        info!(%entry_id, session_id = %handle.session_id, "dialing via carrier");

        let call = match self
            .carrier
            .create_call(&destination, &from_number, &handle.stream_url)
            .await
        {
            Ok(call) => call,
            Err(e) => {
                let detail = e.to_string();
                warn!(%entry_id, error = %detail, "carrier call creation failed");
                self.history
                    .update_state(entry_id, CallState::Failed, Some(detail.clone()))?;
                // Terminal state is already recorded; the teardown result
                // cannot change it.
                self.teardown_session(&handle.session_id).await;
                return Ok(DialOutcome {
                    entry_id,
                    state: CallState::Failed,
                    session_id: Some(handle.session_id),
                    carrier_call_id: None,
                    error: Some(detail),
                });
            }
        };

        self.history
            .set_carrier_call(entry_id, call.call_id.clone())?;
        self.history
            .update_state(entry_id, CallState::InProgress, None)?;
        info!(%entry_id, carrier_call_id = %call.call_id, "call in progress");

        Ok(DialOutcome {
            entry_id,
            state: CallState::InProgress,
            session_id: Some(handle.session_id),
            carrier_call_id: Some(call.call_id),
            error: None,
        })
    }

    /// Best-effort teardown of an orphaned AI session after a failed dial.
    async fn teardown_session(&self, session_id: &str) {
        match self.sessions.end_session(session_id).await {
            Ok(()) => debug!(session_id, "orphaned AI session torn down"),
            Err(e) => warn!(session_id, error = %e, "best-effort session teardown failed"),
        }
    }

    /// Apply an inbound carrier status event to its history entry.
    ///
    /// Events are matched by carrier call id; unknown ids are logged and
    /// dropped, since at-least-once delivery can outlive a process run.
    /// Progress-only statuses (queued/ringing) and stale non-terminal
    /// statuses arriving after a terminal state are no-ops. Duplicate
    /// terminal events are idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::InvalidTransition`] when the event demands a
    /// transition the state machine forbids.
    pub fn handle_carrier_event(
        &self,
        event: &CarrierCallEvent,
    ) -> Result<Option<CallState>, HistoryError> {
        let Some(entry_id) = self.history.find_by_carrier_call_id(&event.carrier_call_id) else {
            warn!(carrier_call_id = %event.carrier_call_id, "carrier event for unknown call, dropping");
            return Ok(None);
        };

        let Some(new_state) = map_carrier_status(event.status) else {
            debug!(%entry_id, status = ?event.status, "progress-only carrier event");
            return Ok(None);
        };

        if let Some(entry) = self.history.get(entry_id) {
            if entry.state.is_terminal() && !new_state.is_terminal() {
                debug!(%entry_id, status = ?event.status, "stale carrier event after terminal state");
                return Ok(None);
            }
        }

        let state = self
            .history
            .update_state(entry_id, new_state, event.detail.clone())?;
        info!(%entry_id, %state, "carrier event applied");
        Ok(Some(state))
    }

    /// Consume carrier events from a channel until it closes.
    ///
    /// Intake errors are integrity bugs; they are logged rather than
    /// stopping the intake, so one malformed delivery cannot wedge the
    /// channel.
    pub async fn run_event_intake(&self, mut events: mpsc::Receiver<CarrierCallEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle_carrier_event(&event) {
                warn!(carrier_call_id = %event.carrier_call_id, error = %e, "carrier event rejected");
            }
        }
        debug!("carrier event channel closed");
    }

    /// Watch an in-progress entry's AI session until it ends, then record
    /// the outcome and attach the transcript.
    ///
    /// Polls with a fixed interval up to `max_wait`. An end reason that
    /// reports an error maps to `Failed`, anything else to `Completed`.
    /// Poll failures are logged and retried; if the session has not ended
    /// within the bound the entry's state is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] when the entry is unknown, has no recorded
    /// session, or on a bookkeeping integrity bug.
    pub async fn watch_session(
        &self,
        entry_id: Uuid,
        max_wait: Duration,
    ) -> Result<WatchOutcome, HistoryError> {
        let entry = self.history.get(entry_id).ok_or(HistoryError::NotFound(entry_id))?;
        let Some(session_id) = entry.session_id else {
            // No session was ever created; nothing to watch.
            return Ok(WatchOutcome {
                state: entry.state,
                transcript_available: false,
                timed_out: false,
            });
        };

        let started = Instant::now();
        while started.elapsed() < max_wait {
            tokio::time::sleep(POLL_INTERVAL).await;

            let status = match self.sessions.session_status(&session_id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(%entry_id, error = %e, "session status poll failed, retrying");
                    continue;
                }
            };
            if !status.ended {
                debug!(%entry_id, "session still live");
                continue;
            }

            let end_reason = status.end_reason.clone();
            let final_state = classify_end_reason(end_reason.as_deref());
            let detail = match final_state {
                CallState::Failed => end_reason.clone(),
                _ => None,
            };
            // A carrier callback may have already recorded a terminal state;
            // in that case the poll result only contributes the transcript.
            let current = self
                .history
                .get(entry_id)
                .map(|e| e.state)
                .ok_or(HistoryError::NotFound(entry_id))?;
            let state = if current.is_terminal() {
                current
            } else {
                self.history.update_state(entry_id, final_state, detail)?
            };

            let transcript_available = match self.sessions.fetch_transcript(&session_id).await {
                Ok(lines) if !lines.is_empty() => {
                    self.history.set_transcript(entry_id, lines, end_reason)?;
                    true
                }
                Ok(_) => {
                    self.history.set_transcript(entry_id, Vec::new(), end_reason)?;
                    false
                }
                Err(e) => {
                    warn!(%entry_id, error = %e, "transcript fetch failed");
                    false
                }
            };

            info!(%entry_id, %state, transcript_available, "session ended");
            return Ok(WatchOutcome {
                state,
                transcript_available,
                timed_out: false,
            });
        }

        let state = self
            .history
            .get(entry_id)
            .map(|e| e.state)
            .ok_or(HistoryError::NotFound(entry_id))?;
        debug!(%entry_id, "watch expired before session ended");
        Ok(WatchOutcome {
            state,
            transcript_available: false,
            timed_out: true,
        })
    }
}

/// Map a carrier status class to the state it demands, if any.
///
/// Queued/ringing are progress noise, not transitions.
fn map_carrier_status(status: CarrierCallStatus) -> Option<CallState> {
    match status {
        CarrierCallStatus::Queued | CarrierCallStatus::Ringing => None,
        CarrierCallStatus::Answered => Some(CallState::InProgress),
        CarrierCallStatus::Completed => Some(CallState::Completed),
        CarrierCallStatus::Busy
        | CarrierCallStatus::NoAnswer
        | CarrierCallStatus::Failed
        | CarrierCallStatus::Canceled => Some(CallState::Failed),
    }
}

/// Map an AI session end reason to a terminal state.
fn classify_end_reason(reason: Option<&str>) -> CallState {
    match reason {
        Some(r) if r.to_ascii_lowercase().contains("error") => CallState::Failed,
        _ => CallState::Completed,
    }
}
