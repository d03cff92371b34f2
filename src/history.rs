//! Append-only, in-memory record of call attempts and their lifecycle.
//!
//! Entries are created when orchestration begins and mutated only through
//! the store, which validates every state change against the call state
//! machine. A single interior lock serializes all mutation, so concurrent
//! flows can never interleave writes to the same entry. Persistence, if
//! any, is an external collaborator concern.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::providers::TranscriptLine;
use crate::request::CallRequest;

/// Error type for history bookkeeping. These indicate integrity bugs in
/// correct operation, not operator-actionable conditions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistoryError {
    /// No entry with the given identifier.
    #[error("call history entry not found: {0}")]
    NotFound(Uuid),
    /// The requested state is not reachable from the entry's current state.
    #[error("invalid call state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// State the entry is currently in.
        from: CallState,
        /// State that was requested.
        to: CallState,
    },
}

/// Lifecycle state of one call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    /// Entry created, nothing attempted yet.
    Pending,
    /// AI session creation in flight.
    SessionCreating,
    /// AI session exists; carrier not yet instructed.
    SessionCreated,
    /// Carrier call creation in flight.
    CallDialing,
    /// Carrier accepted the call; it is live or connecting.
    InProgress,
    /// Call ended normally. Terminal.
    Completed,
    /// A step failed or the carrier reported a failure class. Terminal.
    Failed,
}

impl CallState {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `next` is directly reachable from this state.
    ///
    /// Transitions are monotonic: no edge moves an entry backward and
    /// terminal states have no outgoing edges.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::SessionCreating)
                | (Self::SessionCreating, Self::SessionCreated)
                | (Self::SessionCreating, Self::Failed)
                | (Self::SessionCreated, Self::CallDialing)
                | (Self::SessionCreated, Self::Failed)
                | (Self::CallDialing, Self::InProgress)
                | (Self::CallDialing, Self::Failed)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
        )
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::SessionCreating => "session-creating",
            Self::SessionCreated => "session-created",
            Self::CallDialing => "dialing",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One record of a call attempt and its evolving state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallHistoryEntry {
    /// Entry identifier.
    pub id: Uuid,
    /// When orchestration began.
    pub created_at: DateTime<Utc>,
    /// The validated request this attempt was made with.
    pub request: CallRequest,
    /// Current lifecycle state.
    pub state: CallState,
    /// AI session identifier, once created.
    pub session_id: Option<String>,
    /// AI session stream endpoint, once created.
    pub stream_url: Option<String>,
    /// Carrier call identifier, once dialing.
    pub carrier_call_id: Option<String>,
    /// Verbatim upstream error detail, for failed attempts.
    pub error_detail: Option<String>,
    /// Upstream end reason, once the session ends.
    pub end_reason: Option<String>,
    /// Conversation transcript, once available.
    pub transcript: Option<Vec<TranscriptLine>>,
}

/// Append-only store of call history entries.
#[derive(Default)]
pub struct CallHistoryStore {
    inner: Mutex<Vec<CallHistoryEntry>>,
}

impl CallHistoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<CallHistoryEntry>> {
        // A poisoned lock only means another flow panicked mid-write;
        // the entry data itself is still the source of truth.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_entry<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut CallHistoryEntry) -> Result<T, HistoryError>,
    ) -> Result<T, HistoryError> {
        let mut entries = self.entries();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(HistoryError::NotFound(id))?;
        f(entry)
    }

    /// Append a new `Pending` entry for a call attempt; returns its id.
    pub fn append(&self, request: CallRequest) -> Uuid {
        let id = Uuid::new_v4();
        self.entries().push(CallHistoryEntry {
            id,
            created_at: Utc::now(),
            request,
            state: CallState::Pending,
            session_id: None,
            stream_url: None,
            carrier_call_id: None,
            error_detail: None,
            end_reason: None,
            transcript: None,
        });
        id
    }

    /// Transition an entry to a new state, recording optional detail.
    ///
    /// Requesting the state the entry is already in is an idempotent no-op
    /// that leaves existing detail unchanged — duplicate terminal events
    /// from an at-least-once channel land here.
    ///
    /// # Errors
    ///
    /// [`HistoryError::NotFound`] for an unknown id;
    /// [`HistoryError::InvalidTransition`] when the state machine has no
    /// edge from the current state to `new_state`.
    pub fn update_state(
        &self,
        id: Uuid,
        new_state: CallState,
        detail: Option<String>,
    ) -> Result<CallState, HistoryError> {
        self.with_entry(id, |entry| {
            if entry.state == new_state {
                return Ok(entry.state);
            }
            if !entry.state.can_transition_to(new_state) {
                return Err(HistoryError::InvalidTransition {
                    from: entry.state,
                    to: new_state,
                });
            }
            entry.state = new_state;
            if let Some(detail) = detail {
                entry.error_detail = Some(detail);
            }
            Ok(entry.state)
        })
    }

    /// Record the AI session captured for an entry.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NotFound`] for an unknown id.
    pub fn set_session(
        &self,
        id: Uuid,
        session_id: String,
        stream_url: String,
    ) -> Result<(), HistoryError> {
        self.with_entry(id, |entry| {
            entry.session_id = Some(session_id);
            entry.stream_url = Some(stream_url);
            Ok(())
        })
    }

    /// Record the carrier call identifier captured for an entry.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NotFound`] for an unknown id.
    pub fn set_carrier_call(&self, id: Uuid, carrier_call_id: String) -> Result<(), HistoryError> {
        self.with_entry(id, |entry| {
            entry.carrier_call_id = Some(carrier_call_id);
            Ok(())
        })
    }

    /// Attach a transcript and end reason. Does not change state — a
    /// transcript arriving after completion is metadata, not a transition.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NotFound`] for an unknown id.
    pub fn set_transcript(
        &self,
        id: Uuid,
        transcript: Vec<TranscriptLine>,
        end_reason: Option<String>,
    ) -> Result<(), HistoryError> {
        self.with_entry(id, |entry| {
            entry.transcript = Some(transcript);
            if end_reason.is_some() {
                entry.end_reason = end_reason;
            }
            Ok(())
        })
    }

    /// Fetch a snapshot of an entry by id.
    pub fn get(&self, id: Uuid) -> Option<CallHistoryEntry> {
        self.entries().iter().find(|e| e.id == id).cloned()
    }

    /// Find the entry owning a carrier call identifier.
    pub fn find_by_carrier_call_id(&self, carrier_call_id: &str) -> Option<Uuid> {
        self.entries()
            .iter()
            .find(|e| e.carrier_call_id.as_deref() == Some(carrier_call_id))
            .map(|e| e.id)
    }

    /// Find the entry owning an AI session identifier.
    pub fn find_by_session_id(&self, session_id: &str) -> Option<Uuid> {
        self.entries()
            .iter()
            .find(|e| e.session_id.as_deref() == Some(session_id))
            .map(|e| e.id)
    }

    /// Snapshot of all entries, most recent first.
    pub fn list(&self) -> Vec<CallHistoryEntry> {
        let mut snapshot: Vec<CallHistoryEntry> = self.entries().clone();
        snapshot.reverse();
        snapshot
    }

    /// Number of entries recorded.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether the store has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
