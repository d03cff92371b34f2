//! Outdial — operator-triggered outbound AI-voiced phone calls.
//!
//! A call is described by a reusable [`config::Template`] plus per-call
//! operator input. The [`request::CallRequestBuilder`] merges the two into a
//! validated [`request::CallRequest`]; the [`engine::OrchestrationEngine`]
//! then creates an Ultravox AI session, instructs Twilio to stream that
//! session's audio to the destination number, and tracks the call's
//! lifecycle and transcript in the [`history::CallHistoryStore`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod credentials;
pub mod engine;
pub mod history;
pub mod logging;
pub mod prompt;
pub mod providers;
pub mod request;
