//! Session state machine types and controller.

mod controller;

pub use controller::SessionController;

use crate::capture::{CaptureEvent, Utterance};
use crate::config::CaptureStrategy;
use crate::error::VoiceError;
use crate::gateway::AgentReply;

/// One state of the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing in progress; initial, terminal, re-entrant.
    Idle,
    /// Capturing a user utterance; the only phase holding the microphone.
    Listening,
    /// One agent exchange in flight.
    Processing,
    /// Playing the reply audio; the only phase holding the output device.
    Speaking,
    /// Transient failure state; always followed by a return to Idle.
    Error,
}

/// The two user actions the controller accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    /// Start listening (ignored outside Idle).
    Start,
    /// Stop listening (ignored outside Listening).
    Stop,
}

/// The single live interaction, exclusively owned by the controller.
#[derive(Debug)]
pub struct Session {
    pub phase: Phase,
    pub strategy: CaptureStrategy,
    pub pending_utterance: Option<Utterance>,
    pub last_error: Option<String>,
}

impl Session {
    pub(crate) fn new(strategy: CaptureStrategy) -> Self {
        Self {
            phase: Phase::Idle,
            strategy,
            pending_utterance: None,
            last_error: None,
        }
    }
}

/// Internal completions delivered to the controller's event loop.
///
/// Every asynchronous collaborator reports back through one of these; the
/// controller dispatches on `(phase, input)`.
#[derive(Debug)]
pub(crate) enum SessionInput {
    /// The endpoint detector decided the utterance is complete.
    EndpointReached,
    /// The capture source reported a recognition result or failure.
    Capture(CaptureEvent),
    /// The agent exchange completed.
    ReplyReady(AgentReply),
    /// The agent exchange failed.
    GatewayFailed(VoiceError),
    /// Reply playback ended naturally.
    PlaybackFinished,
    /// Reply playback failed.
    PlaybackFailed(VoiceError),
}
