//! Session events emitted for display sinks.
//!
//! Sinks (trace viewers, conversation displays, consoles) subscribe to a
//! broadcast stream and observe every transition; nothing flows back into
//! the controller through this channel.

use crate::session::Phase;
use crate::trace::TraceStep;

/// What the session is doing "right now", for display only.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session entered a new phase.
    Phase(Phase),
    /// Human-readable status line for the current phase or error.
    Status(String),
    /// A new cycle started; prior transcript/reply/trace display state is
    /// stale and should be dropped.
    Cleared,
    /// The finalized user utterance transcript.
    Transcript(String),
    /// The agent's reply text.
    Reply(String),
    /// Classified agent reasoning trace.
    Trace(Vec<TraceStep>),
}
