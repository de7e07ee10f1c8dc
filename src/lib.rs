//! Seva: client-side voice session controller for a remote conversational
//! service agent.
//!
//! One cycle of the session: Microphone → endpoint detection → agent
//! exchange → reply playback → back to idle.
//!
//! # Architecture
//!
//! Collaborators are independent pieces connected by async channels and
//! driven by one state machine:
//! - **Capture**: produces an utterance from live audio, either as raw
//!   recorded bytes (`cpal` + endpoint detection) or as recognized text
//!   from a platform facility
//! - **Endpoint detection**: decides when a raw-audio utterance has ended,
//!   from spectral band energy and a silence window
//! - **Session controller**: owns the session, sequences every transition,
//!   and always lands back in idle
//! - **Agent gateway**: one request/response exchange with the remote
//!   agent over HTTP
//! - **Playback**: decodes and plays the synthesized reply via `cpal`
//! - **Events**: broadcast stream for display sinks (status, transcript,
//!   reply, reasoning trace)

pub mod capture;
pub mod config;
mod dsp;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod gateway;
pub mod playback;
pub mod session;
pub mod trace;

pub use capture::{CaptureSource, Utterance};
pub use config::{CaptureStrategy, VoiceConfig};
pub use error::{Result, VoiceError};
pub use events::SessionEvent;
pub use gateway::{AgentGateway, AgentReply};
pub use session::{Phase, SessionController, UserCommand};
