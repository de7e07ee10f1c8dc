//! Error types for the voice session controller.

use std::fmt;

/// Why a platform speech recognizer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionReason {
    /// The recognizer heard nothing it could transcribe.
    NoSpeech,
    /// Microphone or recognition permission was denied.
    PermissionDenied,
    /// The recognition pass was cancelled before it produced a result.
    Aborted,
    /// Any other recognizer-reported failure.
    Other,
}

impl fmt::Display for RecognitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoSpeech => "no-speech",
            Self::PermissionDenied => "permission-denied",
            Self::Aborted => "aborted",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Top-level error type for the voice session controller.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// The input device could not be opened (missing device or denied access).
    #[error("input device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A capture finished without observing any usable speech.
    #[error("no speech detected")]
    NoSpeechDetected,

    /// The platform speech recognizer failed.
    #[error("recognition failed: {reason}")]
    Recognition { reason: RecognitionReason },

    /// Transport, protocol, or decoding failure at the agent boundary.
    #[error("gateway error: {cause}")]
    Gateway { cause: String },

    /// Reply audio could not be decoded or played.
    #[error("playback error: {0}")]
    Playback(String),

    /// Audio device or stream error outside the open/playback paths.
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VoiceError>;
