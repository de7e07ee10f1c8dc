//! Audio capture sources.
//!
//! Two interchangeable implementations of one capability, "produce an
//! utterance from live audio":
//! - [`MicRecorder`]: records raw microphone audio continuously and exposes
//!   a live energy probe; finalization is driven externally (endpoint
//!   detector or explicit user stop).
//! - [`RecognizerCapture`]: delegates segmentation to a platform
//!   recognition facility that emits one recognized-text result.
//!
//! The session controller depends only on the [`CaptureSource`] trait.

pub mod recognition;
pub mod recorder;

pub use recognition::{RecognizerCapture, SpeechRecognizer};
pub use recorder::MicRecorder;

use crate::error::{Result, VoiceError};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::mpsc;

/// One finalized unit of captured user speech.
///
/// Immutable: produced once by a capture source, consumed exactly once by
/// the agent gateway.
#[derive(Debug, Clone)]
pub enum Utterance {
    /// Container-encoded audio plus its MIME tag.
    Audio { bytes: Bytes, mime: String },
    /// Recognized transcript text.
    Text(String),
}

/// Events a capture source reports while active.
///
/// Only the native-recognition strategy emits these; the raw-audio
/// strategy is finalized externally and reports nothing on its own.
#[derive(Debug)]
pub enum CaptureEvent {
    /// The platform recognizer produced its single transcript.
    Recognized(String),
    /// Capture failed; the session returns to idle without a gateway call.
    Failed(VoiceError),
}

/// Shared handle onto the recorder's live band energy.
///
/// The recorder publishes a 0-255 spectral level per analysis window; the
/// endpoint detector polls it on its own cadence. Levels before the first
/// published sample are not meaningful; check [`EnergyProbe::samples_seen`].
#[derive(Clone, Default)]
pub struct EnergyProbe {
    inner: Arc<ProbeState>,
}

#[derive(Default)]
struct ProbeState {
    level_bits: AtomicU32,
    samples: AtomicU64,
}

impl EnergyProbe {
    /// Publish a new band energy reading.
    pub fn publish(&self, level: f32) {
        self.inner.level_bits.store(level.to_bits(), Ordering::Relaxed);
        self.inner.samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Latest published band energy (0-255 scale).
    pub fn level(&self) -> f32 {
        f32::from_bits(self.inner.level_bits.load(Ordering::Relaxed))
    }

    /// How many readings have been published so far.
    pub fn samples_seen(&self) -> u64 {
        self.inner.samples.load(Ordering::Relaxed)
    }
}

/// A source of user utterances from live audio.
///
/// Lifecycle per session cycle: `open` → `start` → (`stop` | `close`).
/// `close` must release the device on every exit path and is idempotent.
#[async_trait]
pub trait CaptureSource: Send {
    /// Acquire the exclusive input stream.
    ///
    /// # Errors
    ///
    /// Fails with [`VoiceError::DeviceUnavailable`] when no input device
    /// exists or access is denied.
    async fn open(&mut self) -> Result<()>;

    /// Begin accumulating audio or begin native recognition.
    ///
    /// Completion and failure of native recognition are reported as
    /// [`CaptureEvent`]s on `events`.
    async fn start(&mut self, events: mpsc::UnboundedSender<CaptureEvent>) -> Result<()>;

    /// Finalize the capture and return the accumulated utterance.
    ///
    /// Calling this while not capturing is a no-op returning `None`.
    fn stop(&mut self) -> Result<Option<Utterance>>;

    /// Release the device without producing an utterance. Idempotent.
    fn close(&mut self);

    /// Live energy probe for endpoint detection.
    ///
    /// `Some` only for the raw-audio strategy; the presence of a probe is
    /// what tells the controller to run the endpoint detector.
    fn energy_probe(&self) -> Option<EnergyProbe>;
}
