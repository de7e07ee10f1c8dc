//! Native-recognition capture strategy.
//!
//! Segmentation is delegated to a platform recognition facility behind the
//! [`SpeechRecognizer`] trait: the facility listens, decides on its own
//! when the utterance has ended, and produces exactly one transcript (or a
//! failure). This crate ships the boundary, not an engine; offline
//! recognition is out of scope.

use crate::capture::{CaptureEvent, CaptureSource, EnergyProbe, Utterance};
use crate::config::CaptureConfig;
use crate::error::{Result, VoiceError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A platform facility that recognizes one utterance per pass.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Listen for a single utterance and return its transcript.
    ///
    /// Implementations observe `cancel` and fail with
    /// [`VoiceError::Recognition`] (reason `Aborted`) once it fires.
    ///
    /// # Errors
    ///
    /// [`VoiceError::Recognition`] for facility-reported failures, or
    /// [`VoiceError::NoSpeechDetected`] when no audio energy was observed
    /// before the facility's timeout.
    async fn recognize(
        self: Arc<Self>,
        language: String,
        cancel: CancellationToken,
    ) -> Result<String>;
}

/// Capture source that wraps a [`SpeechRecognizer`].
pub struct RecognizerCapture {
    recognizer: Arc<dyn SpeechRecognizer>,
    language: String,
    active: Option<CancellationToken>,
}

impl RecognizerCapture {
    /// Wrap a platform recognizer with the configured language tag.
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, config: &CaptureConfig) -> Self {
        Self {
            recognizer,
            language: config.language.clone(),
            active: None,
        }
    }
}

#[async_trait]
impl CaptureSource for RecognizerCapture {
    async fn open(&mut self) -> Result<()> {
        // The platform facility owns device acquisition; permission
        // failures surface as recognition events once started.
        Ok(())
    }

    async fn start(&mut self, events: mpsc::UnboundedSender<CaptureEvent>) -> Result<()> {
        if self.active.is_some() {
            return Err(VoiceError::Audio("recognition already running".into()));
        }

        let cancel = CancellationToken::new();
        self.active = Some(cancel.clone());

        let recognizer = Arc::clone(&self.recognizer);
        let language = self.language.clone();
        tokio::spawn(async move {
            let event = match recognizer.recognize(language, cancel).await {
                Ok(text) if text.trim().is_empty() => {
                    CaptureEvent::Failed(VoiceError::NoSpeechDetected)
                }
                Ok(text) => CaptureEvent::Recognized(text),
                Err(e) => CaptureEvent::Failed(e),
            };
            if events.send(event).is_err() {
                debug!("recognition finished after session shut down");
            }
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<Option<Utterance>> {
        // Nothing is accumulated on this strategy; an explicit stop before
        // the facility reports simply abandons the pass.
        if let Some(active) = self.active.take() {
            active.cancel();
        }
        Ok(None)
    }

    fn close(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel();
        }
    }

    fn energy_probe(&self) -> Option<EnergyProbe> {
        None
    }
}
