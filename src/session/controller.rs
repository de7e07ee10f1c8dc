//! The session controller: owns the [`Session`], reacts to user actions
//! and collaborator completions, and drives capture, the agent exchange,
//! and playback through one transition table.
//!
//! Single logical request at a time: a second start is ignored until the
//! cycle lands back in Idle. Every error is translated into a transition
//! plus a status line; the controller always returns to Idle.

use crate::capture::{CaptureEvent, CaptureSource, EnergyProbe, Utterance};
use crate::config::VoiceConfig;
use crate::endpoint::EndpointDetector;
use crate::error::{RecognitionReason, Result, VoiceError};
use crate::events::SessionEvent;
use crate::gateway::{AgentGateway, AgentReply, EncodedAudio, HttpAgentGateway};
use crate::playback::{CpalPlayer, PlaybackDriver};
use crate::session::{Phase, Session, SessionInput, UserCommand};
use crate::trace::classify_trace;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_SIZE: usize = 64;
const PLAYBACK_CHANNEL_SIZE: usize = 1;

const STATUS_READY_INITIAL: &str = "Ready to help.";
const STATUS_LISTENING: &str = "Listening...";
const STATUS_PROCESSING: &str = "Processing...";
const STATUS_SPEAKING: &str = "Speaking...";
const STATUS_DONE: &str = "Done.";
const STATUS_READY: &str = "Ready.";

/// Orchestrates one voice session.
pub struct SessionController {
    config: VoiceConfig,
    session: Session,
    capture: Box<dyn CaptureSource>,
    gateway: Arc<dyn AgentGateway>,
    playback: Option<Box<dyn PlaybackDriver>>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
    /// Cancellation handle for the endpoint detector of the current
    /// Listening phase; cancelled on every exit from Listening.
    listening_guard: Option<CancellationToken>,
}

impl SessionController {
    /// Create a controller over explicit collaborators.
    pub fn new(
        config: VoiceConfig,
        capture: Box<dyn CaptureSource>,
        gateway: Arc<dyn AgentGateway>,
        playback: Box<dyn PlaybackDriver>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let strategy = config.capture.strategy;
        Self {
            config,
            session: Session::new(strategy),
            capture,
            gateway,
            playback: Some(playback),
            events,
            cancel: CancellationToken::new(),
            listening_guard: None,
        }
    }

    /// Create a controller over the default device-backed stack.
    ///
    /// # Errors
    ///
    /// Fails when the configuration selects native recognition (a platform
    /// recognizer must be supplied through [`SessionController::new`]) or
    /// when the gateway client cannot be built.
    pub fn from_config(config: VoiceConfig) -> Result<Self> {
        if config.capture.strategy == crate::config::CaptureStrategy::NativeRecognition {
            return Err(VoiceError::Config(
                "native recognition requires a platform recognizer; construct the \
                 controller with an explicit capture source"
                    .into(),
            ));
        }
        let capture = Box::new(crate::capture::MicRecorder::new(&config.audio));
        let gateway: Arc<dyn AgentGateway> = Arc::new(HttpAgentGateway::new(&config.gateway)?);
        let playback = Box::new(CpalPlayer::new(&config.audio));
        Ok(Self::new(config, capture, gateway, playback))
    }

    /// Subscribe to the session's display event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Cancellation token that shuts the controller down.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the controller until the command channel closes or the
    /// cancellation token fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the playback stage cannot be started.
    pub async fn run(mut self, mut commands: mpsc::Receiver<UserCommand>) -> Result<()> {
        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<SessionInput>();
        let (capture_tx, capture_rx) = mpsc::unbounded_channel::<CaptureEvent>();
        spawn_capture_forwarder(capture_rx, input_tx.clone());

        let playback = self
            .playback
            .take()
            .ok_or_else(|| VoiceError::Channel("playback driver already taken".into()))?;
        let playback_tx = spawn_playback_stage(playback, input_tx.clone(), self.cancel.clone());

        self.emit(SessionEvent::Phase(Phase::Idle));
        self.emit_status(STATUS_READY_INITIAL);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                cmd = commands.recv() => {
                    match cmd {
                        Some(UserCommand::Start) => self.on_user_start(&capture_tx, &input_tx).await,
                        Some(UserCommand::Stop) => self.on_user_stop(&input_tx),
                        None => break,
                    }
                }
                input = input_rx.recv() => {
                    let Some(input) = input else { break };
                    self.on_input(input, &playback_tx, &input_tx).await;
                }
            }
        }

        info!("session controller shutting down");
        self.stop_listening_guard();
        self.capture.close();
        self.cancel.cancel();
        Ok(())
    }

    // -- User actions --

    async fn on_user_start(
        &mut self,
        capture_tx: &mpsc::UnboundedSender<CaptureEvent>,
        input_tx: &mpsc::UnboundedSender<SessionInput>,
    ) {
        if self.session.phase != Phase::Idle {
            debug!(phase = ?self.session.phase, "start ignored: session busy");
            return;
        }

        // New cycle: prior transcript/reply/trace display state is stale.
        self.emit(SessionEvent::Cleared);
        self.session.pending_utterance = None;
        self.session.last_error = None;

        if let Err(e) = self.capture.open().await {
            self.fail(e);
            return;
        }
        if let Err(e) = self.capture.start(capture_tx.clone()).await {
            self.capture.close();
            self.fail(e);
            return;
        }

        // A probe means finalization is ours to decide: run the detector.
        if let Some(probe) = self.capture.energy_probe() {
            self.spawn_endpoint_detector(probe, input_tx);
        }

        self.set_phase(Phase::Listening);
        self.emit_status(STATUS_LISTENING);
    }

    fn on_user_stop(&mut self, input_tx: &mpsc::UnboundedSender<SessionInput>) {
        if self.session.phase != Phase::Listening {
            debug!(phase = ?self.session.phase, "stop ignored: not listening");
            return;
        }
        self.finish_listening(input_tx);
    }

    // -- Internal completions --

    async fn on_input(
        &mut self,
        input: SessionInput,
        playback_tx: &mpsc::Sender<EncodedAudio>,
        input_tx: &mpsc::UnboundedSender<SessionInput>,
    ) {
        match (self.session.phase, input) {
            (Phase::Listening, SessionInput::EndpointReached) => {
                self.finish_listening(input_tx);
            }
            (Phase::Listening, SessionInput::Capture(CaptureEvent::Recognized(text))) => {
                self.stop_listening_guard();
                self.capture.close();
                self.begin_processing(Utterance::Text(text), input_tx);
            }
            (Phase::Listening, SessionInput::Capture(CaptureEvent::Failed(err))) => {
                self.stop_listening_guard();
                self.capture.close();
                self.fail(err);
            }
            (Phase::Processing, SessionInput::ReplyReady(reply)) => {
                self.session.pending_utterance = None;
                self.on_reply(reply, playback_tx).await;
            }
            (Phase::Processing, SessionInput::GatewayFailed(err)) => {
                self.session.pending_utterance = None;
                self.fail(err);
            }
            (Phase::Speaking, SessionInput::PlaybackFinished) => {
                self.set_phase(Phase::Idle);
                self.emit_status(STATUS_READY);
            }
            (Phase::Speaking, SessionInput::PlaybackFailed(err)) => {
                // The reply text has already been broadcast; only the audio
                // channel is lost.
                self.fail(err);
            }
            (phase, input) => {
                debug!(?phase, ?input, "ignoring stale completion");
            }
        }
    }

    async fn on_reply(&mut self, reply: AgentReply, playback_tx: &mpsc::Sender<EncodedAudio>) {
        if let Some(transcript) = &reply.transcript {
            self.emit(SessionEvent::Transcript(transcript.clone()));
        }
        self.emit(SessionEvent::Reply(reply.reply_text.clone()));
        if !reply.trace.is_empty() {
            self.emit(SessionEvent::Trace(classify_trace(reply.trace)));
        }

        match reply.reply_audio {
            Some(audio) => {
                self.set_phase(Phase::Speaking);
                self.emit_status(STATUS_SPEAKING);
                if playback_tx.send(audio).await.is_err() {
                    self.fail(VoiceError::Channel("playback stage unavailable".into()));
                }
            }
            None => {
                self.set_phase(Phase::Idle);
                self.emit_status(STATUS_DONE);
            }
        }
    }

    // -- Phase helpers --

    /// Leave Listening with whatever was captured: cancel the detector,
    /// finalize the take, release the device, and hand the utterance to
    /// the gateway.
    fn finish_listening(&mut self, input_tx: &mpsc::UnboundedSender<SessionInput>) {
        self.stop_listening_guard();
        let finalized = self.capture.stop();
        self.capture.close();

        match finalized {
            Err(e) => self.fail(e),
            Ok(None) => self.fail(VoiceError::NoSpeechDetected),
            Ok(Some(utterance)) => self.begin_processing(utterance, input_tx),
        }
    }

    fn begin_processing(
        &mut self,
        utterance: Utterance,
        input_tx: &mpsc::UnboundedSender<SessionInput>,
    ) {
        if let Utterance::Text(text) = &utterance {
            self.emit(SessionEvent::Transcript(text.clone()));
        }
        self.session.pending_utterance = Some(utterance.clone());
        self.set_phase(Phase::Processing);
        self.emit_status(STATUS_PROCESSING);

        let gateway = Arc::clone(&self.gateway);
        let tx = input_tx.clone();
        tokio::spawn(async move {
            let input = match gateway.send(utterance).await {
                Ok(reply) => SessionInput::ReplyReady(reply),
                Err(e) => SessionInput::GatewayFailed(e),
            };
            let _ = tx.send(input);
        });
    }

    fn spawn_endpoint_detector(
        &mut self,
        probe: EnergyProbe,
        input_tx: &mpsc::UnboundedSender<SessionInput>,
    ) {
        let guard = self.cancel.child_token();
        let detector = EndpointDetector::new(&self.config.endpoint, probe);
        let tx = input_tx.clone();
        let task_guard = guard.clone();
        tokio::spawn(async move {
            if detector.run(task_guard).await {
                let _ = tx.send(SessionInput::EndpointReached);
            }
        });
        self.listening_guard = Some(guard);
    }

    fn stop_listening_guard(&mut self) {
        if let Some(guard) = self.listening_guard.take() {
            guard.cancel();
        }
    }

    /// Surface an error and land back in Idle.
    fn fail(&mut self, err: VoiceError) {
        warn!("session error: {err}");
        self.session.last_error = Some(err.to_string());
        self.set_phase(Phase::Error);
        self.emit_status(&status_for(&err));
        self.set_phase(Phase::Idle);
    }

    fn set_phase(&mut self, phase: Phase) {
        self.session.phase = phase;
        self.emit(SessionEvent::Phase(phase));
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; sinks are optional observers.
        let _ = self.events.send(event);
    }

    fn emit_status(&self, status: &str) {
        self.emit(SessionEvent::Status(status.to_owned()));
    }
}

/// Map an error to its user-facing status line. Each capture failure kind
/// gets a distinct message; gateway causes are deliberately collapsed.
fn status_for(err: &VoiceError) -> String {
    let status = match err {
        VoiceError::DeviceUnavailable(_) => "Microphone unavailable.",
        VoiceError::NoSpeechDetected => "No speech detected. Try again.",
        VoiceError::Recognition { reason } => match reason {
            RecognitionReason::NoSpeech => "No speech detected. Try again.",
            RecognitionReason::PermissionDenied => "Microphone access denied.",
            RecognitionReason::Aborted => "Recognition aborted.",
            RecognitionReason::Other => "Recognition failed. Try again.",
        },
        VoiceError::Gateway { .. } => "Agent request failed. Try again.",
        VoiceError::Playback(_) => "Playback failed.",
        _ => "Something went wrong. Try again.",
    };
    status.to_owned()
}

/// Forward capture events into the controller's input channel.
fn spawn_capture_forwarder(
    mut rx: mpsc::UnboundedReceiver<CaptureEvent>,
    input_tx: mpsc::UnboundedSender<SessionInput>,
) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if input_tx.send(SessionInput::Capture(event)).is_err() {
                break;
            }
        }
    });
}

/// Run the playback driver on its own task. The controller only ever has
/// one playback in flight, so a capacity-1 channel never blocks it.
fn spawn_playback_stage(
    mut driver: Box<dyn PlaybackDriver>,
    input_tx: mpsc::UnboundedSender<SessionInput>,
    cancel: CancellationToken,
) -> mpsc::Sender<EncodedAudio> {
    let (tx, mut rx) = mpsc::channel::<EncodedAudio>(PLAYBACK_CHANNEL_SIZE);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                item = rx.recv() => {
                    let Some(audio) = item else { break };
                    let input = match driver.play(audio).await {
                        Ok(()) => SessionInput::PlaybackFinished,
                        Err(e) => SessionInput::PlaybackFailed(e),
                    };
                    if input_tx.send(input).is_err() {
                        break;
                    }
                }
            }
        }
    });
    tx
}
