//! Raw microphone capture via cpal.
//!
//! Records at the device's native configuration, downmixes to mono and
//! downsamples to the configured input rate, and publishes spectral band
//! energy for the endpoint detector. `stop()` finalizes the take as a
//! 16-bit PCM WAV blob.

use crate::capture::{CaptureEvent, CaptureSource, EnergyProbe, Utterance};
use crate::config::AudioConfig;
use crate::dsp::{self, SpectrumMeter};
use crate::error::{Result, VoiceError};
use async_trait::async_trait;
use bytes::Bytes;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// MIME tag attached to finalized recordings.
const WAV_MIME: &str = "audio/wav";

/// Raw-audio capture source backed by the system microphone.
pub struct MicRecorder {
    config: AudioConfig,
    device: Option<cpal::Device>,
    stream_config: Option<StreamConfig>,
    probe: EnergyProbe,
    buffer: Arc<Mutex<Vec<f32>>>,
    worker: Option<Worker>,
}

struct Worker {
    stop_tx: std::sync::mpsc::Sender<()>,
    handle: std::thread::JoinHandle<()>,
}

impl MicRecorder {
    /// Create a recorder for the configured input device.
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
            device: None,
            stream_config: None,
            probe: EnergyProbe::default(),
            buffer: Arc::new(Mutex::new(Vec::new())),
            worker: None,
        }
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| VoiceError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            // The worker parks on the stop channel and exits promptly.
            let _ = worker.handle.join();
        }
    }
}

#[async_trait]
impl CaptureSource for MicRecorder {
    async fn open(&mut self) -> Result<()> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = self.config.input_device {
            host.input_devices()
                .map_err(|e| VoiceError::DeviceUnavailable(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    VoiceError::DeviceUnavailable(format!("input device '{name}' not found"))
                })?
        } else {
            host.default_input_device()
                .ok_or_else(|| VoiceError::DeviceUnavailable("no default input device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());

        // Use the device's default config for best compatibility and
        // downsample in software.
        let default_config = device.default_input_config().map_err(|e| {
            VoiceError::DeviceUnavailable(format!("no default input config: {e}"))
        })?;

        let stream_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        info!(
            "opened input device '{device_name}': {}Hz, {} channels",
            stream_config.sample_rate, stream_config.channels
        );

        self.device = Some(device);
        self.stream_config = Some(stream_config);
        Ok(())
    }

    async fn start(&mut self, _events: mpsc::UnboundedSender<CaptureEvent>) -> Result<()> {
        if self.worker.is_some() {
            return Err(VoiceError::Audio("capture already running".into()));
        }
        let device = self
            .device
            .take()
            .ok_or_else(|| VoiceError::Audio("capture source not opened".into()))?;
        let stream_config = self
            .stream_config
            .clone()
            .ok_or_else(|| VoiceError::Audio("capture source not opened".into()))?;

        // Fresh take: new buffer and a new probe so stale energy readings
        // from a previous cycle can never satisfy the endpoint detector.
        self.buffer = Arc::new(Mutex::new(Vec::new()));
        self.probe = EnergyProbe::default();

        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        let buffer = Arc::clone(&self.buffer);
        let probe = self.probe.clone();
        let target_rate = self.config.input_sample_rate;
        let window_len = self.config.analysis_window;

        let handle = std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                capture_worker(
                    device,
                    stream_config,
                    target_rate,
                    window_len,
                    buffer,
                    probe,
                    ready_tx,
                    &stop_rx,
                );
            })
            .map_err(|e| VoiceError::Audio(format!("failed to spawn capture worker: {e}")))?;

        self.worker = Some(Worker { stop_tx, handle });

        match ready_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.join_worker();
                Err(e)
            }
            Err(_) => {
                self.join_worker();
                Err(VoiceError::Audio("capture worker exited before starting".into()))
            }
        }
    }

    fn stop(&mut self) -> Result<Option<Utterance>> {
        if self.worker.is_none() {
            return Ok(None);
        }
        self.join_worker();
        self.device = None;

        let samples = match self.buffer.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(_) => return Err(VoiceError::Audio("capture buffer poisoned".into())),
        };
        if samples.is_empty() {
            debug!("capture finalized with no samples");
            return Ok(None);
        }

        let seconds = samples.len() as f32 / self.config.input_sample_rate as f32;
        info!("finalized {seconds:.1}s recording");

        let bytes = encode_wav(&samples, self.config.input_sample_rate)?;
        Ok(Some(Utterance::Audio {
            bytes: Bytes::from(bytes),
            mime: WAV_MIME.to_owned(),
        }))
    }

    fn close(&mut self) {
        self.join_worker();
        self.device = None;
        self.stream_config = None;
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }

    fn energy_probe(&self) -> Option<EnergyProbe> {
        Some(self.probe.clone())
    }
}

/// Owns the cpal stream for the duration of one take.
///
/// The stream is `!Send`, so it lives on this dedicated thread; the thread
/// parks on the stop channel and drops the stream when signalled.
#[allow(clippy::too_many_arguments)]
fn capture_worker(
    device: cpal::Device,
    stream_config: StreamConfig,
    target_rate: u32,
    window_len: usize,
    buffer: Arc<Mutex<Vec<f32>>>,
    probe: EnergyProbe,
    ready_tx: tokio::sync::oneshot::Sender<Result<()>>,
    stop_rx: &std::sync::mpsc::Receiver<()>,
) {
    let native_rate = stream_config.sample_rate;
    let native_channels = stream_config.channels;
    let mut meter = SpectrumMeter::new(window_len);

    let stream = match device.build_input_stream(
        &stream_config,
        move |data: &[f32], _info: &cpal::InputCallbackInfo| {
            let mono = if native_channels > 1 {
                dsp::downmix_mono(data, native_channels)
            } else {
                data.to_vec()
            };
            let samples = if native_rate != target_rate {
                dsp::resample_linear(&mono, native_rate, target_rate)
            } else {
                mono
            };

            if let Some(level) = meter.push(&samples) {
                probe.publish(level);
            }
            if let Ok(mut buf) = buffer.lock() {
                buf.extend_from_slice(&samples);
            }
        },
        move |err| {
            error!("audio input stream error: {err}");
        },
        None,
    ) {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(VoiceError::Audio(format!(
                "failed to build input stream: {e}"
            ))));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(VoiceError::Audio(format!(
            "failed to start input stream: {e}"
        ))));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Park until stop is requested (or the recorder is dropped).
    let _ = stop_rx.recv();
    drop(stream);
}

/// Encode mono f32 samples as a 16-bit PCM WAV blob.
fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| VoiceError::Audio(format!("WAV encode failed: {e}")))?;
        for &s in samples {
            let value = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            writer
                .write_sample(value)
                .map_err(|e| VoiceError::Audio(format!("WAV encode failed: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| VoiceError::Audio(format!("WAV encode failed: {e}")))?;
    }
    Ok(cursor.into_inner())
}
