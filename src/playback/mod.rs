//! Reply audio playback via cpal.
//!
//! Decodes the agent's encoded reply into mono samples, resamples to the
//! configured output rate, and drains it through an exclusive output
//! stream. `play` resolves when playback ends naturally or fails with
//! [`VoiceError::Playback`].

use crate::config::AudioConfig;
use crate::dsp;
use crate::error::{Result, VoiceError};
use crate::gateway::EncodedAudio;
use async_trait::async_trait;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Condvar, Mutex};
use tracing::{error, info};

/// Plays one encoded audio blob to completion.
#[async_trait]
pub trait PlaybackDriver: Send {
    /// Decode and play, resolving when playback ends.
    ///
    /// # Errors
    ///
    /// Fails with [`VoiceError::Playback`] on decode or output failure.
    async fn play(&mut self, audio: EncodedAudio) -> Result<()>;
}

/// cpal-backed playback driver.
pub struct CpalPlayer {
    config: AudioConfig,
}

impl CpalPlayer {
    /// Create a player for the configured output device.
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| VoiceError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl PlaybackDriver for CpalPlayer {
    async fn play(&mut self, audio: EncodedAudio) -> Result<()> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || play_blocking(&config, &audio))
            .await
            .map_err(|e| VoiceError::Playback(format!("playback task failed: {e}")))?
    }
}

/// Signals the blocking caller once the output buffer has drained.
#[derive(Default)]
struct DrainSignal {
    done: Mutex<bool>,
    cv: Condvar,
}

impl DrainSignal {
    fn finish(&self) {
        if let Ok(mut done) = self.done.lock() {
            *done = true;
            self.cv.notify_all();
        }
    }

    fn wait(&self) {
        let Ok(mut done) = self.done.lock() else {
            return;
        };
        while !*done {
            match self.cv.wait(done) {
                Ok(guard) => done = guard,
                Err(_) => return,
            }
        }
    }
}

fn play_blocking(config: &AudioConfig, audio: &EncodedAudio) -> Result<()> {
    let (samples, src_rate) = decode_to_mono(audio)?;
    if samples.is_empty() {
        return Err(VoiceError::Playback("decoded no audio".into()));
    }

    let out_rate = config.output_sample_rate;
    let samples = if src_rate != out_rate {
        dsp::resample_linear(&samples, src_rate, out_rate)
    } else {
        samples
    };

    let host = cpal::default_host();
    let device = if let Some(ref name) = config.output_device {
        host.output_devices()
            .map_err(|e| VoiceError::Playback(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| VoiceError::Playback(format!("output device '{name}' not found")))?
    } else {
        host.default_output_device()
            .ok_or_else(|| VoiceError::Playback("no default output device".into()))?
    };

    let stream_config = StreamConfig {
        channels: 1,
        sample_rate: out_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        "playing {:.1}s reply audio",
        samples.len() as f32 / out_rate as f32
    );

    let signal = Arc::new(DrainSignal::default());
    let drained = Arc::clone(&signal);
    let failed = Arc::clone(&signal);
    let mut position = 0usize;

    let stream = device
        .build_output_stream(
            &stream_config,
            move |out: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                for slot in out.iter_mut() {
                    *slot = samples.get(position).copied().unwrap_or(0.0);
                    position = position.saturating_add(1);
                }
                if position >= samples.len() {
                    drained.finish();
                }
            },
            move |err| {
                error!("audio output stream error: {err}");
                failed.finish();
            },
            None,
        )
        .map_err(|e| VoiceError::Playback(format!("failed to build output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| VoiceError::Playback(format!("failed to start output stream: {e}")))?;

    signal.wait();
    drop(stream);
    Ok(())
}

/// Decode an encoded audio blob to mono f32 samples and its sample rate.
fn decode_to_mono(audio: &EncodedAudio) -> Result<(Vec<f32>, u32)> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let cursor = std::io::Cursor::new(audio.bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.mime_type(&audio.mime);
    if let Some(ext) = extension_for_mime(&audio.mime) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| VoiceError::Playback(format!("failed to probe reply audio: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| VoiceError::Playback("no audio track in reply".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| VoiceError::Playback("unknown reply sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| VoiceError::Playback(format!("failed to create decoder: {e}")))?;

    let mut out: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(VoiceError::Playback(format!("reply audio read error: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Skip corrupt frames; anything else aborts the playback.
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(VoiceError::Playback(format!("reply audio decode error: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let frames = decoded.frames() as u64;

        let buf = sample_buf.get_or_insert_with(|| SampleBuffer::<f32>::new(frames, spec));
        if buf.capacity() < (frames as usize).saturating_mul(channels) {
            *buf = SampleBuffer::<f32>::new(frames, spec);
        }
        buf.copy_interleaved_ref(decoded);

        if channels <= 1 {
            out.extend_from_slice(buf.samples());
        } else {
            for frame in buf.samples().chunks_exact(channels) {
                out.push(frame.iter().sum::<f32>() / channels as f32);
            }
        }
    }

    Ok((out, sample_rate))
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use bytes::Bytes;

    fn wav_blob(samples: &[f32], sample_rate: u32) -> EncodedAudio {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer
                    .write_sample((s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)
                    .unwrap();
            }
            writer.finalize().unwrap();
        }
        EncodedAudio {
            bytes: Bytes::from(cursor.into_inner()),
            mime: "audio/wav".to_owned(),
        }
    }

    #[test]
    fn decodes_wav_reply_to_mono() {
        let samples: Vec<f32> = (0..1_600)
            .map(|i| (i as f32 * 0.05).sin() * 0.5)
            .collect();
        let (decoded, rate) = decode_to_mono(&wav_blob(&samples, 16_000)).unwrap();

        assert_eq!(rate, 16_000);
        assert_eq!(decoded.len(), samples.len());
        // 16-bit quantization keeps samples close to the originals.
        for (a, b) in decoded.iter().zip(&samples) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let audio = EncodedAudio {
            bytes: Bytes::from_static(b"definitely not audio"),
            mime: "audio/mpeg".to_owned(),
        };
        assert!(matches!(
            decode_to_mono(&audio),
            Err(VoiceError::Playback(_))
        ));
    }

    #[test]
    fn mime_extension_mapping() {
        assert_eq!(extension_for_mime("audio/mpeg"), Some("mp3"));
        assert_eq!(extension_for_mime("audio/wav"), Some("wav"));
        assert_eq!(extension_for_mime("application/json"), None);
    }
}
