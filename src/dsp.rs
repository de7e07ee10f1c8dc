//! Small signal-processing helpers shared by capture and playback.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;

/// Lower edge of the dB window mapped onto the 0-255 energy scale.
const FLOOR_DB: f32 = -100.0;
/// Upper edge of the dB window mapped onto the 0-255 energy scale.
const CEIL_DB: f32 = -30.0;

/// Convert interleaved multi-channel audio to mono by averaging channels.
pub fn downmix_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Simple linear-interpolation resampler for mono audio.
///
/// Sufficient quality for speech in both directions this crate needs
/// (native rate → 16kHz capture, decoded reply → output rate).
pub fn resample_linear(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac
        } else {
            samples[idx.min(samples.len() - 1)] as f64
        };

        output.push(sample as f32);
    }

    output
}

/// Rolling spectral energy meter over a fixed-size sample window.
///
/// Feeds the endpoint detector: each full window is transformed with an
/// FFT, per-bin magnitudes are converted to dBFS and mapped onto a 0-255
/// scale over a -100..-30 dB range, and the mean across the band (bins
/// below Nyquist, DC excluded) is reported.
pub struct SpectrumMeter {
    fft: Arc<dyn Fft<f32>>,
    window: VecDeque<f32>,
    window_len: usize,
}

impl SpectrumMeter {
    /// Create a meter with the given analysis window length (power of two).
    pub fn new(window_len: usize) -> Self {
        let fft = FftPlanner::new().plan_fft_forward(window_len);
        Self {
            fft,
            window: VecDeque::with_capacity(window_len),
            window_len,
        }
    }

    /// Push captured samples; returns the current band energy once the
    /// analysis window has filled.
    pub fn push(&mut self, samples: &[f32]) -> Option<f32> {
        for &s in samples {
            if self.window.len() == self.window_len {
                self.window.pop_front();
            }
            self.window.push_back(s);
        }
        if self.window.len() < self.window_len {
            return None;
        }
        Some(self.band_energy())
    }

    fn band_energy(&self) -> f32 {
        let mut buf: Vec<Complex<f32>> = self
            .window
            .iter()
            .map(|&s| Complex::new(s, 0.0))
            .collect();
        self.fft.process(&mut buf);

        let band = &buf[1..self.window_len / 2];
        let sum: f32 = band
            .iter()
            .map(|c| scaled_magnitude(c.norm(), self.window_len))
            .sum();
        sum / band.len() as f32
    }
}

/// Map one FFT bin magnitude onto the 0-255 scale.
fn scaled_magnitude(magnitude: f32, window_len: usize) -> f32 {
    let amplitude = (2.0 * magnitude) / window_len as f32;
    let db = 20.0 * amplitude.max(1e-9).log10();
    ((db - FLOOR_DB) * (255.0 / (CEIL_DB - FLOOR_DB))).clamp(0.0, 255.0)
}
