//! Per-frame feature extraction.
//!
//! Stateless measurements taken from one mono frame:
//! - RMS loudness
//! - onset strength (transient proxy that also reacts to bass hits)
//! - low / mid / high spectral energy split
//!
//! FFT resources are kept in [`SpectrumAnalyzer`] so the per-frame path does
//! not re-plan; the free functions build a throwaway analyzer.

use moodlight_api::{PitchRegister, SpectralBands};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ConfigError;

/// Guards square roots and divisions on silent input
pub const EPSILON: f32 = 1e-12;

/// Register boundaries in Hz: [20, 250), [250, 2000), [2000, 8000)
const BAND_EDGES: [f32; 4] = [20.0, 250.0, 2000.0, 8000.0];

/// Weight of the RMS term inside onset strength
const ONSET_RMS_WEIGHT: f32 = 0.6;

/// Maps raw onset strength onto 0-1
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    /// Raw onset strength mapped to 0
    pub floor: f32,
    /// Raw onset strength mapped to 1
    pub ceiling: f32,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            floor: 0.032,
            ceiling: 0.045,
        }
    }
}

impl OnsetConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ceiling > self.floor) {
            return Err(ConfigError::invalid(
                "onset.ceiling",
                format!("must exceed floor ({})", self.floor),
            ));
        }
        Ok(())
    }
}

/// Root-mean-square amplitude of the frame, never NaN.
///
/// Non-finite samples count as silence.
pub fn rms_loudness(frame: &[f32]) -> f32 {
    (mean_square(frame) as f32 + EPSILON).sqrt()
}

fn mean_square(frame: &[f32]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    frame
        .iter()
        .map(|&x| finite(x) as f64)
        .map(|x| x * x)
        .sum::<f64>()
        / frame.len() as f64
}

fn finite(x: f32) -> f32 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// Mean absolute first difference plus 0.6 x RMS.
///
/// The difference term follows high-frequency transients, the RMS term lets
/// sparse kicks register as events. Frames shorter than 2 samples yield
/// `EPSILON`.
pub fn onset_strength(frame: &[f32]) -> f32 {
    if frame.len() < 2 {
        return EPSILON;
    }
    let diff_sum: f64 = frame
        .windows(2)
        .map(|w| (finite(w[1]) as f64 - finite(w[0]) as f64).abs())
        .sum();
    let high_freq_content = (diff_sum / (frame.len() - 1) as f64) as f32;
    let rms = (mean_square(frame) as f32).sqrt();

    high_freq_content + rms * ONSET_RMS_WEIGHT + EPSILON
}

/// Linear floor/ceiling mapping of raw onset strength, clamped to 0-1.
pub fn normalize_onset(raw: f32, config: &OnsetConfig) -> f32 {
    let span = config.ceiling - config.floor;
    if span.abs() <= f32::EPSILON || !raw.is_finite() {
        return 0.0;
    }
    ((raw - config.floor) / span).clamp(0.0, 1.0)
}

/// Normalized low / mid / high energy of the frame's real spectrum.
pub fn spectral_energy_bands(frame: &[f32], sample_rate: u32) -> SpectralBands {
    SpectrumAnalyzer::new(false).bands(frame, sample_rate)
}

/// Register holding the largest share of the frame's energy
pub fn dominant_register(bands: &SpectralBands) -> PitchRegister {
    bands.dominant()
}

/// Magnitude spectrum with cached FFT plan, optionally Hann-windowed.
pub struct SpectrumAnalyzer {
    planner: FftPlanner<f32>,
    fft: Option<Arc<dyn Fft<f32>>>,
    len: usize,
    windowed: bool,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(windowed: bool) -> Self {
        Self {
            planner: FftPlanner::new(),
            fft: None,
            len: 0,
            windowed,
            window: Vec::new(),
            buffer: Vec::new(),
            magnitudes: Vec::new(),
        }
    }

    /// Re-plan when the frame length changes
    fn prepare(&mut self, len: usize) {
        if self.fft.is_some() && self.len == len {
            return;
        }
        self.len = len;
        self.fft = Some(self.planner.plan_fft_forward(len));
        self.buffer = vec![Complex::new(0.0, 0.0); len];
        self.window = if self.windowed {
            hann_window(len)
        } else {
            vec![1.0; len]
        };
    }

    /// Magnitudes of the non-negative frequency bins (`len / 2 + 1` values).
    /// Empty input yields an empty slice.
    pub fn magnitudes(&mut self, samples: &[f32]) -> &[f32] {
        self.magnitudes.clear();
        if samples.is_empty() {
            return &self.magnitudes;
        }
        self.prepare(samples.len());

        for (slot, (&s, &w)) in self
            .buffer
            .iter_mut()
            .zip(samples.iter().zip(self.window.iter()))
        {
            *slot = Complex::new(if s.is_finite() { s * w } else { 0.0 }, 0.0);
        }
        if let Some(fft) = &self.fft {
            fft.process(&mut self.buffer);
        }

        let bins = samples.len() / 2 + 1;
        self.magnitudes
            .extend(self.buffer[..bins].iter().map(|c| c.norm()));
        &self.magnitudes
    }

    /// Band split of one frame. Bins at or above 8 kHz are ignored; a frame
    /// without energy in any band yields the neutral split.
    pub fn bands(&mut self, samples: &[f32], sample_rate: u32) -> SpectralBands {
        if samples.is_empty() || sample_rate == 0 {
            return SpectralBands::NEUTRAL;
        }
        let len = samples.len();
        let bin_hz = sample_rate as f32 / len as f32;

        let mut sums = [0.0f64; 3];
        for (k, &mag) in self.magnitudes(samples).iter().enumerate() {
            let freq = k as f32 * bin_hz;
            if let Some(band) = band_index(freq) {
                sums[band] += mag as f64;
            }
        }

        let total = sums.iter().sum::<f64>();
        if total <= EPSILON as f64 {
            return SpectralBands::NEUTRAL;
        }
        let total = total + EPSILON as f64;
        SpectralBands {
            low: (sums[0] / total) as f32,
            mid: (sums[1] / total) as f32,
            high: (sums[2] / total) as f32,
        }
    }
}

fn band_index(freq: f32) -> Option<usize> {
    (0..3).find(|&i| freq >= BAND_EDGES[i] && freq < BAND_EDGES[i + 1])
}

/// Symmetric Hann window
pub fn hann_window(len: usize) -> Vec<f32> {
    if len <= 1 {
        return vec![1.0; len];
    }
    let denom = (len - 1) as f32;
    (0..len)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / denom).cos()))
        .collect()
}
