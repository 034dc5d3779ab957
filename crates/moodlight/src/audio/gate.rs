//! Hysteresis noise gate with spectral-flux music detection.
//!
//! Loud signal opens the gate outright. Quiet signal only opens it when the
//! spectrum is moving (music), not when it is static (hum, hiss). Once open,
//! the gate closes only after `hold_frames` consecutive frames below
//! `threshold_off`.

use moodlight_api::AudioFrame;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::features::{rms_loudness, SpectrumAnalyzer};
use crate::error::ConfigError;

/// Noise gate tuning
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// RMS above this opens the gate unconditionally
    pub threshold_on: f32,
    /// RMS below this starts the close countdown
    pub threshold_off: f32,
    /// Quiet signal must still exceed this before flux is considered
    pub min_music_rms: f32,
    /// Spectral flux that marks quiet signal as music
    pub flux_threshold: f32,
    /// Frames below `threshold_off` tolerated before closing
    pub hold_frames: u32,
    /// Calibration margin as a fraction of the measured noise peak
    pub calibration_margin_ratio: f32,
    /// Smallest calibration margin
    pub calibration_margin_floor: f32,
    /// Frame length the flux threshold was tuned for
    pub flux_reference_len: f32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold_on: 0.0565,
            threshold_off: 0.0555,
            min_music_rms: 0.056,
            flux_threshold: 2.0,
            hold_frames: 40,
            calibration_margin_ratio: 0.10,
            calibration_margin_floor: 0.002,
            flux_reference_len: 512.0,
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.threshold_on.is_finite() && self.threshold_off.is_finite())
            || self.threshold_on < self.threshold_off
        {
            return Err(ConfigError::InvalidGateThresholds {
                on: self.threshold_on,
                off: self.threshold_off,
            });
        }
        if self.flux_reference_len <= 0.0 {
            return Err(ConfigError::invalid(
                "gate.flux_reference_len",
                "must be positive",
            ));
        }
        if self.calibration_margin_ratio < 0.0 || self.calibration_margin_floor < 0.0 {
            return Err(ConfigError::invalid(
                "gate.calibration_margin",
                "must not be negative",
            ));
        }
        Ok(())
    }
}

/// Gate state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    Closed,
    /// `hold` counts consecutive frames below `threshold_off`
    Open { hold: u32 },
}

/// Thresholds measured from known-silent frames
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    pub max_noise: f32,
    pub mean_noise: f32,
    pub threshold_on: f32,
    pub threshold_off: f32,
}

pub struct NoiseGate {
    config: GateConfig,
    threshold_on: f32,
    threshold_off: f32,
    min_music_rms: f32,
    state: GateState,
    prev_spectrum: Option<Vec<f32>>,
    spectrum: SpectrumAnalyzer,
    last_flux: f32,
}

impl NoiseGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            threshold_on: config.threshold_on,
            threshold_off: config.threshold_off,
            min_music_rms: config.min_music_rms,
            state: GateState::Closed,
            prev_spectrum: None,
            spectrum: SpectrumAnalyzer::new(true),
            last_flux: 0.0,
        }
    }

    /// Set thresholds just above the loudest of a batch of known-silent
    /// frames. Empty input leaves the current thresholds untouched.
    pub fn calibrate(&mut self, frames: &[AudioFrame]) -> Option<Calibration> {
        if frames.is_empty() {
            return None;
        }

        let rms: Vec<f32> = frames.iter().map(|f| rms_loudness(f.samples())).collect();
        let max_noise = rms.iter().cloned().fold(0.0f32, f32::max);
        let mean_noise = rms.iter().sum::<f32>() / rms.len() as f32;

        let margin = (max_noise * self.config.calibration_margin_ratio)
            .max(self.config.calibration_margin_floor);
        self.threshold_on = max_noise + margin;
        self.threshold_off = self.threshold_on - margin * 0.5;
        self.min_music_rms = self.threshold_off;

        info!(
            max_noise,
            mean_noise,
            threshold_on = self.threshold_on,
            threshold_off = self.threshold_off,
            "noise floor calibrated from {} frames",
            frames.len()
        );

        Some(Calibration {
            max_noise,
            mean_noise,
            threshold_on: self.threshold_on,
            threshold_off: self.threshold_off,
        })
    }

    /// Gate one frame. Returns `rms` while open and 0 while closed.
    pub fn update(&mut self, rms: f32, frame: &[f32]) -> f32 {
        let flux = self.spectral_flux(frame);
        self.last_flux = flux;

        let rms = if rms.is_finite() { rms } else { 0.0 };
        let next = self.next_state(rms, flux);
        if next != self.state {
            match (self.state, next) {
                (GateState::Closed, GateState::Open { .. }) => {
                    debug!(rms, flux, "gate opened")
                }
                (GateState::Open { .. }, GateState::Closed) => debug!(rms, "gate closed"),
                _ => {}
            }
        }
        self.state = next;

        match self.state {
            GateState::Open { .. } => rms,
            GateState::Closed => 0.0,
        }
    }

    fn next_state(&self, rms: f32, flux: f32) -> GateState {
        match self.state {
            GateState::Closed if self.should_open(rms, flux) => GateState::Open { hold: 0 },
            GateState::Closed => GateState::Closed,
            GateState::Open { hold } if rms < self.threshold_off => {
                let hold = hold + 1;
                if hold > self.config.hold_frames {
                    GateState::Closed
                } else {
                    GateState::Open { hold }
                }
            }
            GateState::Open { .. } => GateState::Open { hold: 0 },
        }
    }

    /// Loud, or quiet but spectrally moving
    fn should_open(&self, rms: f32, flux: f32) -> bool {
        let loud = rms > self.threshold_on;
        let quiet_music = rms > self.min_music_rms && flux > self.config.flux_threshold;
        loud || quiet_music
    }

    /// L1 distance between the low halves of consecutive Hann-windowed
    /// magnitude spectra, scaled to the reference frame length.
    fn spectral_flux(&mut self, frame: &[f32]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }
        let current = self.spectrum.magnitudes(frame).to_vec();

        let flux = match &self.prev_spectrum {
            Some(prev) if prev.len() == current.len() => {
                let n_bins = current.len() / 2;
                let diff: f32 = current[..n_bins]
                    .iter()
                    .zip(&prev[..n_bins])
                    .map(|(c, p)| (c - p).abs())
                    .sum();
                diff / (frame.len() as f32 / self.config.flux_reference_len)
            }
            _ => 0.0,
        };

        self.prev_spectrum = Some(current);
        if flux.is_finite() {
            flux
        } else {
            0.0
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, GateState::Open { .. })
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn threshold_on(&self) -> f32 {
        self.threshold_on
    }

    pub fn threshold_off(&self) -> f32 {
        self.threshold_off
    }

    /// Flux measured on the last update
    pub fn last_flux(&self) -> f32 {
        self.last_flux
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const LEN: usize = 2205;

    fn gate() -> NoiseGate {
        NoiseGate::new(GateConfig {
            hold_frames: 5,
            ..GateConfig::default()
        })
    }

    fn silence() -> Vec<f32> {
        vec![0.0; LEN]
    }

    #[test]
    fn test_closed_on_silence() {
        let mut gate = gate();
        for _ in 0..50 {
            let frame = silence();
            assert_eq!(gate.update(rms_loudness(&frame), &frame), 0.0);
        }
        assert!(!gate.is_open());
    }

    #[test]
    fn test_loud_opens_immediately() {
        let mut gate = gate();
        assert_eq!(gate.update(0.2, &silence()), 0.2);
        assert!(gate.is_open());
    }

    #[test]
    fn test_closes_after_hold_plus_one_low_frames() {
        let mut gate = gate();
        gate.update(0.2, &silence());

        for i in 0..5 {
            let out = gate.update(0.01, &silence());
            assert_eq!(out, 0.01, "still holding at low frame {}", i);
        }
        assert_eq!(gate.update(0.01, &silence()), 0.0);
        assert_eq!(gate.state(), GateState::Closed);
    }

    #[test]
    fn test_brief_dip_does_not_close() {
        let mut gate = gate();
        gate.update(0.2, &silence());
        for _ in 0..3 {
            gate.update(0.01, &silence());
        }
        assert_eq!(gate.update(0.06, &silence()), 0.06);
        for _ in 0..5 {
            gate.update(0.01, &silence());
        }
        assert!(gate.is_open(), "counter should have reset after recovery");
    }

    #[test]
    fn test_quiet_static_noise_stays_closed() {
        let mut gate = gate();
        // same frame every time: rms in the quiet zone, zero flux
        let frame: Vec<f32> = (0..LEN).map(|i| 0.0562 * 1.414 * (i as f32 * 0.3).sin()).collect();
        let rms = 0.0562;
        for _ in 0..20 {
            assert_eq!(gate.update(rms, &frame), 0.0);
        }
    }

    #[test]
    fn test_quiet_dynamic_signal_opens() {
        let mut gate = gate();
        let mut rng = StdRng::seed_from_u64(7);
        let rms = 0.0562;
        let mut opened = false;
        for _ in 0..10 {
            let frame: Vec<f32> = (0..LEN).map(|_| rng.random_range(-0.1..0.1)).collect();
            if gate.update(rms, &frame) > 0.0 {
                opened = true;
            }
        }
        assert!(opened, "changing spectrum in the quiet zone should open the gate");
        assert!(gate.last_flux() > 2.0);
    }

    #[test]
    fn test_calibration_sets_thresholds_above_noise() {
        let mut gate = gate();
        let mut rng = StdRng::seed_from_u64(11);
        let frames: Vec<AudioFrame> = (0..30)
            .map(|_| {
                let samples = (0..LEN).map(|_| rng.random_range(-0.02..0.02)).collect();
                AudioFrame::new(samples, 44100)
            })
            .collect();
        let cal = gate.calibrate(&frames).expect("non-empty batch");

        assert!(cal.threshold_on > cal.max_noise);
        assert!(gate.threshold_on() >= gate.threshold_off());
        assert!(gate.threshold_off() > cal.max_noise);
        let margin = cal.threshold_on - cal.max_noise;
        assert!((margin - 0.002).abs() < 1e-6, "floor margin applies, got {}", margin);
    }

    #[test]
    fn test_empty_calibration_is_noop() {
        let mut gate = gate();
        assert!(gate.calibrate(&[]).is_none());
        assert_eq!(gate.threshold_on(), 0.0565);
        assert_eq!(gate.threshold_off(), 0.0555);
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let cfg = GateConfig {
            threshold_on: 0.01,
            threshold_off: 0.02,
            ..GateConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(GateConfig::default().validate().is_ok());
    }
}
