//! Tempo estimation with a bank of phase resonators.
//!
//! Each candidate BPM (1 BPM apart) owns a phase oscillator and an energy
//! accumulator. Onsets add energy to the bins whose beat grid lines up with
//! the current frame, and all energies decay every frame, so the strongest
//! bin is the tempo that has been agreeing with recent onsets.
//!
//! Resonance alone cannot tell a beat from its subdivision or its half, so
//! the raw winner is checked against the inter-onset-interval (IOI) history:
//! a half or double tempo with enough resonance and a clearly better IOI fit
//! replaces it.

use moodlight_api::TempoState;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::error::ConfigError;
use crate::utils::smoothing::clamp01;

/// Added to the mean energy in the confidence ratio
const CONFIDENCE_EPSILON: f32 = 0.001;

/// Below this the bank carries no tempo information
const SILENT_ENERGY: f32 = 1e-9;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    pub min_bpm: f32,
    pub max_bpm: f32,
    /// Per-frame energy decay factor (< 1)
    pub energy_decay: f32,
    /// Scale of energy injected per onset
    pub pulse_coupling: f32,
    /// Width of the Gaussian phase activation, `exp(-d^2 / width)`
    pub activation_width: f32,
    /// Onsets above this feed the resonators
    pub onset_threshold: f32,
    /// Onsets above this are recorded as IOI events
    pub ioi_onset_threshold: f32,
    /// Shortest interval recorded, in seconds
    pub min_ioi_s: f32,
    /// Number of intervals kept
    pub ioi_history: usize,
    /// Relative error for an interval to match a period
    pub density_tolerance: f32,
    /// Intervals needed before octave correction is trusted
    pub min_intervals: usize,
    /// Half tempo needs at least this share of the winning energy
    pub half_energy_ratio: f32,
    /// Double tempo needs at least this share of the winning energy
    pub double_energy_ratio: f32,
    /// IOI score lead required to switch octave
    pub density_margin: f32,
    /// Exponential smoothing rate of the reported BPM
    pub smoothing: f32,
    /// Reported BPM before any onset, clamped into range
    pub initial_bpm: f32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            min_bpm: 60.0,
            max_bpm: 180.0,
            energy_decay: 0.97,
            pulse_coupling: 0.4,
            activation_width: 0.05,
            onset_threshold: 0.01,
            ioi_onset_threshold: 0.5,
            min_ioi_s: 0.2,
            ioi_history: 20,
            density_tolerance: 0.10,
            min_intervals: 4,
            half_energy_ratio: 0.5,
            double_energy_ratio: 0.6,
            density_margin: 0.15,
            smoothing: 0.05,
            initial_bpm: 120.0,
        }
    }
}

impl TempoConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_bpm > 0.0 && self.max_bpm.is_finite() && self.max_bpm >= self.min_bpm) {
            return Err(ConfigError::InvalidTempoRange {
                min: self.min_bpm,
                max: self.max_bpm,
            });
        }
        if !(self.energy_decay > 0.0 && self.energy_decay < 1.0) {
            return Err(ConfigError::invalid(
                "tempo.energy_decay",
                "must be within (0, 1)",
            ));
        }
        if self.activation_width <= 0.0 {
            return Err(ConfigError::invalid(
                "tempo.activation_width",
                "must be positive",
            ));
        }
        if self.ioi_history == 0 {
            return Err(ConfigError::invalid("tempo.ioi_history", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(ConfigError::invalid("tempo.smoothing", "must be within 0..=1"));
        }
        Ok(())
    }
}

/// One candidate tempo
#[derive(Clone, Copy, Debug)]
struct Resonator {
    bpm: f32,
    phase: f32,
    energy: f32,
}

pub struct ResonatorBpm {
    config: TempoConfig,
    fps: f32,
    bank: Vec<Resonator>,
    iois: VecDeque<f32>,
    frame_index: u64,
    /// Frame of the last recorded onset; the first onset only starts the clock
    last_onset_frame: Option<u64>,
    best_bpm: f32,
    state: TempoState,
}

impl ResonatorBpm {
    pub fn new(config: TempoConfig, fps: f32) -> Self {
        let n_bins = (config.max_bpm - config.min_bpm).floor().max(0.0) as usize + 1;
        let bank = (0..n_bins)
            .map(|i| Resonator {
                bpm: config.min_bpm + i as f32,
                phase: 0.0,
                energy: 0.0,
            })
            .collect();
        let best_bpm = config.initial_bpm.clamp(config.min_bpm, config.max_bpm);

        Self {
            config,
            fps: fps.max(f32::EPSILON),
            bank,
            iois: VecDeque::with_capacity(config.ioi_history),
            frame_index: 0,
            last_onset_frame: None,
            best_bpm,
            state: TempoState {
                bpm: best_bpm,
                ..TempoState::default()
            },
        }
    }

    /// Feed one frame's onset strength (0-1) and get the current estimate.
    pub fn update(&mut self, onset: f32) -> TempoState {
        let onset = if onset.is_finite() { onset.max(0.0) } else { 0.0 };
        self.frame_index += 1;

        self.advance_phases();
        if onset > self.config.onset_threshold {
            self.inject(onset);
            if onset > self.config.ioi_onset_threshold {
                self.record_onset();
            }
        }
        for r in &mut self.bank {
            r.energy *= self.config.energy_decay;
        }

        let (peak_idx, peak_energy) = self.peak();
        let mut chosen_energy = peak_energy;
        if peak_energy > SILENT_ENERGY {
            let (bpm, energy) = self.correct_octave(self.bank[peak_idx].bpm, peak_energy);
            chosen_energy = energy;
            let a = self.config.smoothing;
            self.best_bpm = (1.0 - a) * self.best_bpm + a * bpm;
            self.best_bpm = self.best_bpm.clamp(self.config.min_bpm, self.config.max_bpm);
        }

        let mean_energy = self.bank.iter().map(|r| r.energy).sum::<f32>() / self.bank.len() as f32
            + CONFIDENCE_EPSILON;
        let confidence =
            clamp01((chosen_energy - mean_energy) / (chosen_energy + mean_energy) * 3.0);

        self.state = TempoState {
            bpm: self.best_bpm,
            confidence,
            is_stable: confidence > 0.5,
            density: self.density(),
        };
        self.state
    }

    fn advance_phases(&mut self) {
        for r in &mut self.bank {
            r.phase = (r.phase + r.bpm / 60.0 / self.fps).rem_euclid(1.0);
        }
    }

    /// Bins whose phase sits near a beat boundary get the most energy
    fn inject(&mut self, onset: f32) {
        let gain = onset * self.config.pulse_coupling;
        let width = self.config.activation_width;
        for r in &mut self.bank {
            let dist = (r.phase - r.phase.round()).abs();
            r.energy += gain * (-(dist * dist) / width).exp();
        }
    }

    fn record_onset(&mut self) {
        let Some(last) = self.last_onset_frame else {
            self.last_onset_frame = Some(self.frame_index);
            return;
        };
        let elapsed = (self.frame_index - last) as f32 / self.fps;
        if elapsed > self.config.min_ioi_s {
            if self.iois.len() == self.config.ioi_history {
                self.iois.pop_front();
            }
            self.iois.push_back(elapsed);
            self.last_onset_frame = Some(self.frame_index);
        }
    }

    fn peak(&self) -> (usize, f32) {
        self.bank
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |(bi, be), (i, r)| {
                if r.energy > be {
                    (i, r.energy)
                } else {
                    (bi, be)
                }
            })
    }

    fn energy_at(&self, bpm: f32) -> Option<f32> {
        if bpm < self.config.min_bpm || bpm > self.config.max_bpm {
            return None;
        }
        let idx = (bpm - self.config.min_bpm).round() as usize;
        self.bank.get(idx).map(|r| r.energy)
    }

    /// Swap the resonance winner for its half or double when the IOI history
    /// clearly prefers it. Half is tried first; double only if half lost.
    fn correct_octave(&self, raw_bpm: f32, raw_energy: f32) -> (f32, f32) {
        let raw_score = self.density_score(raw_bpm);

        let half = raw_bpm / 2.0;
        if let Some(energy) = self.energy_at(half) {
            if energy >= raw_energy * self.config.half_energy_ratio
                && self.density_score(half) > raw_score + self.config.density_margin
            {
                debug!(raw_bpm, corrected = half, "tempo octave corrected down");
                return (half, energy);
            }
        }

        let double = raw_bpm * 2.0;
        if let Some(energy) = self.energy_at(double) {
            if energy >= raw_energy * self.config.double_energy_ratio
                && self.density_score(double) > raw_score + self.config.density_margin
            {
                debug!(raw_bpm, corrected = double, "tempo octave corrected up");
                return (double, energy);
            }
        }

        (raw_bpm, raw_energy)
    }

    /// Share of recent intervals matching one beat of `bpm` (full weight) or
    /// two beats (half weight). Neutral 0.5 until enough intervals exist.
    pub fn density_score(&self, bpm: f32) -> f32 {
        if self.iois.len() < self.config.min_intervals || bpm <= 0.0 {
            return 0.5;
        }
        let period = 60.0 / bpm;
        let tol = self.config.density_tolerance;

        let matches: f32 = self
            .iois
            .iter()
            .map(|&ioi| {
                if (ioi - period).abs() / period < tol {
                    1.0
                } else if (ioi - period * 2.0).abs() / (period * 2.0) < tol {
                    0.5
                } else {
                    0.0
                }
            })
            .sum();

        matches / (self.iois.len() as f32 + 1e-4)
    }

    /// 1.0 at a 0.1 s mean interval, 0.0 at 1 s or slower
    fn density(&self) -> f32 {
        if self.iois.is_empty() {
            return 0.0;
        }
        let mean = self.iois.iter().sum::<f32>() / self.iois.len() as f32;
        clamp01(1.0 - (mean - 0.1) / 0.9)
    }

    pub fn state(&self) -> TempoState {
        self.state
    }

    pub fn interval_count(&self) -> usize {
        self.iois.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FPS: f32 = 20.0;

    /// Strong onset on every `period`-th frame, counting frames from 1
    fn run_train(tempo: &mut ResonatorBpm, period: u64, frames: u64) -> TempoState {
        let mut state = tempo.state();
        for n in 1..=frames {
            let onset = if n % period == 0 { 1.0 } else { 0.0 };
            state = tempo.update(onset);
        }
        state
    }

    #[test]
    fn test_silence_holds_initial_estimate() {
        let mut tempo = ResonatorBpm::new(TempoConfig::default(), FPS);
        let state = run_train(&mut tempo, u64::MAX, 200);
        assert_eq!(state.bpm, 120.0);
        assert_eq!(state.confidence, 0.0);
        assert_eq!(state.density, 0.0);
        assert!(!state.is_stable);
    }

    #[test]
    fn test_converges_on_120_bpm() {
        let mut tempo = ResonatorBpm::new(TempoConfig::default(), FPS);
        // 120 BPM at 20 fps = one beat every 10 frames
        let state = run_train(&mut tempo, 10, 200);
        assert!((state.bpm - 120.0).abs() <= 2.0, "bpm {}", state.bpm);
        assert!(state.confidence > 0.5, "confidence {}", state.confidence);
        assert!(state.is_stable);
        assert!((state.density - (1.0 - 0.4 / 0.9)).abs() < 0.01, "density {}", state.density);
    }

    #[test]
    fn test_moves_to_100_bpm() {
        let mut tempo = ResonatorBpm::new(TempoConfig::default(), FPS);
        let state = run_train(&mut tempo, 12, 400);
        assert!((state.bpm - 100.0).abs() <= 2.0, "bpm {}", state.bpm);
    }

    #[test]
    fn test_ghost_subdivisions_resolve_to_beat() {
        let config = TempoConfig {
            max_bpm: 240.0,
            ..TempoConfig::default()
        };
        let mut tempo = ResonatorBpm::new(config, FPS);

        // strong beats every 10 frames, weaker ghosts halfway between:
        // resonance favours 240, the interval history says 120
        let mut state = tempo.state();
        for n in 1..=400u64 {
            let onset = match n % 10 {
                0 => 1.0,
                5 => 0.3,
                _ => 0.0,
            };
            state = tempo.update(onset);
        }
        assert!(tempo.interval_count() >= 4);
        assert!((state.bpm - 120.0).abs() <= 2.0, "bpm {}", state.bpm);
    }

    #[test]
    fn test_lead_in_silence_is_not_an_interval() {
        let mut tempo = ResonatorBpm::new(TempoConfig::default(), FPS);
        for _ in 0..600 {
            tempo.update(0.0);
        }
        let state = run_train(&mut tempo, 10, 100);
        assert_eq!(tempo.interval_count(), 9);
        assert!(tempo.iois.iter().all(|&ioi| (ioi - 0.5).abs() < 1e-6), "{:?}", tempo.iois);
        assert!((state.density - (1.0 - 0.4 / 0.9)).abs() < 0.01, "density {}", state.density);
    }

    /// Bank with the raw winner at 60 BPM and 120 at `double_share` of it,
    /// over an interval history of steady half-second beats
    fn octave_bank(double_share: f32) -> ResonatorBpm {
        let mut tempo = ResonatorBpm::new(TempoConfig::default(), FPS);
        tempo.bank[0].energy = 1.0;
        tempo.bank[60].energy = double_share;
        tempo.iois.extend([0.5; 8]);
        tempo
    }

    #[test]
    fn test_double_tempo_wins_with_enough_energy() {
        let tempo = octave_bank(0.65);
        assert_eq!(tempo.bank[60].bpm, 120.0);
        assert_eq!(tempo.correct_octave(60.0, 1.0), (120.0, 0.65));
    }

    #[test]
    fn test_double_tempo_needs_energy_share() {
        let tempo = octave_bank(0.5);
        assert_eq!(tempo.correct_octave(60.0, 1.0), (60.0, 1.0));
    }

    #[test]
    fn test_density_score_neutral_until_enough_intervals() {
        let mut tempo = ResonatorBpm::new(TempoConfig::default(), FPS);
        run_train(&mut tempo, 10, 30);
        assert!(tempo.interval_count() < 4);
        assert_eq!(tempo.density_score(120.0), 0.5);
        assert_eq!(tempo.density_score(60.0), 0.5);

        run_train(&mut tempo, 10, 40);
        assert!(tempo.density_score(120.0) > 0.9);
        assert!((tempo.density_score(240.0) - 0.5).abs() < 0.01);
        assert!(tempo.density_score(60.0) < 0.1);
    }

    #[test]
    fn test_bpm_stays_in_range() {
        let config = TempoConfig {
            min_bpm: 90.0,
            max_bpm: 150.0,
            ..TempoConfig::default()
        };
        let mut tempo = ResonatorBpm::new(config, FPS);
        for period in [4u64, 30, 7] {
            let state = run_train(&mut tempo, period, 200);
            assert!((90.0..=150.0).contains(&state.bpm), "bpm {}", state.bpm);
            assert!((0.0..=1.0).contains(&state.confidence));
        }
    }

    #[test]
    fn test_validate_range() {
        let bad = TempoConfig {
            min_bpm: 180.0,
            max_bpm: 60.0,
            ..TempoConfig::default()
        };
        assert!(bad.validate().is_err());
        assert!(TempoConfig::default().validate().is_ok());
    }
}
