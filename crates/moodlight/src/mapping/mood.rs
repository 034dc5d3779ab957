//! Arousal / valence estimation.
//!
//! Arousal follows power and busyness: loudness, onset density and momentary
//! impact. Valence follows spectral balance: how much of the energy sits in
//! the mid and high registers, both in absolute terms and relative to the
//! running average of the current song. Silence zeroes arousal and lets
//! valence drift back toward neutral without jumping.

use moodlight_api::{MoodState, SpectralBands};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::utils::smoothing::clamp01;

const NEUTRAL_VALENCE: f32 = 0.5;
const DOMINANCE_EPSILON: f32 = 0.001;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MoodConfig {
    /// Loudness at or below this is treated as silence
    pub silence_threshold: f32,
    /// Arousal weights
    pub loudness_weight: f32,
    pub density_weight: f32,
    pub onset_weight: f32,
    /// Extra arousal per unit of beat pulse (off by default)
    pub pulse_weight: f32,
    /// Adaptation rate of the running spectral dominance
    pub learning_rate: f32,
    /// Running dominance before any music was heard
    pub initial_dominance: f32,
    /// Dominance that maps to neutral absolute valence
    pub absolute_center: f32,
    pub absolute_scale: f32,
    pub adaptive_scale: f32,
    /// Share of the absolute term in the valence mix
    pub absolute_weight: f32,
    /// Onsets above this add `onset_bonus` to valence
    pub onset_bonus_threshold: f32,
    pub onset_bonus: f32,
    /// Per-frame pull toward neutral valence during silence
    pub silence_valence_decay: f32,
}

impl Default for MoodConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.01,
            loudness_weight: 0.5,
            density_weight: 0.4,
            onset_weight: 0.1,
            pulse_weight: 0.0,
            learning_rate: 0.005,
            initial_dominance: 0.15,
            absolute_center: 0.08,
            absolute_scale: 2.0,
            adaptive_scale: 4.0,
            absolute_weight: 0.4,
            onset_bonus_threshold: 0.3,
            onset_bonus: 0.15,
            silence_valence_decay: 0.01,
        }
    }
}

impl MoodConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, v) in [
            ("mood.learning_rate", self.learning_rate),
            ("mood.absolute_weight", self.absolute_weight),
            ("mood.silence_valence_decay", self.silence_valence_decay),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::invalid(name, "must be within 0..=1"));
            }
        }
        Ok(())
    }
}

/// Everything the mood estimate looks at for one frame
#[derive(Clone, Copy, Debug)]
pub struct MoodInputs {
    /// Normalized brightness (0-1)
    pub loudness: f32,
    /// Normalized onset (0-1)
    pub onset: f32,
    /// Beat pulse (0-1)
    pub pulse: f32,
    /// Tempo onset density (0-1)
    pub density: f32,
    pub bands: SpectralBands,
}

pub struct MoodEngine {
    config: MoodConfig,
    valence: f32,
    avg_dominance: f32,
}

impl MoodEngine {
    pub fn new(config: MoodConfig) -> Self {
        Self {
            config,
            valence: NEUTRAL_VALENCE,
            avg_dominance: config.initial_dominance,
        }
    }

    pub fn update(&mut self, inputs: &MoodInputs) -> MoodState {
        let c = &self.config;
        let loudness = sanitize(inputs.loudness);
        let onset = sanitize(inputs.onset);

        if loudness <= c.silence_threshold {
            self.valence += (NEUTRAL_VALENCE - self.valence) * c.silence_valence_decay;
            return MoodState {
                arousal: 0.0,
                valence: self.valence,
            };
        }

        let arousal = loudness * c.loudness_weight
            + sanitize(inputs.density) * c.density_weight
            + onset * c.onset_weight
            + sanitize(inputs.pulse) * c.pulse_weight;

        let dominance = dominance(&inputs.bands);
        self.avg_dominance += (dominance - self.avg_dominance) * c.learning_rate;
        let deviation = dominance - self.avg_dominance;

        let absolute = clamp01(0.5 + (dominance - c.absolute_center) * c.absolute_scale);
        let adaptive = 0.5 + deviation * c.adaptive_scale;
        let mut valence = absolute * c.absolute_weight + adaptive * (1.0 - c.absolute_weight);
        if onset > c.onset_bonus_threshold {
            valence += c.onset_bonus;
        }
        self.valence = clamp01(valence);

        MoodState {
            arousal: clamp01(arousal),
            valence: self.valence,
        }
    }

    /// Long-term mid+high share of the current material
    pub fn average_dominance(&self) -> f32 {
        self.avg_dominance
    }
}

/// Share of mid and high energy in the frame
fn dominance(bands: &SpectralBands) -> f32 {
    let low = sanitize(bands.low);
    let mid = sanitize(bands.mid);
    let high = sanitize(bands.high);
    (mid + high) / (low + mid + high + DOMINANCE_EPSILON)
}

fn sanitize(v: f32) -> f32 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}
