//! Gated RMS to 0-1 brightness.
//!
//! Wraps [`NoiseGate`]. While the gate is open, RMS is scaled between
//! `threshold_off` and a running ceiling that jumps up to new peaks and decays
//! slowly otherwise. Output uses instant attack and a fixed linear release, so
//! closing the gate fades out instead of cutting.

use moodlight_api::AudioFrame;
use serde::{Deserialize, Serialize};

use super::gate::{Calibration, GateConfig, NoiseGate};
use crate::error::ConfigError;
use crate::utils::smoothing::clamp01;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Starting value of the running ceiling
    pub initial_ceiling: f32,
    /// Ceiling shrinks by `decay_rate * 0.1` of itself per open frame
    pub decay_rate: f32,
    /// Ceiling never drops below `threshold_off + min_span`
    pub min_span: f32,
    /// Power applied to the normalized value (< 1 lifts quiet passages)
    pub gamma: f32,
    /// Output drop per frame when falling
    pub release_per_frame: f32,
    /// Smallest divisor when scaling
    pub span_epsilon: f32,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            initial_ceiling: 0.15,
            decay_rate: 0.01,
            min_span: 0.005,
            gamma: 0.45,
            release_per_frame: 0.012,
            span_epsilon: 0.001,
        }
    }
}

impl NormalizerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.gamma > 0.0 && self.gamma.is_finite()) {
            return Err(ConfigError::invalid("normalizer.gamma", "must be positive"));
        }
        if !(0.0..=10.0).contains(&self.decay_rate) {
            return Err(ConfigError::invalid(
                "normalizer.decay_rate",
                "must be within 0..=10",
            ));
        }
        if self.release_per_frame <= 0.0 {
            return Err(ConfigError::invalid(
                "normalizer.release_per_frame",
                "must be positive",
            ));
        }
        if self.span_epsilon <= 0.0 || self.min_span < 0.0 {
            return Err(ConfigError::invalid(
                "normalizer.min_span",
                "span limits must be positive",
            ));
        }
        Ok(())
    }
}

pub struct AdaptiveNormalizer {
    config: NormalizerConfig,
    gate: NoiseGate,
    running_ceiling: f32,
    smoothed_output: f32,
}

impl AdaptiveNormalizer {
    pub fn new(config: NormalizerConfig, gate_config: GateConfig) -> Self {
        Self {
            config,
            gate: NoiseGate::new(gate_config),
            running_ceiling: config.initial_ceiling,
            smoothed_output: 0.0,
        }
    }

    pub fn calibrate(&mut self, frames: &[AudioFrame]) -> Option<Calibration> {
        self.gate.calibrate(frames)
    }

    /// Brightness for one frame, always within [0, 1].
    pub fn normalize(&mut self, rms: f32, frame: &[f32]) -> f32 {
        let gated = self.gate.update(rms, frame);
        let threshold_off = self.gate.threshold_off();

        let mut target = 0.0;
        if gated > 0.0 {
            if gated > self.running_ceiling {
                self.running_ceiling = gated;
            } else {
                self.running_ceiling -= self.running_ceiling * self.config.decay_rate * 0.1;
            }
            self.running_ceiling = self
                .running_ceiling
                .max(threshold_off + self.config.min_span);

            let span = (self.running_ceiling - threshold_off).max(self.config.span_epsilon);
            let normalized = clamp01((gated - threshold_off) / span);
            target = normalized.powf(self.config.gamma);
        }

        if target > self.smoothed_output {
            self.smoothed_output = target;
        } else {
            self.smoothed_output -= self.config.release_per_frame;
        }
        self.smoothed_output = clamp01(self.smoothed_output);
        self.smoothed_output
    }

    pub fn gate(&self) -> &NoiseGate {
        &self.gate
    }

    pub fn running_ceiling(&self) -> f32 {
        self.running_ceiling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn normalizer() -> AdaptiveNormalizer {
        AdaptiveNormalizer::new(NormalizerConfig::default(), GateConfig::default())
    }

    fn frame() -> Vec<f32> {
        vec![0.0; 1024]
    }

    #[test]
    fn test_attack_is_immediate() {
        let mut n = normalizer();
        assert_eq!(n.normalize(0.001, &frame()), 0.0);
        let out = n.normalize(0.5, &frame());
        assert!(out > 0.9, "loud frame should light up at once, got {}", out);
        assert!(n.running_ceiling() >= 0.5);
    }

    #[test]
    fn test_release_is_gradual_and_monotonic() {
        let config = NormalizerConfig {
            release_per_frame: 0.05,
            ..NormalizerConfig::default()
        };
        let mut n = AdaptiveNormalizer::new(
            config,
            GateConfig {
                hold_frames: 0,
                ..GateConfig::default()
            },
        );
        let peak = n.normalize(0.5, &frame());

        let mut prev = peak;
        let mut steps = 0;
        while prev > 0.0 && steps < 100 {
            let out = n.normalize(0.0, &frame());
            assert!(out <= prev, "release must not rise");
            assert!(prev - out <= 0.05 + 1e-6, "release must not jump");
            prev = out;
            steps += 1;
        }
        assert_eq!(prev, 0.0);
        assert!(steps > 1, "fade took {} frames", steps);
    }

    #[test]
    fn test_ceiling_floor_above_threshold_off() {
        let mut n = normalizer();
        n.normalize(0.06, &frame());
        for _ in 0..10_000 {
            n.normalize(0.0556, &frame());
        }
        let floor = n.gate().threshold_off() + 0.005;
        assert!(n.running_ceiling() >= floor - 1e-6);
    }

    proptest! {
        #[test]
        fn prop_output_in_unit_range(levels in proptest::collection::vec(0.0f32..2.0, 1..200)) {
            let mut n = normalizer();
            for rms in levels {
                let out = n.normalize(rms, &frame());
                prop_assert!((0.0..=1.0).contains(&out));
            }
        }
    }
}
