//! Final brightness composition.
//!
//! Starts from the normalizer output and layers the register bias, minimal
//! mode dimming, beat pulse and drop boost on top of it.

use moodlight_api::{DynamicsState, PitchRegister};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::utils::smoothing::clamp01;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Added for high-register frames, subtracted for low-register frames
    pub register_bias: f32,
    /// Brightness multiplier while in minimal mode
    pub minimal_scale: f32,
    /// Brightness added per unit of beat pulse
    pub pulse_gain: f32,
    /// Brightness added while drop boost frames remain
    pub drop_boost: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            register_bias: 0.07,
            minimal_scale: 0.6,
            pulse_gain: 0.15,
            drop_boost: 0.2,
        }
    }
}

impl OutputConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.minimal_scale) {
            return Err(ConfigError::invalid(
                "output.minimal_scale",
                "must be within 0..=1",
            ));
        }
        Ok(())
    }
}

/// Nudge brightness up for high registers and down for low ones.
pub fn apply_pitch_brightness_bias(brightness: f32, register: PitchRegister, amount: f32) -> f32 {
    let biased = match register {
        PitchRegister::High => brightness + amount,
        PitchRegister::Low => brightness - amount,
        PitchRegister::Mid => brightness,
    };
    clamp01(biased)
}

/// Combine base brightness with the rhythm and dynamics layers.
///
/// Zero base brightness (closed gate, finished release) stays zero so silence
/// never lights up.
pub fn compose_brightness(
    base: f32,
    register: PitchRegister,
    dynamics: DynamicsState,
    pulse: f32,
    config: &OutputConfig,
) -> f32 {
    if base <= 0.0 {
        return 0.0;
    }

    let mut b = apply_pitch_brightness_bias(base, register, config.register_bias);
    if dynamics.minimal_mode {
        b *= config.minimal_scale;
    }
    b += clamp01(pulse) * config.pulse_gain;
    if dynamics.drop_boost_frames_left > 0 {
        b += config.drop_boost;
    }
    clamp01(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_bias() {
        assert!((apply_pitch_brightness_bias(0.5, PitchRegister::High, 0.07) - 0.57).abs() < 1e-6);
        assert!((apply_pitch_brightness_bias(0.5, PitchRegister::Low, 0.07) - 0.43).abs() < 1e-6);
        assert_eq!(apply_pitch_brightness_bias(0.5, PitchRegister::Mid, 0.07), 0.5);
        assert_eq!(apply_pitch_brightness_bias(0.02, PitchRegister::Low, 0.07), 0.0);
    }

    #[test]
    fn test_silence_stays_dark() {
        let dynamics = DynamicsState {
            minimal_mode: false,
            drop_boost_frames_left: 5,
        };
        let b = compose_brightness(0.0, PitchRegister::High, dynamics, 1.0, &OutputConfig::default());
        assert_eq!(b, 0.0);
    }

    #[test]
    fn test_layers_stack_and_clamp() {
        let cfg = OutputConfig::default();
        let calm = compose_brightness(
            0.5,
            PitchRegister::Mid,
            DynamicsState {
                minimal_mode: true,
                drop_boost_frames_left: 0,
            },
            0.0,
            &cfg,
        );
        assert!((calm - 0.3).abs() < 1e-6);

        let hype = compose_brightness(
            0.9,
            PitchRegister::High,
            DynamicsState {
                minimal_mode: false,
                drop_boost_frames_left: 3,
            },
            1.0,
            &cfg,
        );
        assert_eq!(hype, 1.0);
    }
}
