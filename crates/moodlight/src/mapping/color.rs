//! Mood to color.
//!
//! Each mood axis goes through a [`PaletteStabilizer`] so a song settles into
//! a consistent palette, then the blended (arousal, valence) point is placed on
//! a four-quadrant hue circle and smoothed before HSV conversion.

use moodlight_api::{Color, MoodState};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::utils::smoothing::{clamp01, Ema, HueEma};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    /// Share of the stabilized palette in the blended mood
    pub palette_weight: f32,
    /// Distance from the palette center that counts as drift
    pub drift_distance: f32,
    /// Drift frames needed before the palette starts adapting
    pub drift_frames: u32,
    /// Center tracking rate when locked
    pub stable_rate: f32,
    /// Center tracking rate while adapting to new material
    pub adapting_rate: f32,
    pub hue_alpha: f32,
    pub saturation_alpha: f32,
    pub saturation_base: f32,
    pub saturation_span: f32,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            palette_weight: 0.6,
            drift_distance: 0.15,
            drift_frames: 20,
            stable_rate: 0.005,
            adapting_rate: 0.08,
            hue_alpha: 0.12,
            saturation_alpha: 0.1,
            saturation_base: 0.4,
            saturation_span: 0.6,
        }
    }
}

impl ColorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, v) in [
            ("color.palette_weight", self.palette_weight),
            ("color.stable_rate", self.stable_rate),
            ("color.adapting_rate", self.adapting_rate),
            ("color.hue_alpha", self.hue_alpha),
            ("color.saturation_alpha", self.saturation_alpha),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::invalid(name, "must be within 0..=1"));
            }
        }
        if self.drift_frames == 0 {
            return Err(ConfigError::invalid("color.drift_frames", "must be at least 1"));
        }
        if self.saturation_base < 0.0 || self.saturation_base + self.saturation_span > 1.0 {
            return Err(ConfigError::invalid(
                "color.saturation_span",
                "saturation must stay within 0..=1",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaletteMode {
    /// Locked on the current palette, tracking slowly
    Stable,
    /// Sustained drift seen, tracking fast toward the new material
    Adapting,
}

/// Slow-moving center for one mood axis.
pub struct PaletteStabilizer {
    axis: &'static str,
    center: f32,
    mode: PaletteMode,
    drift_counter: u32,
    drift_distance: f32,
    drift_frames: u32,
    stable_rate: f32,
    adapting_rate: f32,
}

impl PaletteStabilizer {
    pub fn new(axis: &'static str, config: &ColorConfig) -> Self {
        Self {
            axis,
            center: 0.5,
            mode: PaletteMode::Stable,
            drift_counter: 0,
            drift_distance: config.drift_distance,
            drift_frames: config.drift_frames,
            stable_rate: config.stable_rate,
            adapting_rate: config.adapting_rate,
        }
    }

    /// Feed one value, returns the updated center
    pub fn update(&mut self, value: f32) -> f32 {
        let value = clamp01(value);
        if (value - self.center).abs() > self.drift_distance {
            self.drift_counter = (self.drift_counter + 1).min(self.drift_frames * 2);
        } else {
            self.drift_counter = self.drift_counter.saturating_sub(1);
        }

        let next = match self.mode {
            PaletteMode::Stable if self.drift_counter > self.drift_frames => PaletteMode::Adapting,
            PaletteMode::Adapting if self.drift_counter == 0 => PaletteMode::Stable,
            mode => mode,
        };
        if next != self.mode {
            debug!(axis = self.axis, center = self.center, "palette {:?} -> {:?}", self.mode, next);
            self.mode = next;
        }

        let rate = match self.mode {
            PaletteMode::Stable => self.stable_rate,
            PaletteMode::Adapting => self.adapting_rate,
        };
        self.center += (value - self.center) * rate;
        self.center
    }

    pub fn center(&self) -> f32 {
        self.center
    }

    pub fn mode(&self) -> PaletteMode {
        self.mode
    }
}

/// Hue in degrees for a point on the arousal/valence plane.
///
/// The plane is split on the 0.5 axes; inside each quadrant the hue moves from
/// its near-center value to its far-corner value with the Manhattan distance
/// from the midpoint.
pub fn quadrant_hue(arousal: f32, valence: f32) -> f32 {
    let a = clamp01(arousal);
    let v = clamp01(valence);
    let t = ((a - 0.5).abs() + (v - 0.5).abs()).min(1.0);

    let (from, to) = match (a >= 0.5, v >= 0.5) {
        (true, true) => (30.0, 60.0),
        // red through to crimson, crossing 0
        (true, false) => (360.0, 340.0),
        (false, true) => (180.0, 120.0),
        (false, false) => (220.0, 275.0),
    };
    (from + (to - from) * t).rem_euclid(360.0)
}

pub struct ColorEngine {
    config: ColorConfig,
    arousal: PaletteStabilizer,
    valence: PaletteStabilizer,
    hue: HueEma,
    saturation: Ema,
}

impl ColorEngine {
    pub fn new(config: ColorConfig) -> Self {
        Self {
            arousal: PaletteStabilizer::new("arousal", &config),
            valence: PaletteStabilizer::new("valence", &config),
            hue: HueEma::new(config.hue_alpha),
            saturation: Ema::new(config.saturation_alpha),
            config,
        }
    }

    /// Color for the current mood, at full value.
    ///
    /// Brightness is applied by the caller.
    pub fn map_mood_to_color(&mut self, mood: &MoodState, tempo_confidence: f32) -> Color {
        let arousal = clamp01(mood.arousal);
        let valence = clamp01(mood.valence);
        let palette_arousal = self.arousal.update(arousal);
        let palette_valence = self.valence.update(valence);

        let w = self.config.palette_weight;
        let blended_arousal = palette_arousal * w + arousal * (1.0 - w);
        let blended_valence = palette_valence * w + valence * (1.0 - w);

        let hue_rate = self.hue.alpha() * (0.5 + 0.5 * clamp01(tempo_confidence));
        let hue = self
            .hue
            .update_with(quadrant_hue(blended_arousal, blended_valence), hue_rate);
        let saturation = self.saturation.update(
            self.config.saturation_base + self.config.saturation_span * palette_arousal,
        );

        Color::from_hsv(hue, saturation, 1.0)
    }

    pub fn hue(&self) -> f32 {
        self.hue.degrees()
    }

    pub fn saturation(&self) -> f32 {
        self.saturation.value()
    }

    pub fn palette(&self) -> (&PaletteStabilizer, &PaletteStabilizer) {
        (&self.arousal, &self.valence)
    }
}
