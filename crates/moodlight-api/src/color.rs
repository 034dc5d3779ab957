//! Output color types

use serde::{Deserialize, Serialize};

/// 8-bit RGB color
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    /// Convert HSV to RGB.
    ///
    /// `hue` is in degrees and wrapped into [0, 360); `saturation` and `value`
    /// are clamped to [0, 1].
    pub fn from_hsv(hue: f32, saturation: f32, value: f32) -> Self {
        let h = if hue.is_finite() {
            hue.rem_euclid(360.0)
        } else {
            0.0
        };
        let s = clamp01(saturation);
        let v = clamp01(value);

        let c = v * s;
        let sector = h / 60.0;
        let x = c * (1.0 - (sector % 2.0 - 1.0).abs());
        let m = v - c;

        let (r, g, b) = match sector as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        Self {
            r: to_channel(r + m),
            g: to_channel(g + m),
            b: to_channel(b + m),
        }
    }

    /// Scale every channel by `brightness` (clamped to [0, 1])
    pub fn scaled(self, brightness: f32) -> Self {
        let k = clamp01(brightness);
        Self {
            r: to_channel(self.r as f32 / 255.0 * k),
            g: to_channel(self.g as f32 / 255.0 * k),
            b: to_channel(self.b as f32 / 255.0 * k),
        }
    }
}

/// What the render sink receives once per processed frame.
///
/// Brightness travels next to the color; it is not baked into it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LightFrame {
    pub color: Color,
    pub brightness: f32,
}

impl LightFrame {
    /// Color with brightness applied, as a dimmable lamp would show it
    pub fn applied(&self) -> Color {
        self.color.scaled(self.brightness)
    }
}

fn clamp01(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

fn to_channel(v: f32) -> u8 {
    (clamp01(v) * 255.0).round() as u8
}
