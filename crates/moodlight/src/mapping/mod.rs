pub mod color;
pub mod mood;

pub use color::{quadrant_hue, ColorConfig, ColorEngine, PaletteMode, PaletteStabilizer};
pub use mood::{MoodConfig, MoodEngine, MoodInputs};
