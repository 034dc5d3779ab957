pub mod brightness;
pub mod dynamics;
mod output;
pub mod pulse;

pub use brightness::{apply_pitch_brightness_bias, compose_brightness, OutputConfig};
pub use dynamics::{DynamicsConfig, DynamicsController};
pub use output::{ConsoleSink, JsonLinesSink};
pub use pulse::{PulseConfig, PulseTracker};
