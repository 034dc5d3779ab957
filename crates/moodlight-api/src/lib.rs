//! Shared value types for moodlight
//!
//! This crate holds the plain data that crosses the boundary between the
//! analysis core and its collaborators: audio frames coming in, light frames
//! going out, and the per-engine state snapshots emitted every frame.

pub mod audio;
pub mod color;
pub mod io;

pub use audio::{
    frame_size, AudioFrame, DynamicsState, MoodState, PitchRegister, PulseState, SpectralBands,
    TempoState,
};
pub use color::{Color, LightFrame};
pub use io::{FrameSource, RenderFlow, RenderSink};
