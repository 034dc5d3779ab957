//! Music-reactive lighting.
//!
//! Turns a stream of fixed-size mono audio frames into one color and one
//! brightness per frame. Each stage is a small single-owner state machine;
//! [`Pipeline`] wires them together:
//!
//! ```text
//! features -> gate/normalizer -> tempo, dynamics, pulse -> mood -> color
//! ```

pub mod audio;
pub mod error;
pub mod lighting;
pub mod mapping;
pub mod pipeline;
pub mod utils;

pub use error::{ConfigError, Error, Result, SourceError};
pub use moodlight_api as api;
pub use pipeline::{FrameReport, Pipeline, PipelineConfig};
