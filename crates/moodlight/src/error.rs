//! Error types for configuration and frame acquisition.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid setup detected before any frame is processed
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("fps must be positive and finite, got {0}")]
    NonPositiveFps(f32),

    #[error("sample rate must be positive")]
    InvalidSampleRate,

    #[error("invalid tempo range: min_bpm={min} max_bpm={max}")]
    InvalidTempoRange { min: f32, max: f32 },

    #[error("gate threshold_on ({on}) must not be below threshold_off ({off})")]
    InvalidGateThresholds { on: f32, off: f32 },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Failure to open or read a frame source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("sample rate {requested} Hz not available (source runs at {actual})")]
    UnsupportedSampleRate { requested: u32, actual: String },

    #[error("no audio input device found")]
    NoDevice,

    #[error("device config query timed out after {0:?}")]
    DeviceTimeout(std::time::Duration),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    #[error("frame rate must be positive, got {0}")]
    InvalidFps(f32),
}

/// Top-level error
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("render sink failed: {0}")]
    Sink(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
