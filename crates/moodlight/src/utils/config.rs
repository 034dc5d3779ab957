//! Configuration file management.
//!
//! Settings live in `~/.moodlight.toml`. Every key is optional; missing keys
//! fall back to the built-in defaults. A commented template is written on
//! first run.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::audio::features::OnsetConfig;
use crate::audio::gate::GateConfig;
use crate::audio::normalizer::NormalizerConfig;
use crate::audio::tempo::TempoConfig;
use crate::error::ConfigError;
use crate::lighting::brightness::OutputConfig;
use crate::lighting::dynamics::DynamicsConfig;
use crate::lighting::pulse::PulseConfig;
use crate::mapping::color::ColorConfig;
use crate::mapping::mood::MoodConfig;
use crate::pipeline::PipelineConfig;

const DEFAULT_FPS: f32 = 20.0;
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CALIBRATION_FRAMES: usize = 60;
const DEFAULT_DEVICE_TIMEOUT_SECS: u64 = 3;

const CONFIG_TEMPLATE: &str = r#"# moodlight configuration file

# Analysis frames per second (default: 20)
# fps = 20.0

# Capture sample rate in Hz, must be supported exactly by the device (default: 44100)
# sample_rate = 44100

# Frames of known silence consumed by --calibrate (default: 60, 3s at 20fps)
# calibration_frames = 60

# Input device name (default: system default input)
# device = "USB Audio"

# Timeout in seconds when querying device configs (default: 3)
# device_timeout_secs = 3

# =============================================================================
# Noise gate
# =============================================================================
# [gate]
# threshold_on = 0.0565        # RMS that opens the gate outright
# threshold_off = 0.0555       # RMS below which the close countdown starts
# min_music_rms = 0.056        # Quiet signal needs this much RMS plus flux
# flux_threshold = 2.0         # Spectral change that marks quiet music
# hold_frames = 40             # Frames tolerated below threshold_off (2s)

# =============================================================================
# Brightness normalizer
# =============================================================================
# [normalizer]
# initial_ceiling = 0.15
# decay_rate = 0.01            # Ceiling shrink rate between peaks
# gamma = 0.45                 # < 1 lifts quiet passages
# release_per_frame = 0.012    # Fade speed when the level drops

# [onset]
# floor = 0.032
# ceiling = 0.045

# =============================================================================
# Tempo
# =============================================================================
# [tempo]
# min_bpm = 60.0
# max_bpm = 180.0
# energy_decay = 0.97
# smoothing = 0.05

# [dynamics]
# low_enter = 0.15             # Short-term brightness that starts minimal mode
# low_exit = 0.20
# enter_hold_frames = 20
# peak_threshold = 0.65        # Drop detection
# surprise_threshold = 0.35
# drop_boost_frames = 10

# [pulse]
# peak_threshold = 0.6
# refractory_s = 0.12
# decay_s = 0.18

# =============================================================================
# Mood and color
# =============================================================================
# [mood]
# learning_rate = 0.005        # Adaptation to the song's spectral balance
# pulse_weight = 0.0           # Extra arousal from the beat pulse

# [color]
# palette_weight = 0.6
# drift_frames = 20
# hue_alpha = 0.12

# [output]
# register_bias = 0.07
# minimal_scale = 0.6
# pulse_gain = 0.15
# drop_boost = 0.2
"#;

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub fps: Option<f32>,
    pub sample_rate: Option<u32>,
    pub calibration_frames: Option<usize>,
    pub device: Option<String>,
    pub device_timeout_secs: Option<u64>,

    pub gate: GateConfig,
    pub normalizer: NormalizerConfig,
    pub onset: OnsetConfig,
    pub tempo: TempoConfig,
    pub dynamics: DynamicsConfig,
    pub pulse: PulseConfig,
    pub mood: MoodConfig,
    pub color: ColorConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".moodlight.toml"))
    }

    /// Load `~/.moodlight.toml`, writing the template first if it is missing.
    /// An unreadable default file falls back to defaults; an explicit path
    /// given to [`Config::load_from`] fails instead.
    pub fn load() -> Self {
        let path = match Self::path() {
            Some(p) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            match fs::write(&path, CONFIG_TEMPLATE) {
                Ok(()) => info!("created config template at {:?}", path),
                Err(e) => {
                    warn!("could not write config template to {:?}: {}", path, e);
                    return Self::default();
                }
            }
        }

        Self::load_from(&path).unwrap_or_else(|e| {
            warn!("{}, using defaults", e);
            Self::default()
        })
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn fps(&self) -> f32 {
        self.fps.unwrap_or(DEFAULT_FPS)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn calibration_frames(&self) -> usize {
        self.calibration_frames.unwrap_or(DEFAULT_CALIBRATION_FRAMES)
    }

    pub fn device_timeout_secs(&self) -> u64 {
        self.device_timeout_secs
            .unwrap_or(DEFAULT_DEVICE_TIMEOUT_SECS)
    }

    /// Engine settings for a pipeline, validated
    pub fn pipeline(&self) -> Result<PipelineConfig, ConfigError> {
        let config = PipelineConfig {
            fps: self.fps(),
            sample_rate: self.sample_rate(),
            gate: self.gate,
            normalizer: self.normalizer,
            onset: self.onset,
            tempo: self.tempo,
            dynamics: self.dynamics,
            pulse: self.pulse,
            mood: self.mood,
            color: self.color,
            output: self.output,
        };
        config.validate()?;
        Ok(config)
    }
}
