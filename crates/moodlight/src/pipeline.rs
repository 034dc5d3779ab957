//! Per-frame orchestration of every engine.
//!
//! One [`Pipeline`] owns one instance of each stage and threads a frame
//! through them in order: features, gate + normalizer, tempo / dynamics /
//! pulse, mood, color, final brightness.

use moodlight_api::{
    frame_size, AudioFrame, DynamicsState, FrameSource, LightFrame, MoodState, PulseState,
    RenderFlow, RenderSink, SpectralBands, TempoState,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audio::features::{
    normalize_onset, onset_strength, rms_loudness, OnsetConfig, SpectrumAnalyzer,
};
use crate::audio::gate::{Calibration, GateConfig};
use crate::audio::normalizer::{AdaptiveNormalizer, NormalizerConfig};
use crate::audio::tempo::{ResonatorBpm, TempoConfig};
use crate::error::{ConfigError, Result, SourceError};
use crate::lighting::brightness::{compose_brightness, OutputConfig};
use crate::lighting::dynamics::{DynamicsConfig, DynamicsController};
use crate::lighting::pulse::{PulseConfig, PulseTracker};
use crate::mapping::color::{ColorConfig, ColorEngine};
use crate::mapping::mood::{MoodConfig, MoodEngine, MoodInputs};
use crate::utils::smoothing::TimeWindow;

const SHORT_WINDOW_FRAMES: usize = 5;
const MID_WINDOW_FRAMES: usize = 20;

/// Everything needed to build a [`Pipeline`]
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fps: f32,
    pub sample_rate: u32,
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

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fps: 20.0,
            sample_rate: 44100,
            gate: GateConfig::default(),
            normalizer: NormalizerConfig::default(),
            onset: OnsetConfig::default(),
            tempo: TempoConfig::default(),
            dynamics: DynamicsConfig::default(),
            pulse: PulseConfig::default(),
            mood: MoodConfig::default(),
            color: ColorConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(ConfigError::NonPositiveFps(self.fps));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate);
        }
        if self.frame_size() < 2 {
            return Err(ConfigError::invalid(
                "fps",
                format!("frames at {} fps hold fewer than 2 samples", self.fps),
            ));
        }
        self.gate.validate()?;
        self.normalizer.validate()?;
        self.onset.validate()?;
        self.tempo.validate()?;
        self.dynamics.validate()?;
        self.pulse.validate()?;
        self.mood.validate()?;
        self.color.validate()?;
        self.output.validate()
    }

    /// Samples per frame for this session
    pub fn frame_size(&self) -> usize {
        frame_size(self.sample_rate, self.fps)
    }
}

/// Output of one processed frame plus every intermediate state.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct FrameReport {
    pub light: LightFrame,
    pub rms: f32,
    /// Normalized onset fed downstream (0 while the gate is closed)
    pub onset: f32,
    /// Normalizer output before the rhythm and dynamics layers
    pub base_brightness: f32,
    /// Mean base brightness over the last second-ish
    pub mid_brightness: f32,
    pub gate_open: bool,
    pub bands: SpectralBands,
    pub tempo: TempoState,
    pub dynamics: DynamicsState,
    pub pulse: PulseState,
    pub mood: MoodState,
}

pub struct Pipeline {
    config: PipelineConfig,
    frame_size: usize,
    spectrum: SpectrumAnalyzer,
    normalizer: AdaptiveNormalizer,
    tempo: ResonatorBpm,
    dynamics: DynamicsController,
    pulse: PulseTracker,
    mood: MoodEngine,
    color: ColorEngine,
    instant: TimeWindow,
    short: TimeWindow,
    mid: TimeWindow,
    frames: u64,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let fps = config.fps;

        Ok(Self {
            frame_size: config.frame_size(),
            spectrum: SpectrumAnalyzer::new(false),
            normalizer: AdaptiveNormalizer::new(config.normalizer, config.gate),
            tempo: ResonatorBpm::new(config.tempo, fps),
            dynamics: DynamicsController::new(config.dynamics),
            pulse: PulseTracker::new(config.pulse, fps),
            mood: MoodEngine::new(config.mood),
            color: ColorEngine::new(config.color),
            instant: TimeWindow::new(1),
            short: TimeWindow::new(SHORT_WINDOW_FRAMES),
            mid: TimeWindow::new(MID_WINDOW_FRAMES),
            frames: 0,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    /// Learn the noise floor from frames known to be silence.
    pub fn calibrate(&mut self, frames: &[AudioFrame]) -> Option<Calibration> {
        self.normalizer.calibrate(frames)
    }

    /// Pull `count` frames from `source` and calibrate on the ones that fit
    /// the session
    pub fn calibrate_from<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        count: usize,
    ) -> Option<Calibration> {
        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            match source.next_frame() {
                Some(frame) if self.accepts(&frame) => frames.push(frame),
                Some(frame) => self.reject(&frame),
                None => break,
            }
        }
        info!("calibrating on {} frames of silence", frames.len());
        self.calibrate(&frames)
    }

    fn accepts(&self, frame: &AudioFrame) -> bool {
        frame.sample_rate() == self.config.sample_rate && frame.len() == self.frame_size
    }

    fn reject(&self, frame: &AudioFrame) {
        warn!(
            "skipping frame: {} samples at {} Hz, expected {} at {} Hz",
            frame.len(),
            frame.sample_rate(),
            self.frame_size,
            self.config.sample_rate
        );
    }

    /// Run one frame through every stage.
    pub fn process(&mut self, frame: &AudioFrame) -> FrameReport {
        let samples = frame.samples();
        let rms = rms_loudness(samples);
        let raw_onset = onset_strength(samples);
        let bands = self.spectrum.bands(samples, frame.sample_rate());

        let base = self.normalizer.normalize(rms, samples);
        let gate_open = self.normalizer.gate().is_open();
        let onset = if gate_open {
            normalize_onset(raw_onset, &self.config.onset)
        } else {
            0.0
        };

        self.instant.push(base);
        self.short.push(base);
        self.mid.push(base);
        let dynamics = self
            .dynamics
            .update(self.instant.latest(), self.short.average());

        let tempo = self.tempo.update(onset);
        let pulse = self.pulse.update(onset);

        let mood = self.mood.update(&MoodInputs {
            loudness: base,
            onset,
            pulse: pulse.pulse,
            density: tempo.density,
            bands,
        });
        let color = self.color.map_mood_to_color(&mood, tempo.confidence);
        let brightness = compose_brightness(
            base,
            bands.dominant(),
            dynamics,
            pulse.pulse,
            &self.config.output,
        );

        self.frames += 1;
        if self.frames % (self.config.fps.round().max(1.0) as u64) == 0 {
            debug!(
                bpm = tempo.bpm,
                confidence = tempo.confidence,
                arousal = mood.arousal,
                valence = mood.valence,
                brightness,
                "frame {}",
                self.frames
            );
        }

        FrameReport {
            light: LightFrame { color, brightness },
            rms,
            onset,
            base_brightness: base,
            mid_brightness: self.mid.average(),
            gate_open,
            bands,
            tempo,
            dynamics,
            pulse,
            mood,
        }
    }

    /// Drive `sink` from `source` until either side ends or `max_frames`
    /// frames were processed. Returns the number of processed frames.
    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K, max_frames: Option<u64>) -> Result<u64>
    where
        S: FrameSource + ?Sized,
        K: RenderSink + ?Sized,
    {
        if source.sample_rate() != self.config.sample_rate {
            return Err(SourceError::UnsupportedSampleRate {
                requested: self.config.sample_rate,
                actual: format!("{} Hz", source.sample_rate()),
            }
            .into());
        }

        let mut processed = 0u64;
        while max_frames.map_or(true, |max| processed < max) {
            let Some(frame) = source.next_frame() else {
                debug!("source exhausted");
                break;
            };
            if !self.accepts(&frame) {
                self.reject(&frame);
                continue;
            }

            let report = self.process(&frame);
            processed += 1;
            if sink.render(&report.light)? == RenderFlow::Stop {
                debug!("sink requested stop");
                break;
            }
        }

        info!("processed {} frames", processed);
        Ok(processed)
    }
}
