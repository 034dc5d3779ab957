//! Beat pulse from the onset signal.
//!
//! A beat is a rising onset peak above threshold outside the refractory
//! window. Each beat tops the pulse up to 1.0; between beats it decays
//! geometrically. The time between beats is smoothed into `beat_interval_s`.

use moodlight_api::PulseState;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::utils::smoothing::clamp01;

/// Pulse values below this snap to zero
const PULSE_FLOOR: f32 = 0.001;

/// Beats further apart than this do not update the interval
const MAX_BEAT_INTERVAL_S: f32 = 2.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Onset level a peak must reach
    pub peak_threshold: f32,
    /// Dead time after a beat, in seconds
    pub refractory_s: f32,
    /// Approximate pulse decay time, in seconds
    pub decay_s: f32,
    /// EMA rate for the beat interval
    pub interval_alpha: f32,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            peak_threshold: 0.60,
            refractory_s: 0.12,
            decay_s: 0.18,
            interval_alpha: 0.25,
        }
    }
}

impl PulseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refractory_s < 0.0 || self.decay_s < 0.0 {
            return Err(ConfigError::invalid(
                "pulse.refractory_s",
                "durations must not be negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.interval_alpha) {
            return Err(ConfigError::invalid(
                "pulse.interval_alpha",
                "must be within 0..=1",
            ));
        }
        Ok(())
    }
}

pub struct PulseTracker {
    config: PulseConfig,
    fps: f32,
    refractory_frames: u32,
    decay_factor: f32,
    state: PulseState,
    refractory_left: u32,
    frames_since_beat: u32,
    last_onset: f32,
}

impl PulseTracker {
    pub fn new(config: PulseConfig, fps: f32) -> Self {
        let fps = fps.max(f32::EPSILON);
        let refractory_frames = ((config.refractory_s * fps) as u32).max(1);
        let decay_frames = ((config.decay_s * fps) as u32).max(1);

        Self {
            config,
            fps,
            refractory_frames,
            decay_factor: 1.0 - 1.0 / decay_frames as f32,
            state: PulseState::default(),
            refractory_left: 0,
            frames_since_beat: u32::MAX,
            last_onset: 0.0,
        }
    }

    pub fn update(&mut self, onset: f32) -> PulseState {
        let onset = clamp01(onset);

        if self.state.pulse > 0.0 {
            self.state.pulse *= self.decay_factor;
            if self.state.pulse < PULSE_FLOOR {
                self.state.pulse = 0.0;
            }
        }
        self.refractory_left = self.refractory_left.saturating_sub(1);
        self.frames_since_beat = self.frames_since_beat.saturating_add(1);

        if self.is_peak(onset) {
            self.on_beat();
        }

        self.last_onset = onset;
        self.state
    }

    fn is_peak(&self, onset: f32) -> bool {
        self.refractory_left == 0
            && onset >= self.config.peak_threshold
            && onset > self.last_onset
    }

    fn on_beat(&mut self) {
        let interval_s = self.frames_since_beat as f32 / self.fps;
        if interval_s > 0.0 && interval_s < MAX_BEAT_INTERVAL_S {
            if self.state.beat_interval_s == 0.0 {
                self.state.beat_interval_s = interval_s;
            } else {
                let a = self.config.interval_alpha;
                self.state.beat_interval_s = (1.0 - a) * self.state.beat_interval_s + a * interval_s;
            }
        }

        self.frames_since_beat = 0;
        self.refractory_left = self.refractory_frames;
        self.state.pulse = (self.state.pulse + 1.0).min(1.0);
    }

    pub fn state(&self) -> PulseState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FPS: f32 = 20.0;

    #[test]
    fn test_beats_half_second_apart() {
        let mut tracker = PulseTracker::new(PulseConfig::default(), FPS);
        let mut beats = 0;
        let mut state = tracker.state();
        for n in 0..100 {
            let onset = if n % 10 == 0 { 0.9 } else { 0.0 };
            let before = tracker.state().pulse;
            state = tracker.update(onset);
            if onset > 0.0 && state.pulse == 1.0 && before < 1.0 {
                beats += 1;
            }
        }
        assert_eq!(beats, 10);
        assert!((state.beat_interval_s - 0.5).abs() < 1e-4, "interval {}", state.beat_interval_s);
    }

    #[test]
    fn test_first_beat_does_not_set_interval() {
        let mut tracker = PulseTracker::new(PulseConfig::default(), FPS);
        let state = tracker.update(0.9);
        assert_eq!(state.pulse, 1.0);
        assert_eq!(state.beat_interval_s, 0.0);
    }

    #[test]
    fn test_sustained_onset_does_not_retrigger() {
        let mut tracker = PulseTracker::new(PulseConfig::default(), FPS);
        tracker.update(0.9);
        let mut prev = 1.0;
        for _ in 0..8 {
            let state = tracker.update(0.9);
            assert!(state.pulse < prev, "pulse must keep decaying while onset is flat");
            prev = state.pulse;
        }
    }

    #[test]
    fn test_rising_onset_inside_refractory_window_ignored() {
        let mut tracker = PulseTracker::new(PulseConfig::default(), FPS);
        tracker.update(0.7);
        // refractory is 2 frames at 20 fps
        let state = tracker.update(0.8);
        assert!(state.pulse < 1.0);
        assert_eq!(state.beat_interval_s, 0.0);
    }

    #[test]
    fn test_pulse_decays_to_zero() {
        let mut tracker = PulseTracker::new(PulseConfig::default(), FPS);
        tracker.update(1.0);
        let mut state = tracker.state();
        for _ in 0..200 {
            state = tracker.update(0.0);
        }
        assert_eq!(state.pulse, 0.0);
    }

    #[test]
    fn test_interval_tracks_tempo_change() {
        let mut tracker = PulseTracker::new(PulseConfig::default(), FPS);
        let mut state = tracker.state();
        for n in 0..200 {
            let onset = if n % 10 == 0 { 0.9 } else { 0.0 };
            state = tracker.update(onset);
        }
        for n in 0..200 {
            let onset = if n % 8 == 0 { 0.9 } else { 0.0 };
            state = tracker.update(onset);
        }
        assert!((state.beat_interval_s - 0.4).abs() < 0.01, "interval {}", state.beat_interval_s);
    }
}
