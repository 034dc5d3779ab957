//! Minimal mode and drop boost.
//!
//! Two independent hysteresis mechanisms driven by a fast (instant) and a
//! smoothed (short) brightness signal:
//! - Drop boost is an event: a loud frame well above the recent average arms
//!   a fixed number of boost frames.
//! - Minimal mode is a trend: it needs a run of quiet frames to enter and
//!   leaves as soon as the short average climbs past a higher exit level.

use moodlight_api::DynamicsState;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicsConfig {
    /// Short average below this counts as a low frame
    pub low_enter: f32,
    /// Short average above this leaves minimal mode
    pub low_exit: f32,
    /// Consecutive low frames needed to enter minimal mode
    pub enter_hold_frames: u32,
    /// Instant brightness needed for a drop
    pub peak_threshold: f32,
    /// Instant minus short brightness needed for a drop
    pub surprise_threshold: f32,
    /// Boost duration in frames
    pub drop_boost_frames: u32,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            low_enter: 0.15,
            low_exit: 0.20,
            enter_hold_frames: 20,
            peak_threshold: 0.65,
            surprise_threshold: 0.35,
            drop_boost_frames: 10,
        }
    }
}

impl DynamicsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.low_exit < self.low_enter {
            return Err(ConfigError::invalid(
                "dynamics.low_exit",
                format!(
                    "must not be below low_enter ({} < {})",
                    self.low_exit, self.low_enter
                ),
            ));
        }
        Ok(())
    }
}

pub struct DynamicsController {
    config: DynamicsConfig,
    state: DynamicsState,
    low_counter: u32,
}

impl DynamicsController {
    pub fn new(config: DynamicsConfig) -> Self {
        Self {
            config,
            state: DynamicsState::default(),
            low_counter: 0,
        }
    }

    pub fn update(&mut self, instant_brightness: f32, short_brightness: f32) -> DynamicsState {
        if self.state.drop_boost_frames_left > 0 {
            self.state.drop_boost_frames_left -= 1;
        }

        if self.is_drop(instant_brightness, short_brightness) {
            if self.state.drop_boost_frames_left == 0 {
                debug!(instant_brightness, short_brightness, "drop detected");
            }
            self.state.drop_boost_frames_left = self.config.drop_boost_frames;
        }

        if short_brightness < self.config.low_enter {
            self.low_counter = self.low_counter.saturating_add(1);
        } else {
            self.low_counter = 0;
        }

        if !self.state.minimal_mode && self.low_counter >= self.config.enter_hold_frames {
            self.state.minimal_mode = true;
            debug!("minimal mode entered");
        } else if self.state.minimal_mode && short_brightness > self.config.low_exit {
            self.state.minimal_mode = false;
            self.low_counter = 0;
            debug!("minimal mode left");
        }

        self.state
    }

    fn is_drop(&self, instant: f32, short: f32) -> bool {
        let surprise = instant - short;
        instant >= self.config.peak_threshold && surprise >= self.config.surprise_threshold
    }

    pub fn state(&self) -> DynamicsState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_fires_on_exact_frame() {
        let mut dyn_ctl = DynamicsController::new(DynamicsConfig::default());
        for _ in 0..5 {
            dyn_ctl.update(0.4, 0.4);
        }
        let state = dyn_ctl.update(0.95, 0.40);
        assert_eq!(state.drop_boost_frames_left, 10);
    }

    #[test]
    fn test_drop_boost_counts_down_and_does_not_stack() {
        let mut dyn_ctl = DynamicsController::new(DynamicsConfig::default());
        dyn_ctl.update(0.95, 0.4);
        let state = dyn_ctl.update(0.95, 0.4);
        assert_eq!(state.drop_boost_frames_left, 10, "re-fire resets, never adds");

        let mut left = 10;
        for _ in 0..15 {
            let s = dyn_ctl.update(0.5, 0.5);
            left = s.drop_boost_frames_left;
        }
        assert_eq!(left, 0);
    }

    #[test]
    fn test_no_drop_without_surprise() {
        let mut dyn_ctl = DynamicsController::new(DynamicsConfig::default());
        let state = dyn_ctl.update(0.95, 0.8);
        assert_eq!(state.drop_boost_frames_left, 0);
    }

    #[test]
    fn test_minimal_mode_needs_hold_and_exits_immediately() {
        let mut dyn_ctl = DynamicsController::new(DynamicsConfig::default());
        for _ in 0..19 {
            assert!(!dyn_ctl.update(0.1, 0.1).minimal_mode);
        }
        assert!(dyn_ctl.update(0.1, 0.1).minimal_mode);

        // between the thresholds: stays minimal
        assert!(dyn_ctl.update(0.18, 0.18).minimal_mode);
        assert!(!dyn_ctl.update(0.3, 0.25).minimal_mode);
    }

    #[test]
    fn test_interrupted_low_run_restarts_count() {
        let mut dyn_ctl = DynamicsController::new(DynamicsConfig::default());
        for _ in 0..15 {
            dyn_ctl.update(0.1, 0.1);
        }
        dyn_ctl.update(0.3, 0.3);
        for _ in 0..15 {
            assert!(!dyn_ctl.update(0.1, 0.1).minimal_mode);
        }
    }
}
