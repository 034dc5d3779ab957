//! Audio frame and per-frame analysis snapshot types

use serde::{Deserialize, Serialize};

/// One fixed-size block of mono samples.
///
/// All frames of a session share the same length and sample rate. A frame is
/// immutable once produced.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// A frame of `len` zero samples
    pub fn silent(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; len], sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Number of samples per frame for a session: `round(sample_rate / fps)`
pub fn frame_size(sample_rate: u32, fps: f32) -> usize {
    if fps <= 0.0 || !fps.is_finite() {
        return 0;
    }
    (sample_rate as f32 / fps).round() as usize
}

/// Share of spectral energy in the low (20-250 Hz), mid (250-2000 Hz) and
/// high (2-8 kHz) registers. The three shares sum to 1.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectralBands {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl SpectralBands {
    /// Equal split used when a frame carries no measurable energy
    pub const NEUTRAL: SpectralBands = SpectralBands {
        low: 1.0 / 3.0,
        mid: 1.0 / 3.0,
        high: 1.0 / 3.0,
    };

    pub fn sum(&self) -> f32 {
        self.low + self.mid + self.high
    }

    /// Register holding the largest share. Ties resolve toward Mid, then Low.
    pub fn dominant(&self) -> PitchRegister {
        if self.mid >= self.low && self.mid >= self.high {
            PitchRegister::Mid
        } else if self.low >= self.high {
            PitchRegister::Low
        } else {
            PitchRegister::High
        }
    }
}

impl Default for SpectralBands {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Coarse pitch register of a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PitchRegister {
    Low,
    Mid,
    High,
}

/// Tempo estimate emitted every frame
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TempoState {
    /// Smoothed tempo, always inside the configured BPM range
    pub bpm: f32,
    /// How strongly one resonator dominates the bank (0-1)
    pub confidence: f32,
    /// Whether confidence is above 0.5
    pub is_stable: bool,
    /// Onset density: 0 = sparse (~1s between onsets), 1 = busy (~100ms)
    pub density: f32,
}

impl Default for TempoState {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            confidence: 0.0,
            is_stable: false,
            density: 0.0,
        }
    }
}

/// Minimal mode and drop boost status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicsState {
    /// Sustained low energy detected
    pub minimal_mode: bool,
    /// Remaining frames of boost after a detected drop
    pub drop_boost_frames_left: u32,
}

/// Rhythmic pulse derived from beat detection
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PulseState {
    /// Decaying pulse value (0-1), jumps on each beat
    pub pulse: f32,
    /// Smoothed time between beats in seconds (0 until two beats were seen)
    pub beat_interval_s: f32,
}

/// Mood estimate on the arousal/valence plane
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoodState {
    /// 0 = calm, 1 = energetic
    pub arousal: f32,
    /// 0 = dark/cool, 1 = bright/warm
    pub valence: f32,
}

impl Default for MoodState {
    fn default() -> Self {
        Self {
            arousal: 0.0,
            valence: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_rounds() {
        assert_eq!(frame_size(44100, 20.0), 2205);
        assert_eq!(frame_size(44100, 30.0), 1470);
        assert_eq!(frame_size(48000, 0.0), 0);
    }

    #[test]
    fn test_dominant_register() {
        let bands = SpectralBands {
            low: 0.7,
            mid: 0.2,
            high: 0.1,
        };
        assert_eq!(bands.dominant(), PitchRegister::Low);
        assert_eq!(SpectralBands::NEUTRAL.dominant(), PitchRegister::Mid);
    }
}
