pub mod features;
mod file_source;
pub mod gate;
pub mod normalizer;
mod source_pipe;
pub mod tempo;

pub use features::{
    dominant_register, normalize_onset, onset_strength, rms_loudness, spectral_energy_bands,
    OnsetConfig,
};
pub use file_source::{RealtimePacer, WavFileSource};
pub use gate::{Calibration, GateConfig, GateState, NoiseGate};
pub use normalizer::{AdaptiveNormalizer, NormalizerConfig};
pub use source_pipe::{DeviceSelection, SourcePipe};
pub use tempo::{ResonatorBpm, TempoConfig};
