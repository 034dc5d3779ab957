mod config;
pub mod smoothing;

pub use config::Config;
