//! Command-line argument parsing.

use clap::Parser;
use std::path::PathBuf;

use moodlight::audio::DeviceSelection;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "moodlight")]
#[command(about = "Music-reactive lighting from live or recorded audio", long_about = None)]
pub struct Args {
    /// Analyze a WAV file instead of capturing live input
    #[arg(long, value_name = "WAV")]
    pub file: Option<PathBuf>,

    /// Input device index (see --list-devices)
    #[arg(long, value_name = "INDEX", conflicts_with = "file")]
    pub device: Option<usize>,

    /// Print input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Analysis frames per second
    #[arg(long)]
    pub fps: Option<f32>,

    /// Session sample rate in Hz
    #[arg(long, value_name = "HZ")]
    pub sample_rate: Option<u32>,

    /// Treat the first frames as silence and calibrate the noise gate on them
    #[arg(long)]
    pub calibrate: bool,

    /// Emit one JSON object per frame instead of text
    #[arg(long)]
    pub json: bool,

    /// Pace file playback to the frame rate
    #[arg(long, requires = "file")]
    pub realtime: bool,

    /// Stop after this many frames
    #[arg(long, value_name = "N")]
    pub max_frames: Option<u64>,

    /// Config file (default: ~/.moodlight.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Device to capture from: index flag, then configured name, then default
    pub fn device_selection(&self, configured: Option<&str>) -> DeviceSelection {
        match (self.device, configured) {
            (Some(index), _) => DeviceSelection::Index(index),
            (None, Some(name)) => DeviceSelection::Name(name.to_string()),
            (None, None) => DeviceSelection::Default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_mode_flags() {
        let args = Args::parse_from([
            "moodlight",
            "--file",
            "song.wav",
            "--realtime",
            "--json",
            "--max-frames",
            "100",
        ]);
        assert_eq!(args.file.as_deref(), Some(std::path::Path::new("song.wav")));
        assert!(args.realtime && args.json);
        assert_eq!(args.max_frames, Some(100));
    }

    #[test]
    fn test_realtime_needs_file() {
        assert!(Args::try_parse_from(["moodlight", "--realtime"]).is_err());
    }

    #[test]
    fn test_device_selection_order() {
        let args = Args::parse_from(["moodlight", "--device", "2"]);
        assert!(matches!(
            args.device_selection(Some("Line In")),
            DeviceSelection::Index(2)
        ));

        let args = Args::parse_from(["moodlight"]);
        assert!(matches!(
            args.device_selection(Some("Line In")),
            DeviceSelection::Name(ref n) if n == "Line In"
        ));
        assert!(matches!(args.device_selection(None), DeviceSelection::Default));
    }
}
