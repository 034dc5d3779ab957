//! Live audio capture.
//!
//! Opens an input device with cpal at the exact session sample rate, down-mixes
//! in the audio callback and hands chunks to the analysis thread over a
//! channel. Frames are cut from the stream with their DC offset removed.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};
use moodlight_api::{frame_size, AudioFrame, FrameSource};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::SourceError;

pub struct DeviceInfo {
    pub device: Device,
    pub name: String,
}

/// Which input device to capture from
#[derive(Clone, Debug, Default)]
pub enum DeviceSelection {
    #[default]
    Default,
    Index(usize),
    Name(String),
}

pub struct SourcePipe {
    receiver: Receiver<Vec<f32>>,
    assembler: FrameAssembler,
    sample_rate: u32,
    _stream: Stream,
}

impl SourcePipe {
    pub fn open(
        selection: &DeviceSelection,
        sample_rate: u32,
        fps: f32,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let frame_size = frame_size(sample_rate, fps);
        if frame_size == 0 {
            return Err(SourceError::InvalidFps(fps));
        }

        let info = Self::select_device(selection)?;
        let (stream_config, channels) = Self::find_config(&info.device, sample_rate, timeout)?;

        let (tx, rx) = mpsc::channel();
        let err_fn = |err| error!("audio stream error: {}", err);
        let stream = info
            .device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // receiver gone means the session is over
                    let _ = tx.send(downmix(data, channels));
                },
                err_fn,
                None,
            )
            .map_err(|e| SourceError::Device(e.to_string()))?;
        stream
            .play()
            .map_err(|e| SourceError::Device(e.to_string()))?;

        info!(
            "capturing from {} ({} ch @ {} Hz, {} samples per frame)",
            info.name, channels, sample_rate, frame_size
        );

        Ok(Self {
            receiver: rx,
            assembler: FrameAssembler::new(frame_size),
            sample_rate,
            _stream: stream,
        })
    }

    /// Print every input device with the index accepted by `--device`
    pub fn list_devices() {
        println!("\n=== Input Devices ===");
        for (idx, info) in Self::collect_devices().iter().enumerate() {
            println!("  [{}] {}", idx, info.name);
        }
        println!();
    }

    fn collect_devices() -> Vec<DeviceInfo> {
        let host = cpal::default_host();
        let mut devices = Vec::new();

        if let Ok(input_devices) = host.input_devices() {
            for device in input_devices {
                if let Ok(name) = device.name() {
                    devices.push(DeviceInfo { device, name });
                }
            }
        }

        devices
    }

    fn select_device(selection: &DeviceSelection) -> Result<DeviceInfo, SourceError> {
        let mut devices = Self::collect_devices();
        let index = match selection {
            DeviceSelection::Index(i) => Some(*i).filter(|&i| i < devices.len()),
            DeviceSelection::Name(name) => devices.iter().position(|d| d.name == *name),
            DeviceSelection::Default => None,
        };

        if let Some(i) = index {
            return Ok(devices.swap_remove(i));
        }
        if !matches!(selection, DeviceSelection::Default) {
            warn!("device {:?} not found, using default input", selection);
        }

        let device = cpal::default_host()
            .default_input_device()
            .ok_or(SourceError::NoDevice)?;
        let name = device.name().unwrap_or_else(|_| "default".to_string());
        Ok(DeviceInfo { device, name })
    }

    /// Query supported configs with a timeout (the call hangs on some bad
    /// devices) and pick an f32 one that runs at exactly `sample_rate`.
    fn find_config(
        device: &Device,
        sample_rate: u32,
        timeout: Duration,
    ) -> Result<(StreamConfig, usize), SourceError> {
        let device_clone = device.clone();
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let configs = device_clone
                .supported_input_configs()
                .map(|c| c.collect::<Vec<_>>())
                .map_err(|e| e.to_string());
            let _ = tx.send(configs);
        });

        let ranges = match rx.recv_timeout(timeout) {
            Ok(Ok(ranges)) => ranges,
            Ok(Err(e)) => return Err(SourceError::Device(e)),
            Err(_) => return Err(SourceError::DeviceTimeout(timeout)),
        };

        let config = pick_config(&ranges, sample_rate).ok_or_else(|| {
            SourceError::UnsupportedSampleRate {
                requested: sample_rate,
                actual: describe_ranges(&ranges),
            }
        })?;
        let channels = config.channels.max(1) as usize;
        Ok((config, channels))
    }
}

impl FrameSource for SourcePipe {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_size(&self) -> usize {
        self.assembler.frame_size()
    }

    /// Blocks until a full frame has been captured; `None` once the stream
    /// has shut down.
    fn next_frame(&mut self) -> Option<AudioFrame> {
        loop {
            if let Some(mut samples) = self.assembler.pop_frame() {
                remove_dc(&mut samples);
                return Some(AudioFrame::new(samples, self.sample_rate));
            }
            match self.receiver.recv() {
                Ok(chunk) => self.assembler.push(&chunk),
                Err(_) => return None,
            }
        }
    }
}

fn pick_config(ranges: &[SupportedStreamConfigRange], sample_rate: u32) -> Option<StreamConfig> {
    let rate = SampleRate(sample_rate);
    ranges
        .iter()
        .filter(|r| r.sample_format() == SampleFormat::F32)
        .find(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .map(|r| r.clone().with_sample_rate(rate).config())
}

fn describe_ranges(ranges: &[SupportedStreamConfigRange]) -> String {
    if ranges.is_empty() {
        return "no input configs".to_string();
    }
    ranges
        .iter()
        .map(|r| {
            format!(
                "{:?} {}-{} Hz",
                r.sample_format(),
                r.min_sample_rate().0,
                r.max_sample_rate().0
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Average interleaved channels into mono
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    let channels = channels.max(1);
    data.chunks(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
        .collect()
}

/// Subtract the frame mean
fn remove_dc(samples: &mut [f32]) {
    if samples.is_empty() {
        return;
    }
    let mean = samples.iter().sum::<f32>() / samples.len() as f32;
    samples.iter_mut().for_each(|s| *s -= mean);
}

/// Cuts an arbitrary chunk stream into fixed-size frames
struct FrameAssembler {
    pending: VecDeque<f32>,
    frame_size: usize,
}

impl FrameAssembler {
    fn new(frame_size: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(frame_size * 2),
            frame_size,
        }
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn push(&mut self, chunk: &[f32]) {
        self.pending.extend(chunk.iter().copied());
    }

    fn pop_frame(&mut self) -> Option<Vec<f32>> {
        if self.pending.len() < self.frame_size {
            return None;
        }
        Some(self.pending.drain(..self.frame_size).collect())
    }
}
