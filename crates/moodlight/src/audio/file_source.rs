//! WAV file playback as a frame source.

use hound::{SampleFormat, WavReader};
use moodlight_api::{frame_size, AudioFrame, FrameSource};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::error::SourceError;

/// Reads fixed-size mono frames from a WAV stream.
///
/// Channels are averaged, integer PCM is scaled to [-1, 1) and the last
/// partial frame is zero-padded. No resampling: the file must already run at
/// the session rate.
pub struct WavFileSource<R: Read> {
    reader: WavReader<R>,
    sample_rate: u32,
    frame_size: usize,
    channels: usize,
    format: SampleFormat,
    int_scale: f32,
    finished: bool,
}

impl WavFileSource<BufReader<File>> {
    pub fn open(path: &Path, sample_rate: u32, fps: f32) -> Result<Self, SourceError> {
        let reader = WavReader::open(path)?;
        let source = Self::from_wav(reader, sample_rate, fps)?;
        info!(
            "playing {:?}: {} channel(s), {} frames of {} samples",
            path,
            source.channels,
            source.total_frames(),
            source.frame_size
        );
        Ok(source)
    }
}

impl<R: Read> WavFileSource<R> {
    pub fn from_reader(reader: R, sample_rate: u32, fps: f32) -> Result<Self, SourceError> {
        Self::from_wav(WavReader::new(reader)?, sample_rate, fps)
    }

    fn from_wav(reader: WavReader<R>, sample_rate: u32, fps: f32) -> Result<Self, SourceError> {
        let spec = reader.spec();
        if spec.sample_rate != sample_rate {
            return Err(SourceError::UnsupportedSampleRate {
                requested: sample_rate,
                actual: format!("{} Hz", spec.sample_rate),
            });
        }
        let frame_size = frame_size(sample_rate, fps);
        if frame_size == 0 {
            return Err(SourceError::InvalidFps(fps));
        }

        Ok(Self {
            reader,
            sample_rate,
            frame_size,
            channels: spec.channels.max(1) as usize,
            format: spec.sample_format,
            int_scale: 1.0 / (1u64 << spec.bits_per_sample.saturating_sub(1).min(31)) as f32,
            finished: false,
        })
    }

    /// Number of frames the file yields, counting the padded tail
    pub fn total_frames(&self) -> usize {
        let per_channel = self.reader.duration() as usize;
        per_channel.div_ceil(self.frame_size)
    }

    fn read_interleaved(&mut self, count: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(count);
        let result: Result<(), hound::Error> = match self.format {
            SampleFormat::Float => self
                .reader
                .samples::<f32>()
                .take(count)
                .try_for_each(|s| s.map(|v| out.push(v))),
            SampleFormat::Int => {
                let scale = self.int_scale;
                self.reader
                    .samples::<i32>()
                    .take(count)
                    .try_for_each(|s| s.map(|v| out.push(v as f32 * scale)))
            }
        };
        if let Err(e) = result {
            warn!("wav read failed, ending playback: {}", e);
            self.finished = true;
        }
        out
    }
}

impl<R: Read> FrameSource for WavFileSource<R> {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn next_frame(&mut self) -> Option<AudioFrame> {
        if self.finished {
            return None;
        }

        let interleaved = self.read_interleaved(self.frame_size * self.channels);
        if interleaved.len() < self.frame_size * self.channels {
            self.finished = true;
        }
        if interleaved.is_empty() {
            return None;
        }

        let mut samples: Vec<f32> = interleaved
            .chunks(self.channels)
            .map(|chunk| chunk.iter().sum::<f32>() / self.channels as f32)
            .collect();
        samples.resize(self.frame_size, 0.0);
        Some(AudioFrame::new(samples, self.sample_rate))
    }
}

/// Holds each frame back until its wall-clock slot, so file playback runs
/// at the analysis frame rate instead of as fast as possible.
pub struct RealtimePacer<S> {
    inner: S,
    frame_duration: Duration,
    started: Option<Instant>,
    delivered: u32,
}

impl<S: FrameSource> RealtimePacer<S> {
    pub fn new(inner: S, fps: f32) -> Result<Self, SourceError> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(SourceError::InvalidFps(fps));
        }
        Ok(Self {
            inner,
            frame_duration: Duration::from_secs_f32(1.0 / fps),
            started: None,
            delivered: 0,
        })
    }
}

impl<S: FrameSource> FrameSource for RealtimePacer<S> {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn frame_size(&self) -> usize {
        self.inner.frame_size()
    }

    fn next_frame(&mut self) -> Option<AudioFrame> {
        let started = *self.started.get_or_insert_with(Instant::now);
        let due = started + self.frame_duration * self.delivered;
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
        self.delivered = self.delivered.saturating_add(1);
        self.inner.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use std::io::Cursor;

    fn wav_bytes(spec: WavSpec, write: impl FnOnce(&mut WavWriter<&mut Cursor<Vec<u8>>>)) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            write(&mut writer);
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn int16(channels: u16, sample_rate: u32) -> WavSpec {
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    #[test]
    fn test_rejects_other_sample_rate() {
        let bytes = wav_bytes(int16(1, 48000), |w| w.write_sample(0i16).unwrap());
        let result = WavFileSource::from_reader(Cursor::new(bytes), 44100, 20.0);
        assert!(matches!(
            result,
            Err(SourceError::UnsupportedSampleRate { requested: 44100, .. })
        ));
    }

    #[test]
    fn test_mono_int_frames_with_padded_tail() {
        // 2.5 frames of 441 samples at 100 fps
        let bytes = wav_bytes(int16(1, 44100), |w| {
            for _ in 0..1102 {
                w.write_sample(i16::MAX / 2).unwrap();
            }
        });
        let mut source = WavFileSource::from_reader(Cursor::new(bytes), 44100, 100.0).unwrap();
        assert_eq!(source.frame_size(), 441);
        assert_eq!(source.total_frames(), 3);

        let first = source.next_frame().unwrap();
        assert_eq!(first.len(), 441);
        assert!((first.samples()[0] - 0.5).abs() < 1e-3);

        source.next_frame().unwrap();
        let tail = source.next_frame().unwrap();
        assert_eq!(tail.len(), 441);
        assert!(tail.samples()[219] > 0.4);
        assert_eq!(tail.samples()[220], 0.0);
        assert!(source.next_frame().is_none());
    }

    #[test]
    fn test_stereo_is_averaged() {
        let bytes = wav_bytes(int16(2, 44100), |w| {
            for _ in 0..441 {
                w.write_sample(i16::MAX / 2).unwrap();
                w.write_sample(0i16).unwrap();
            }
        });
        let mut source = WavFileSource::from_reader(Cursor::new(bytes), 44100, 100.0).unwrap();
        let frame = source.next_frame().unwrap();
        assert!((frame.samples()[10] - 0.25).abs() < 1e-3);
        assert!(source.next_frame().is_none());
    }

    #[test]
    fn test_float_samples_pass_through() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let bytes = wav_bytes(spec, |w| {
            for i in 0..400 {
                w.write_sample(if i % 2 == 0 { 0.25f32 } else { -0.25 }).unwrap();
            }
        });
        let mut source = WavFileSource::from_reader(Cursor::new(bytes), 8000, 20.0).unwrap();
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.samples()[0], 0.25);
        assert_eq!(frame.samples()[1], -0.25);
    }

    #[test]
    fn test_pacer_holds_frames_to_fps() {
        let bytes = wav_bytes(int16(1, 8000), |w| {
            for _ in 0..200 {
                w.write_sample(0i16).unwrap();
            }
        });
        let source = WavFileSource::from_reader(Cursor::new(bytes), 8000, 200.0).unwrap();
        let mut paced = RealtimePacer::new(source, 200.0).unwrap();

        let start = Instant::now();
        let mut frames = 0;
        while paced.next_frame().is_some() {
            frames += 1;
        }
        assert_eq!(frames, 5);
        assert!(start.elapsed() >= Duration::from_millis(18));
    }
}
