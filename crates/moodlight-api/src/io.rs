//! Boundary traits for frame acquisition and rendering

use std::io;

use crate::{AudioFrame, LightFrame};

/// Produces audio frames in strict temporal order.
///
/// Every frame has exactly `frame_size()` samples at `sample_rate()`. A
/// source may block while waiting for audio; `None` signals exhaustion.
pub trait FrameSource {
    fn sample_rate(&self) -> u32;

    fn frame_size(&self) -> usize;

    fn next_frame(&mut self) -> Option<AudioFrame>;
}

/// Whether the pipeline should keep feeding the sink
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderFlow {
    Continue,
    Stop,
}

/// Receives one light frame per processed audio frame
pub trait RenderSink {
    fn render(&mut self, frame: &LightFrame) -> io::Result<RenderFlow>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn frame_size(&self) -> usize {
        (**self).frame_size()
    }

    fn next_frame(&mut self) -> Option<AudioFrame> {
        (**self).next_frame()
    }
}

impl<S: RenderSink + ?Sized> RenderSink for Box<S> {
    fn render(&mut self, frame: &LightFrame) -> io::Result<RenderFlow> {
        (**self).render(frame)
    }
}
