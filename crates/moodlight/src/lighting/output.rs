//! Render sinks: console text and JSON lines on stdout.

use moodlight_api::{LightFrame, RenderFlow, RenderSink};
use std::io::{self, Write};

/// Prints one `RGB=(r,g,b)  brightness=x.xx` line per frame, with brightness
/// applied to the color.
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RenderSink for ConsoleSink<W> {
    fn render(&mut self, frame: &LightFrame) -> io::Result<RenderFlow> {
        let c = frame.applied();
        let line = writeln!(
            self.out,
            "RGB=({:3},{:3},{:3})  brightness={:.2}",
            c.r, c.g, c.b, frame.brightness
        );
        flow_from(line)
    }
}

/// One JSON object per frame, for piping into a lamp bridge.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RenderSink for JsonLinesSink<W> {
    fn render(&mut self, frame: &LightFrame) -> io::Result<RenderFlow> {
        let written = serde_json::to_writer(&mut self.out, frame)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(self.out));
        flow_from(written)
    }
}

/// A closed reader (e.g. `| head`) ends the session instead of failing it
fn flow_from(result: io::Result<()>) -> io::Result<RenderFlow> {
    match result {
        Ok(()) => Ok(RenderFlow::Continue),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(RenderFlow::Stop),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moodlight_api::Color;

    #[test]
    fn test_console_line_applies_brightness() {
        let mut sink = ConsoleSink::new(Vec::new());
        let flow = sink
            .render(&LightFrame {
                color: Color::rgb(255, 128, 0),
                brightness: 0.5,
            })
            .unwrap();
        assert_eq!(flow, RenderFlow::Continue);
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(text, "RGB=(128, 64,  0)  brightness=0.50\n");
    }

    #[test]
    fn test_json_lines() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let frame = LightFrame {
            color: Color::rgb(1, 2, 3),
            brightness: 0.25,
        };
        sink.render(&frame).unwrap();
        sink.render(&frame).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: LightFrame = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, frame);
    }
}
