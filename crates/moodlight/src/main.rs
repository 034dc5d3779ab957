mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::Args;
use moodlight::api::{FrameSource, RenderSink};
use moodlight::audio::{RealtimePacer, SourcePipe, WavFileSource};
use moodlight::lighting::{ConsoleSink, JsonLinesSink};
use moodlight::utils::Config;
use moodlight::Pipeline;

fn main() -> Result<()> {
    // stdout carries the light frames, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.list_devices {
        SourcePipe::list_devices();
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if args.fps.is_some() {
        config.fps = args.fps;
    }
    if args.sample_rate.is_some() {
        config.sample_rate = args.sample_rate;
    }
    let pipeline_config = config.pipeline()?;
    let mut pipeline = Pipeline::new(pipeline_config)?;

    let mut source: Box<dyn FrameSource> = match &args.file {
        Some(path) => {
            let wav = WavFileSource::open(path, pipeline_config.sample_rate, pipeline_config.fps)
                .with_context(|| format!("cannot play {:?}", path))?;
            if args.realtime {
                Box::new(RealtimePacer::new(wav, pipeline_config.fps)?)
            } else {
                Box::new(wav)
            }
        }
        None => Box::new(SourcePipe::open(
            &args.device_selection(config.device.as_deref()),
            pipeline_config.sample_rate,
            pipeline_config.fps,
            Duration::from_secs(config.device_timeout_secs()),
        )?),
    };

    if args.calibrate {
        pipeline.calibrate_from(&mut source, config.calibration_frames());
    }

    let mut sink: Box<dyn RenderSink> = if args.json {
        Box::new(JsonLinesSink::stdout())
    } else {
        Box::new(ConsoleSink::stdout())
    };

    info!(
        "running at {} fps, {} samples per frame",
        pipeline_config.fps,
        pipeline.frame_size()
    );
    pipeline.run(&mut source, &mut sink, args.max_frames)?;
    Ok(())
}
