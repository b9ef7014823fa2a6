//! Streams an audio file to the default output device.
//!
//! ```text
//! cargo run --example play_file -- path/to/music.ogg [--loop] [--volume 0.5]
//! ```

use anyhow::{Context, Result, bail};
use petalstream::{CpalDevice, EngineState, LoopMode, StreamConfig, StreamingEngine};
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: play_file <path> [--loop] [--volume <0..1>]");
    };

    let mut config = StreamConfig::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--loop" => config = config.loop_mode(LoopMode::Infinite),
            "--volume" => {
                let value = args.next().context("--volume needs a value")?;
                config = config.volume(value.parse().context("volume must be a number")?);
            }
            other => bail!("unknown argument: {}", other),
        }
    }

    let device = CpalDevice::new().context("failed to open output device")?;
    log::info!(
        "Output: {} Hz, {} channel(s)",
        device.output_sample_rate(),
        device.output_channels()
    );

    let mut engine = StreamingEngine::new(device, config)?;
    let source = engine
        .load_file(&path)
        .with_context(|| format!("failed to load {}", path))?;
    log::info!(
        "Playing {} ({:.2}s, {} Hz)",
        path,
        source.duration_in_seconds(),
        source.sample_rate
    );

    engine.play()?;
    let mut last_second = -1;
    while engine.state() == EngineState::Playing {
        let report = engine.tick()?;
        for event in &report.events {
            if event.is_error() {
                log::warn!("{:?}", event);
            } else {
                log::info!("{:?}", event);
            }
        }
        for error in engine.device().take_stream_errors() {
            log::error!("Stream error: {}", error);
        }

        let position = engine.position_in_seconds();
        if position as i32 != last_second {
            last_second = position as i32;
            println!(
                "{:>6.2}s / {:.2}s",
                position,
                engine.duration_in_seconds()
            );
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    engine.release()?;
    Ok(())
}
