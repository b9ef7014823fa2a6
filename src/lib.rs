//! # PetalStream
//!
//! Streaming playback for long-form compressed music.
//!
//! A [`StreamingEngine`] decodes its source a buffer at a time and cycles a
//! small fixed pool of device buffers: every [`tick`](StreamingEngine::tick)
//! reclaims the buffers the device has finished playing, refills them from
//! the decoder and queues them again. The caller drives ticks from its own
//! update loop; the engine never blocks on the device or spawns threads.
//!
//! ## Quick Start
//!
//! ```no_run
//! use petalstream::*;
//! use std::time::Duration;
//!
//! let device = CpalDevice::new()?;
//! let mut engine = StreamingEngine::new(device, StreamConfig::default())?;
//!
//! engine.load_file("music/theme.ogg")?;
//! engine.set_volume(0.8)?;
//! engine.play()?;
//!
//! while engine.state() == EngineState::Playing {
//!     let report = engine.tick()?;
//!     for event in &report.events {
//!         println!("{:?}", event);
//!     }
//!     std::thread::sleep(Duration::from_millis(20));
//! }
//! # Ok::<(), PetalStreamError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`StreamingEngine`]**: play/pause/stop state machine and refill cycle
//! - **[`BufferPool`](pool::BufferPool)**: fixed slots and their Free/Queued/PendingRefill lifecycle
//! - **[`DecoderAdapter`](decoder::DecoderAdapter)**: slot filling over any [`PcmDecoder`](decoder::PcmDecoder)
//! - **[`AudioDevice`](device::AudioDevice)**: backend capability set, with [`CpalDevice`] and [`MockDevice`]

pub mod clock;
pub mod config;
pub mod decoder;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod format;
pub mod playback;
pub mod pool;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StreamConfig;
pub use decoder::{PcmLoader, SourceLoader, StreamSource, SymphoniaLoader};
pub use device::{AudioDevice, ChannelState, CpalDevice, MockDevice};
pub use engine::StreamingEngine;
pub use error::{PetalStreamError, Result};
pub use events::{StreamEvent, TickReport};
pub use format::AudioFormat;
pub use playback::{EngineState, LoopMode, PlaybackSession};
