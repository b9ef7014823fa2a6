//! Playback device abstraction.
//!
//! A device owns playback channels and buffer handles. Callers fill a
//! buffer handle with PCM via [`AudioDevice::submit`], which also appends it
//! to a channel's queue. The device is the only authority on which queued
//! buffers have finished rendering; it reports them through
//! [`AudioDevice::processed_count`] and hands them back in submission order
//! through [`AudioDevice::dequeue_processed`].
//!
//! - [`CpalDevice`]: software queue mixed into a cpal output stream
//! - [`MockDevice`]: scripted device for tests and offline use

mod channel;
mod cpal_device;
mod mock;
mod resampler;

pub use channel::DeviceChannel;
pub use cpal_device::CpalDevice;
pub use mock::{MockDevice, SubmitRecord};
pub use resampler::StreamResampler;

use crate::error::Result;
use crate::format::AudioFormat;
use std::fmt;

/// Device-side identity of one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

/// Device-side identity of one playback channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Playing,
    Paused,
    /// Never started, stopped explicitly, or ran out of queued buffers
    Stopped,
}

/// Capability set a concrete audio backend provides to the engine.
///
/// Every call is synchronous and must not block beyond a short state query.
pub trait AudioDevice {
    fn create_channel(&mut self) -> Result<ChannelId>;

    fn delete_channel(&mut self, channel: ChannelId) -> Result<()>;

    fn allocate_handles(&mut self, count: usize) -> Result<Vec<BufferHandle>>;

    fn release_handles(&mut self, handles: &[BufferHandle]) -> Result<()>;

    fn start(&mut self, channel: ChannelId) -> Result<()>;

    fn pause(&mut self, channel: ChannelId) -> Result<()>;

    /// Halts the channel. Every buffer still queued becomes processed.
    fn stop(&mut self, channel: ChannelId) -> Result<()>;

    fn set_volume(&mut self, channel: ChannelId, volume: f32) -> Result<()>;

    /// Uploads `pcm` into `handle` and appends it to the channel queue.
    fn submit(
        &mut self,
        channel: ChannelId,
        handle: BufferHandle,
        pcm: &[u8],
        sample_rate: u32,
        format: AudioFormat,
    ) -> Result<()>;

    /// Buffers submitted to the channel that have not been dequeued yet
    fn queued_count(&self, channel: ChannelId) -> usize;

    fn processed_count(&self, channel: ChannelId) -> usize;

    fn dequeue_processed(&mut self, channel: ChannelId) -> Option<BufferHandle>;

    fn channel_state(&self, channel: ChannelId) -> ChannelState;

    /// The source has no more data for `channel`.
    ///
    /// Backends that hold back part of each submit (a resampler waiting for
    /// a full chunk) append what they still have to the last queued buffer.
    fn end_of_stream(&mut self, _channel: ChannelId) -> Result<()> {
        Ok(())
    }
}
