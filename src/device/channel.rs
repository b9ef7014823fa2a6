use super::{AudioDevice, BufferHandle, ChannelId, ChannelState};
use crate::error::Result;
use crate::format::AudioFormat;

/// One playback channel on a device, owned exclusively by a single engine.
///
/// The wrapped device is only reachable through this type, so the buffer
/// handles allocated here can never be queued on another channel.
pub struct DeviceChannel<D: AudioDevice> {
    device: D,
    channel: ChannelId,
    volume: f32,
    deleted: bool,
}

impl<D: AudioDevice> DeviceChannel<D> {
    pub fn new(mut device: D) -> Result<Self> {
        let channel = device.create_channel()?;
        log::debug!("Opened device {}", channel);
        Ok(Self {
            device,
            channel,
            volume: 1.0,
            deleted: false,
        })
    }

    pub fn id(&self) -> ChannelId {
        self.channel
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn start(&mut self) -> Result<()> {
        self.device.start(self.channel)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.device.pause(self.channel)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.device.stop(self.channel)
    }

    /// Sets the channel gain, clamped to `[0, 1]`. Returns the applied value.
    pub fn set_volume(&mut self, volume: f32) -> Result<f32> {
        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.device.set_volume(self.channel, volume)?;
        self.volume = volume;
        Ok(volume)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn submit(
        &mut self,
        handle: BufferHandle,
        pcm: &[u8],
        sample_rate: u32,
        format: AudioFormat,
    ) -> Result<()> {
        self.device
            .submit(self.channel, handle, pcm, sample_rate, format)
    }

    pub fn queued_count(&self) -> usize {
        self.device.queued_count(self.channel)
    }

    pub fn finished_count(&self) -> usize {
        self.device.processed_count(self.channel)
    }

    pub fn dequeue_finished(&mut self) -> Option<BufferHandle> {
        self.device.dequeue_processed(self.channel)
    }

    pub fn state(&self) -> ChannelState {
        self.device.channel_state(self.channel)
    }

    pub fn end_of_stream(&mut self) -> Result<()> {
        self.device.end_of_stream(self.channel)
    }

    pub fn allocate_handles(&mut self, count: usize) -> Result<Vec<BufferHandle>> {
        self.device.allocate_handles(count)
    }

    pub fn release_handles(&mut self, handles: &[BufferHandle]) -> Result<()> {
        self.device.release_handles(handles)
    }

    /// Deletes the device channel. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if self.deleted {
            return Ok(());
        }
        self.device.delete_channel(self.channel)?;
        self.deleted = true;
        log::debug!("Closed device {}", self.channel);
        Ok(())
    }
}
