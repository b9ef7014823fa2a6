//! Scripted playback device for testing without hardware.

use super::{AudioDevice, BufferHandle, ChannelId, ChannelState};
use crate::error::{PetalStreamError, Result};
use crate::format::AudioFormat;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// A single recorded [`AudioDevice::submit`] call
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRecord {
    pub channel: ChannelId,
    pub handle: BufferHandle,
    pub data: Vec<u8>,
    pub sample_rate: u32,
    pub format: AudioFormat,
}

#[derive(Debug)]
struct MockChannel {
    state: ChannelState,
    volume: f32,
    queue: VecDeque<BufferHandle>,
    processed: VecDeque<BufferHandle>,
    starts: usize,
    stops: usize,
    stream_ends: usize,
}

impl MockChannel {
    fn new() -> Self {
        Self {
            state: ChannelState::Stopped,
            volume: 1.0,
            queue: VecDeque::new(),
            processed: VecDeque::new(),
            starts: 0,
            stops: 0,
            stream_ends: 0,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    channels: HashMap<ChannelId, MockChannel>,
    handles: HashSet<BufferHandle>,
    next_channel: u32,
    next_handle: u32,
    submits: Vec<SubmitRecord>,
    failing_submits: usize,
}

/// A device that never renders audio on its own.
///
/// Queued buffers only finish when the test calls
/// [`MockDevice::finish_buffers`]. Clones share the same state, so a test
/// can keep one clone for inspection while the engine owns another.
///
/// # Example
///
/// ```
/// use petalstream::device::{AudioDevice, MockDevice};
///
/// let mut device = MockDevice::new();
/// let channel = device.create_channel().unwrap();
/// let handles = device.allocate_handles(2).unwrap();
/// assert_eq!(handles.len(), 2);
/// assert_eq!(device.queued_count(channel), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    inner: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Marks up to `count` of the oldest queued buffers as played.
    ///
    /// A playing channel whose queue runs dry switches to `Stopped`, the way
    /// a real device reports an underrun.
    pub fn finish_buffers(&self, channel: ChannelId, count: usize) -> usize {
        let mut state = self.lock();
        let Some(ch) = state.channels.get_mut(&channel) else {
            return 0;
        };
        let mut finished = 0;
        while finished < count {
            let Some(handle) = ch.queue.pop_front() else {
                break;
            };
            ch.processed.push_back(handle);
            finished += 1;
        }
        if ch.queue.is_empty() && ch.state == ChannelState::Playing {
            ch.state = ChannelState::Stopped;
        }
        finished
    }

    /// Forces the reported channel state without touching the queue
    pub fn set_state(&self, channel: ChannelId, new_state: ChannelState) {
        if let Some(ch) = self.lock().channels.get_mut(&channel) {
            ch.state = new_state;
        }
    }

    /// Makes the next `count` submits fail with a device error
    pub fn fail_next_submits(&self, count: usize) {
        self.lock().failing_submits = count;
    }

    pub fn submits(&self) -> Vec<SubmitRecord> {
        self.lock().submits.clone()
    }

    pub fn submitted_sizes(&self) -> Vec<usize> {
        self.lock().submits.iter().map(|s| s.data.len()).collect()
    }

    pub fn clear_submits(&self) {
        self.lock().submits.clear();
    }

    pub fn start_count(&self, channel: ChannelId) -> usize {
        self.lock().channels.get(&channel).map_or(0, |ch| ch.starts)
    }

    pub fn stop_count(&self, channel: ChannelId) -> usize {
        self.lock().channels.get(&channel).map_or(0, |ch| ch.stops)
    }

    /// How many times the engine reported the end of its source
    pub fn end_of_stream_count(&self, channel: ChannelId) -> usize {
        self.lock().channels.get(&channel).map_or(0, |ch| ch.stream_ends)
    }

    pub fn volume(&self, channel: ChannelId) -> Option<f32> {
        self.lock().channels.get(&channel).map(|ch| ch.volume)
    }

    pub fn channel_count(&self) -> usize {
        self.lock().channels.len()
    }

    pub fn live_handle_count(&self) -> usize {
        self.lock().handles.len()
    }
}

fn unknown_channel(channel: ChannelId) -> PetalStreamError {
    PetalStreamError::AudioDevice(format!("Unknown {}", channel))
}

impl AudioDevice for MockDevice {
    fn create_channel(&mut self) -> Result<ChannelId> {
        let mut state = self.lock();
        let id = ChannelId(state.next_channel);
        state.next_channel += 1;
        state.channels.insert(id, MockChannel::new());
        Ok(id)
    }

    fn delete_channel(&mut self, channel: ChannelId) -> Result<()> {
        self.lock()
            .channels
            .remove(&channel)
            .map(|_| ())
            .ok_or_else(|| unknown_channel(channel))
    }

    fn allocate_handles(&mut self, count: usize) -> Result<Vec<BufferHandle>> {
        let mut state = self.lock();
        let mut handles = Vec::with_capacity(count);
        for _ in 0..count {
            let handle = BufferHandle(state.next_handle);
            state.next_handle += 1;
            state.handles.insert(handle);
            handles.push(handle);
        }
        Ok(handles)
    }

    fn release_handles(&mut self, handles: &[BufferHandle]) -> Result<()> {
        let mut state = self.lock();
        for handle in handles {
            state.handles.remove(handle);
        }
        Ok(())
    }

    fn start(&mut self, channel: ChannelId) -> Result<()> {
        let mut state = self.lock();
        let ch = state
            .channels
            .get_mut(&channel)
            .ok_or_else(|| unknown_channel(channel))?;
        ch.state = ChannelState::Playing;
        ch.starts += 1;
        Ok(())
    }

    fn pause(&mut self, channel: ChannelId) -> Result<()> {
        let mut state = self.lock();
        let ch = state
            .channels
            .get_mut(&channel)
            .ok_or_else(|| unknown_channel(channel))?;
        if ch.state == ChannelState::Playing {
            ch.state = ChannelState::Paused;
        }
        Ok(())
    }

    fn stop(&mut self, channel: ChannelId) -> Result<()> {
        let mut state = self.lock();
        let ch = state
            .channels
            .get_mut(&channel)
            .ok_or_else(|| unknown_channel(channel))?;
        let pending: Vec<_> = ch.queue.drain(..).collect();
        ch.processed.extend(pending);
        ch.state = ChannelState::Stopped;
        ch.stops += 1;
        Ok(())
    }

    fn set_volume(&mut self, channel: ChannelId, volume: f32) -> Result<()> {
        let mut state = self.lock();
        let ch = state
            .channels
            .get_mut(&channel)
            .ok_or_else(|| unknown_channel(channel))?;
        ch.volume = volume;
        Ok(())
    }

    fn submit(
        &mut self,
        channel: ChannelId,
        handle: BufferHandle,
        pcm: &[u8],
        sample_rate: u32,
        format: AudioFormat,
    ) -> Result<()> {
        let mut state = self.lock();
        if state.failing_submits > 0 {
            state.failing_submits -= 1;
            return Err(PetalStreamError::AudioDevice(format!(
                "Submit of {} rejected",
                handle
            )));
        }
        if !state.handles.contains(&handle) {
            return Err(PetalStreamError::AudioDevice(format!(
                "Unknown {}",
                handle
            )));
        }
        let ch = state
            .channels
            .get_mut(&channel)
            .ok_or_else(|| unknown_channel(channel))?;
        ch.queue.push_back(handle);
        state.submits.push(SubmitRecord {
            channel,
            handle,
            data: pcm.to_vec(),
            sample_rate,
            format,
        });
        Ok(())
    }

    fn queued_count(&self, channel: ChannelId) -> usize {
        self.lock()
            .channels
            .get(&channel)
            .map_or(0, |ch| ch.queue.len() + ch.processed.len())
    }

    fn processed_count(&self, channel: ChannelId) -> usize {
        self.lock()
            .channels
            .get(&channel)
            .map_or(0, |ch| ch.processed.len())
    }

    fn dequeue_processed(&mut self, channel: ChannelId) -> Option<BufferHandle> {
        self.lock()
            .channels
            .get_mut(&channel)
            .and_then(|ch| ch.processed.pop_front())
    }

    fn channel_state(&self, channel: ChannelId) -> ChannelState {
        self.lock()
            .channels
            .get(&channel)
            .map_or(ChannelState::Stopped, |ch| ch.state)
    }

    fn end_of_stream(&mut self, channel: ChannelId) -> Result<()> {
        let mut state = self.lock();
        let ch = state
            .channels
            .get_mut(&channel)
            .ok_or_else(|| unknown_channel(channel))?;
        ch.stream_ends += 1;
        Ok(())
    }
}
