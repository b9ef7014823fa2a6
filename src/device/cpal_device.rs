use super::resampler::StreamResampler;
use super::{AudioDevice, BufferHandle, ChannelId, ChannelState};
use crate::error::{PetalStreamError, Result};
use crate::format::AudioFormat;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// A submitted buffer, already converted to the output layout
struct QueuedBuffer {
    handle: BufferHandle,
    samples: Vec<f32>,
    cursor: usize,
}

struct ChannelQueue {
    state: ChannelState,
    volume: f32,
    queue: VecDeque<QueuedBuffer>,
    processed: VecDeque<BufferHandle>,
}

impl ChannelQueue {
    fn new() -> Self {
        Self {
            state: ChannelState::Stopped,
            volume: 1.0,
            queue: VecDeque::new(),
            processed: VecDeque::new(),
        }
    }
}

#[derive(Default)]
struct MixerState {
    channels: HashMap<ChannelId, ChannelQueue>,
}

/// Software buffer queue rendered through the default cpal output device.
///
/// All channels are mixed into one output stream. A channel plays its queued
/// buffers back to back; once its queue runs dry it reports
/// [`ChannelState::Stopped`] until started again.
pub struct CpalDevice {
    _stream: cpal::Stream,
    mixer: Arc<Mutex<MixerState>>,
    output_sample_rate: u32,
    output_channels: u16,
    handles: HashSet<BufferHandle>,
    next_handle: u32,
    next_channel: u32,
    resamplers: HashMap<ChannelId, StreamResampler>,
    stream_errors: Receiver<String>,
}

impl CpalDevice {
    /// Opens the host's default output device
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            PetalStreamError::AudioDevice("No default output device available".into())
        })?;
        Self::with_device(device)
    }

    pub fn with_device(device: cpal::Device) -> Result<Self> {
        let default_config = device.default_output_config().map_err(|e| {
            PetalStreamError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;
        let config = default_config.config();

        if let Ok(name) = device.name() {
            log::info!(
                "Opening output device '{}' ({}ch, {}Hz, {:?})",
                name,
                config.channels,
                config.sample_rate.0,
                default_config.sample_format()
            );
        }

        let mixer = Arc::new(Mutex::new(MixerState::default()));
        let (error_tx, stream_errors) = bounded(16);

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => {
                create_stream::<f32>(&device, &config, mixer.clone(), error_tx)?
            }
            cpal::SampleFormat::I16 => {
                create_stream::<i16>(&device, &config, mixer.clone(), error_tx)?
            }
            cpal::SampleFormat::U16 => {
                create_stream::<u16>(&device, &config, mixer.clone(), error_tx)?
            }
            _ => {
                return Err(PetalStreamError::AudioDevice(
                    "Unsupported sample format".into(),
                ));
            }
        };

        stream.play().map_err(|e| {
            PetalStreamError::AudioDevice(format!("Failed to start stream: {}", e))
        })?;

        Ok(Self {
            _stream: stream,
            mixer,
            output_sample_rate: config.sample_rate.0,
            output_channels: config.channels,
            handles: HashSet::new(),
            next_handle: 1,
            next_channel: 1,
            resamplers: HashMap::new(),
            stream_errors,
        })
    }

    pub fn output_sample_rate(&self) -> u32 {
        self.output_sample_rate
    }

    pub fn output_channels(&self) -> u16 {
        self.output_channels
    }

    /// Drains errors reported by the output stream since the last call
    pub fn take_stream_errors(&self) -> Vec<String> {
        self.stream_errors.try_iter().collect()
    }

    fn mixer(&self) -> MutexGuard<'_, MixerState> {
        self.mixer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_channel<T>(
        &self,
        channel: ChannelId,
        f: impl FnOnce(&mut ChannelQueue) -> T,
    ) -> Result<T> {
        let mut mixer = self.mixer();
        let queue = mixer
            .channels
            .get_mut(&channel)
            .ok_or_else(|| PetalStreamError::AudioDevice(format!("Unknown {}", channel)))?;
        Ok(f(queue))
    }

    fn convert(
        &mut self,
        channel: ChannelId,
        pcm: &[u8],
        sample_rate: u32,
        format: AudioFormat,
    ) -> Result<Vec<f32>> {
        let frames = pcm_to_output_frames(pcm, format, self.output_channels);

        let needs_new = self
            .resamplers
            .get(&channel)
            .is_none_or(|r| r.source_sample_rate() != sample_rate);
        if needs_new {
            let resampler =
                StreamResampler::new(sample_rate, self.output_sample_rate, self.output_channels, None)?;
            self.resamplers.insert(channel, resampler);
        }

        match self.resamplers.get_mut(&channel) {
            Some(resampler) => resampler.process_interleaved(&frames),
            None => Ok(frames),
        }
    }
}

impl AudioDevice for CpalDevice {
    fn create_channel(&mut self) -> Result<ChannelId> {
        let id = ChannelId(self.next_channel);
        self.next_channel += 1;
        self.mixer().channels.insert(id, ChannelQueue::new());
        Ok(id)
    }

    fn delete_channel(&mut self, channel: ChannelId) -> Result<()> {
        self.resamplers.remove(&channel);
        self.mixer()
            .channels
            .remove(&channel)
            .map(|_| ())
            .ok_or_else(|| PetalStreamError::AudioDevice(format!("Unknown {}", channel)))
    }

    fn allocate_handles(&mut self, count: usize) -> Result<Vec<BufferHandle>> {
        let handles: Vec<_> = (0..count)
            .map(|_| {
                let handle = BufferHandle(self.next_handle);
                self.next_handle += 1;
                handle
            })
            .collect();
        self.handles.extend(handles.iter().copied());
        Ok(handles)
    }

    fn release_handles(&mut self, handles: &[BufferHandle]) -> Result<()> {
        for handle in handles {
            self.handles.remove(handle);
        }
        Ok(())
    }

    fn start(&mut self, channel: ChannelId) -> Result<()> {
        self.with_channel(channel, |queue| queue.state = ChannelState::Playing)
    }

    fn pause(&mut self, channel: ChannelId) -> Result<()> {
        self.with_channel(channel, |queue| {
            if queue.state == ChannelState::Playing {
                queue.state = ChannelState::Paused;
            }
        })
    }

    fn stop(&mut self, channel: ChannelId) -> Result<()> {
        self.with_channel(channel, |queue| {
            while let Some(buffer) = queue.queue.pop_front() {
                queue.processed.push_back(buffer.handle);
            }
            queue.state = ChannelState::Stopped;
        })?;
        if let Some(resampler) = self.resamplers.get_mut(&channel) {
            resampler.reset()?;
        }
        Ok(())
    }

    fn set_volume(&mut self, channel: ChannelId, volume: f32) -> Result<()> {
        self.with_channel(channel, |queue| queue.volume = volume)
    }

    fn submit(
        &mut self,
        channel: ChannelId,
        handle: BufferHandle,
        pcm: &[u8],
        sample_rate: u32,
        format: AudioFormat,
    ) -> Result<()> {
        if !self.handles.contains(&handle) {
            return Err(PetalStreamError::AudioDevice(format!("Unknown {}", handle)));
        }
        let samples = self.convert(channel, pcm, sample_rate, format)?;
        self.with_channel(channel, |queue| {
            queue.queue.push_back(QueuedBuffer {
                handle,
                samples,
                cursor: 0,
            })
        })
    }

    fn queued_count(&self, channel: ChannelId) -> usize {
        self.with_channel(channel, |queue| queue.queue.len() + queue.processed.len())
            .unwrap_or(0)
    }

    fn processed_count(&self, channel: ChannelId) -> usize {
        self.with_channel(channel, |queue| queue.processed.len())
            .unwrap_or(0)
    }

    fn dequeue_processed(&mut self, channel: ChannelId) -> Option<BufferHandle> {
        self.with_channel(channel, |queue| queue.processed.pop_front())
            .ok()
            .flatten()
    }

    fn channel_state(&self, channel: ChannelId) -> ChannelState {
        self.with_channel(channel, |queue| queue.state)
            .unwrap_or(ChannelState::Stopped)
    }

    fn end_of_stream(&mut self, channel: ChannelId) -> Result<()> {
        let Some(resampler) = self.resamplers.get_mut(&channel) else {
            return Ok(());
        };
        let tail = resampler.flush()?;
        if tail.is_empty() {
            return Ok(());
        }
        self.with_channel(channel, |queue| {
            if !append_tail(queue, &tail) {
                log::debug!("{} already drained, dropping {} tail samples", channel, tail.len());
            }
        })
    }
}

/// Extends the last queued buffer so the tail plays before it is processed
fn append_tail(queue: &mut ChannelQueue, tail: &[f32]) -> bool {
    match queue.queue.back_mut() {
        Some(last) => {
            last.samples.extend_from_slice(tail);
            true
        }
        None => false,
    }
}

/// Decodes 16-bit LE PCM and maps it onto `output_channels` interleaved f32
fn pcm_to_output_frames(pcm: &[u8], format: AudioFormat, output_channels: u16) -> Vec<f32> {
    let source_channels = format.channels() as usize;
    let output_channels = output_channels as usize;
    let samples: Vec<f32> = pcm
        .chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect();

    let mut frames = Vec::with_capacity(samples.len() / source_channels * output_channels);
    for frame in samples.chunks_exact(source_channels) {
        for out_ch in 0..output_channels {
            let value = match (source_channels, output_channels) {
                (1, _) => frame[0],
                (_, 1) => (frame[0] + frame[1]) * 0.5,
                _ => frame.get(out_ch).copied().unwrap_or(0.0),
            };
            frames.push(value);
        }
    }
    frames
}

/// Mixes every playing channel into `out`.
///
/// Finished buffers move to their channel's processed list; a channel that
/// runs out of queued buffers mid-block is marked stopped.
fn render(mixer: &mut MixerState, out: &mut [f32]) {
    out.fill(0.0);

    for queue in mixer.channels.values_mut() {
        if queue.state != ChannelState::Playing {
            continue;
        }

        let mut written = 0;
        while written < out.len() {
            let Some(front) = queue.queue.front_mut() else {
                queue.state = ChannelState::Stopped;
                break;
            };

            let take = (front.samples.len() - front.cursor).min(out.len() - written);
            for (dst, src) in out[written..written + take]
                .iter_mut()
                .zip(&front.samples[front.cursor..front.cursor + take])
            {
                *dst += src * queue.volume;
            }
            front.cursor += take;
            written += take;

            if front.cursor >= front.samples.len() {
                if let Some(done) = queue.queue.pop_front() {
                    queue.processed.push_back(done.handle);
                }
            }
        }
    }
}

fn create_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Arc<Mutex<MixerState>>,
    errors: Sender<String>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);

                // Never wait on the control thread; a contended lock costs one block of silence.
                match mixer.try_lock() {
                    Ok(mut mixer) => render(&mut mixer, &mut scratch),
                    Err(_) => scratch.fill(0.0),
                }

                for (sample, value) in data.iter_mut().zip(&scratch) {
                    *sample = T::from_sample(value.clamp(-1.0, 1.0));
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
                let _ = errors.try_send(err.to_string());
            },
            None,
        )
        .map_err(|e| PetalStreamError::AudioDevice(format!("Failed to build stream: {}", e)))?;

    Ok(stream)
}
