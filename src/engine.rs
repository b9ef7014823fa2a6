use crate::clock::{Clock, SystemClock};
use crate::config::StreamConfig;
use crate::decoder::{DecoderAdapter, SourceLoader, StreamSource, SymphoniaLoader};
use crate::device::{AudioDevice, ChannelId, ChannelState, DeviceChannel};
use crate::error::{PetalStreamError, Result};
use crate::events::{StreamEvent, TickReport};
use crate::playback::{EngineState, LoopMode, PlaybackSession};
use crate::pool::{BufferPool, SlotState};
use std::path::Path;
use std::sync::Arc;

/// Streams one decoded source through a fixed ring of device buffers.
///
/// The engine never runs on its own: the owner calls [`tick`](Self::tick)
/// from its update loop, and each tick hands finished buffers back to the
/// decoder and queues them again. All methods must be called from the same
/// context; nothing here is locked.
pub struct StreamingEngine<D: AudioDevice> {
    config: StreamConfig,
    channel: DeviceChannel<D>,
    pool: BufferPool,
    decoder: Option<DecoderAdapter>,
    state: EngineState,
    session: Option<PlaybackSession>,
    clock: Arc<dyn Clock>,
    loop_count: u32,
    /// Filled slot the device rejected; nothing else is filled until it lands
    stalled: Option<usize>,
    /// Set once the source has returned its last byte this session
    stream_ended: bool,
    /// Events raised while priming, reported by the next tick
    deferred_events: Vec<StreamEvent>,
    released: bool,
}

impl<D: AudioDevice> StreamingEngine<D> {
    /// Opens a channel on `device` and allocates the buffer pool
    pub fn new(device: D, config: StreamConfig) -> Result<Self> {
        config.validate()?;

        let mut channel = DeviceChannel::new(device)?;
        let pool = match BufferPool::allocate(&mut channel, config.buffer_count, config.buffer_size)
        {
            Ok(pool) => pool,
            Err(e) => {
                if let Err(close_err) = channel.close() {
                    log::warn!("Failed to close channel after allocation error: {}", close_err);
                }
                return Err(e);
            }
        };
        let mut config = config;
        config.volume = channel.set_volume(config.volume)?;

        Ok(Self {
            config,
            channel,
            pool,
            decoder: None,
            state: EngineState::Idle,
            session: None,
            clock: Arc::new(SystemClock),
            loop_count: 0,
            stalled: None,
            stream_ended: false,
            deferred_events: Vec::new(),
            released: false,
        })
    }

    /// Replaces the time source used for position reporting
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Reads a file into memory and opens it with Symphonia
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<StreamSource> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let loader = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => SymphoniaLoader::with_extension(ext),
            None => SymphoniaLoader::new(),
        };
        self.load_with(&loader, bytes)
    }

    /// Opens in-memory compressed bytes with Symphonia
    pub fn load(&mut self, bytes: impl Into<Arc<[u8]>>) -> Result<StreamSource> {
        self.load_with(&SymphoniaLoader::new(), bytes)
    }

    /// Opens a source with a custom loader, replacing the current one.
    ///
    /// A failed open leaves the previous source loaded. A successful one
    /// stops any running session and returns the engine to `Idle`.
    pub fn load_with(
        &mut self,
        loader: &dyn SourceLoader,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Result<StreamSource> {
        self.ensure_live()?;

        let adapter = DecoderAdapter::open(loader, bytes)?;
        let source = *adapter.source();
        let frame_size = source.format().frame_size();
        if frame_size > self.config.buffer_size {
            return Err(PetalStreamError::InvalidConfiguration(format!(
                "buffer_size {} cannot hold one {}-byte frame",
                self.config.buffer_size, frame_size
            )));
        }

        if self.state != EngineState::Idle {
            self.stop()?;
        }
        self.decoder = Some(adapter);
        self.state = EngineState::Idle;
        self.session = None;

        log::info!(
            "Loaded source: {} channel(s), {} Hz, {:.2}s",
            source.channels,
            source.sample_rate,
            source.duration_in_seconds()
        );
        Ok(source)
    }

    /// Starts playback from the beginning.
    ///
    /// Calling this while already playing or paused restarts the source.
    /// The whole pool is filled and queued before the device starts.
    pub fn play(&mut self) -> Result<()> {
        self.ensure_live()?;
        let Some(decoder) = self.decoder.as_mut() else {
            return Err(PetalStreamError::SourceNotLoaded);
        };
        decoder.rewind();

        self.halt()?;
        self.loop_count = 0;
        self.stream_ended = false;
        // A wrap while priming must already advance this session.
        self.session = Some(PlaybackSession::new(self.channel.id(), self.clock.now()));

        let mut primed = TickReport::default();
        self.top_up(&mut primed)?;
        self.deferred_events = primed.events;

        self.channel.start()?;
        if let Some(session) = &self.session {
            log::info!(
                "Session {} started, primed {} of {} buffers",
                session.id(),
                primed.submitted,
                self.pool.len()
            );
        }
        self.state = EngineState::Playing;
        Ok(())
    }

    /// Hands finished buffers back to the decoder and queues them again.
    ///
    /// Does nothing unless the engine is playing. A buffer whose refill
    /// comes back empty stays unqueued; once none are left queued the
    /// session is finished.
    ///
    /// Buffers reach the device in decode order. After a rejected submit
    /// nothing else is filled until that buffer has been accepted, and
    /// finished buffers not yet reclaimed stay with the device.
    pub fn tick(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();
        if self.state != EngineState::Playing {
            return Ok(report);
        }
        report.events = std::mem::take(&mut self.deferred_events);

        let mut accepting = match self.stalled {
            Some(index) => self.submit_slot(index, &mut report)?,
            None => true,
        };
        if accepting {
            // Free slots are only left behind by an interrupted priming pass.
            accepting = self.top_up(&mut report)?;
        }

        if accepting {
            let finished = self.channel.finished_count();
            for _ in 0..finished {
                let Some(handle) = self.channel.dequeue_finished() else {
                    break;
                };
                let Some(index) = self.pool.index_of(handle) else {
                    log::warn!("Device returned foreign {}", handle);
                    continue;
                };
                self.pool.mark_reclaimed(index)?;
                report.reclaimed += 1;

                if self.refill(index, &mut report.events) > 0
                    && !self.submit_slot(index, &mut report)?
                {
                    break;
                }
            }
        }

        let queued = self.pool.count(SlotState::Queued);
        if queued == 0 && self.stalled.is_none() {
            self.state = EngineState::Finished;
            if let Some(session) = &self.session {
                log::info!("Session {} finished", session.id());
                report.events.push(StreamEvent::Finished {
                    session: session.id(),
                });
            }
            return Ok(report);
        }

        if queued > 0 && self.channel.state() == ChannelState::Stopped {
            log::warn!("Device stopped with {} buffers queued, restarting", queued);
            self.channel.start()?;
            report
                .events
                .push(StreamEvent::UnderrunRecovered { queued });
        }

        log::debug!(
            "Tick: reclaimed {}, submitted {}, queued {}",
            report.reclaimed,
            report.submitted,
            self.pool.count(SlotState::Queued)
        );
        Ok(report)
    }

    /// Halts the device and discards every queued buffer. Valid in any state.
    pub fn stop(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.halt()?;
        if let Some(session) = self.session.take() {
            log::info!("Session {} stopped", session.id());
        }
        self.state = EngineState::Stopped;
        Ok(())
    }

    /// Pauses the device, keeping queued buffers. No-op unless playing.
    pub fn pause(&mut self) -> Result<()> {
        if self.state != EngineState::Playing {
            return Ok(());
        }
        self.channel.pause()?;
        let now = self.clock.now();
        if let Some(session) = self.session.as_mut() {
            session.pause(now);
        }
        self.state = EngineState::Paused;
        Ok(())
    }

    /// Continues a paused session. No-op unless paused.
    pub fn resume(&mut self) -> Result<()> {
        if self.state != EngineState::Paused {
            return Ok(());
        }
        self.channel.start()?;
        let now = self.clock.now();
        if let Some(session) = self.session.as_mut() {
            session.resume(now);
        }
        self.state = EngineState::Playing;
        Ok(())
    }

    /// Sets the channel volume, clamped to `[0, 1]`. Returns the applied value.
    pub fn set_volume(&mut self, volume: f32) -> Result<f32> {
        self.ensure_live()?;
        let applied = self.channel.set_volume(volume)?;
        self.config.volume = applied;
        Ok(applied)
    }

    pub fn volume(&self) -> f32 {
        self.channel.volume()
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.config.loop_mode = mode;
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.config.loop_mode
    }

    pub fn position_in_seconds(&self) -> f32 {
        let duration = self
            .decoder
            .as_ref()
            .map(|d| d.source().duration)
            .unwrap_or_default();
        self.session
            .as_ref()
            .map_or(0.0, |s| s.position_in_seconds(self.clock.now(), duration))
    }

    pub fn duration_in_seconds(&self) -> f32 {
        self.decoder
            .as_ref()
            .map_or(0.0, |d| d.source().duration_in_seconds())
    }

    /// True unless the device reports the channel stopped. The device can
    /// lag the nominal state by one tick.
    pub fn is_playing(&self) -> bool {
        !self.released && self.channel.state() != ChannelState::Stopped
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn source(&self) -> Option<StreamSource> {
        self.decoder.as_ref().map(|d| *d.source())
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel.id()
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        self.channel.device()
    }

    /// Stops playback, releases every buffer handle and closes the channel.
    /// Safe to call more than once.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.stop()?;
        self.pool.release(&mut self.channel)?;
        self.channel.close()?;
        self.decoder = None;
        self.released = true;
        log::info!("Engine released");
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        if self.released {
            return Err(PetalStreamError::AudioDevice(
                "Engine buffers have been released".to_string(),
            ));
        }
        Ok(())
    }

    /// Stops the device, drops whatever it still reports as processed and
    /// returns every slot to Free.
    fn halt(&mut self) -> Result<()> {
        self.channel.stop()?;
        let processed = self.channel.finished_count();
        for _ in 0..processed {
            if self.channel.dequeue_finished().is_none() {
                break;
            }
        }
        let discarded = self.pool.discard_all()?;
        if discarded > 0 {
            log::debug!("Discarded {} buffers", discarded);
        }
        self.stalled = None;
        self.deferred_events.clear();
        Ok(())
    }

    /// Claims Free slots, filling and submitting each in turn. Stops at end
    /// of stream or at the first rejected submit; returns `false` for the
    /// latter.
    fn top_up(&mut self, report: &mut TickReport) -> Result<bool> {
        while let Some(index) = self.pool.claim_free() {
            if self.refill(index, &mut report.events) == 0 {
                break;
            }
            if !self.submit_slot(index, report)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Decodes into a PendingRefill slot, wrapping around when looping.
    fn refill(&mut self, index: usize, events: &mut Vec<StreamEvent>) -> usize {
        let Some(decoder) = self.decoder.as_mut() else {
            return 0;
        };
        let size = self.config.buffer_size;
        let slot = self.pool.slot_mut(index);

        let mut written = decoder.fill_slot(slot, size);
        if written == 0 && self.config.loop_mode == LoopMode::Infinite {
            decoder.rewind();
            written = decoder.fill_slot(slot, size);
            if written > 0 {
                self.loop_count += 1;
                if let Some(session) = self.session.as_mut() {
                    session.advance(decoder.source().duration);
                    events.push(StreamEvent::Looped {
                        session: session.id(),
                        loop_count: self.loop_count,
                    });
                }
            }
        }

        if written == 0 && !self.stream_ended {
            self.stream_ended = true;
            if let Err(e) = self.channel.end_of_stream() {
                log::warn!("Device failed to drain stream tail: {}", e);
            }
        }
        written
    }

    /// Submits a filled PendingRefill slot. A device rejection leaves the
    /// slot filled and unqueued for the next tick and returns `false`.
    fn submit_slot(&mut self, index: usize, report: &mut TickReport) -> Result<bool> {
        let Some(source) = self.decoder.as_ref().map(|d| *d.source()) else {
            return Ok(false);
        };
        let slot = self.pool.slot(index);
        let handle = slot.handle();

        match self
            .channel
            .submit(handle, slot.filled(), source.sample_rate, source.format())
        {
            Ok(()) => {
                self.pool.mark_queued(index)?;
                report.submitted += 1;
                self.stalled = None;
                Ok(true)
            }
            Err(e) => {
                log::warn!("Submit of {} failed, retrying next tick: {}", handle, e);
                report.events.push(StreamEvent::SubmitFailed {
                    handle,
                    error: e.to_string(),
                });
                self.stalled = Some(index);
                Ok(false)
            }
        }
    }
}

impl<D: AudioDevice> Drop for StreamingEngine<D> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Failed to release engine: {}", e);
        }
    }
}
