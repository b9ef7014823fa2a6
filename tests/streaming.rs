//! Integration tests for petalstream.
//!
//! The engine is driven against `MockDevice`, which only finishes buffers
//! when a test tells it to. Tests that need real audio hardware live next to
//! `CpalDevice` and are `#[ignore]`d.

use petalstream::decoder::PcmDecoder;
use petalstream::pool::SlotState;
use petalstream::{
    AudioDevice, ChannelState, EngineState, LoopMode, ManualClock, MockDevice, PcmLoader,
    PetalStreamError, SourceLoader, StreamConfig, StreamEvent, StreamSource, StreamingEngine,
    TickReport,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

const SLOT: usize = 16384;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic byte pattern so misplaced chunks are detectable
fn pcm_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn engine(device: &MockDevice, config: StreamConfig) -> StreamingEngine<MockDevice> {
    init_logging();
    StreamingEngine::new(device.clone(), config).unwrap()
}

fn loaded_engine(
    device: &MockDevice,
    config: StreamConfig,
    loader: PcmLoader,
    bytes: Vec<u8>,
) -> StreamingEngine<MockDevice> {
    let mut engine = engine(device, config);
    engine.load_with(&loader, bytes).unwrap();
    engine
}

fn assert_pool_conserved(engine: &StreamingEngine<MockDevice>) {
    let pool = engine.pool();
    let total = pool.count(SlotState::Free)
        + pool.count(SlotState::Queued)
        + pool.count(SlotState::PendingRefill);
    assert_eq!(total, pool.len());
}

#[test]
fn test_play_primes_every_buffer_before_first_tick() {
    let device = MockDevice::new();
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default(),
        PcmLoader::new(2, 44100),
        pcm_bytes(SLOT * 10),
    );

    engine.play().unwrap();

    assert_eq!(device.submitted_sizes(), vec![SLOT; 4]);
    assert_eq!(engine.pool().count(SlotState::Queued), 4);
    assert_eq!(engine.state(), EngineState::Playing);
    assert!(engine.is_playing());
    assert_eq!(device.start_count(engine.channel_id()), 1);
    assert_pool_conserved(&engine);
}

#[test]
fn test_short_source_fills_then_finishes() {
    let device = MockDevice::new();
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default(),
        PcmLoader::new(2, 44100),
        pcm_bytes(40000),
    );
    let channel = engine.channel_id();

    engine.play().unwrap();

    // The fourth fill comes back empty and is never queued.
    assert_eq!(device.submitted_sizes(), vec![16384, 16384, 7232]);
    assert_eq!(engine.pool().count(SlotState::Queued), 3);
    assert_eq!(engine.pool().count(SlotState::PendingRefill), 1);
    assert_pool_conserved(&engine);

    let concatenated: Vec<u8> = device.submits().into_iter().flat_map(|s| s.data).collect();
    assert_eq!(concatenated, pcm_bytes(40000));

    device.finish_buffers(channel, 3);
    let report = engine.tick().unwrap();

    assert_eq!(report.reclaimed, 3);
    assert_eq!(report.submitted, 0);
    assert!(report.finished());
    assert_eq!(engine.state(), EngineState::Finished);
    assert_eq!(engine.pool().count(SlotState::PendingRefill), 4);
    assert!(!engine.is_playing());
    assert_pool_conserved(&engine);
}

#[test]
fn test_end_of_stream_slot_is_not_resubmitted() {
    let device = MockDevice::new();
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default(),
        PcmLoader::new(2, 44100),
        pcm_bytes(SLOT * 5),
    );
    let channel = engine.channel_id();

    engine.play().unwrap();
    device.finish_buffers(channel, 2);
    let report = engine.tick().unwrap();

    // One more slot's worth of data, then the stream is dry.
    assert_eq!(report.reclaimed, 2);
    assert_eq!(report.submitted, 1);
    assert_eq!(device.submits().len(), 5);
    assert_eq!(engine.pool().count(SlotState::Queued), 3);
    assert_eq!(engine.state(), EngineState::Playing);
    assert_pool_conserved(&engine);
}

#[test]
fn test_queued_buffers_are_only_refilled_after_reclaim() {
    let device = MockDevice::new();
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default().buffer_size(1024),
        PcmLoader::new(1, 8000),
        pcm_bytes(1024 * 40),
    );
    let channel = engine.channel_id();

    engine.play().unwrap();
    let mut in_flight: VecDeque<_> = device.submits().iter().map(|s| s.handle).collect();
    let mut seen = device.submits().len();

    for round in 0..8 {
        let count = 1 + round % 3;
        device.finish_buffers(channel, count);
        let reclaimed: Vec<_> = in_flight.drain(..count).collect();

        engine.tick().unwrap();
        assert_pool_conserved(&engine);

        let submits = device.submits();
        for record in &submits[seen..] {
            assert!(reclaimed.contains(&record.handle));
            assert!(!in_flight.contains(&record.handle));
            in_flight.push_back(record.handle);
        }
        seen = submits.len();
    }
}

#[test]
fn test_underrun_restarts_device_instead_of_finishing() {
    let device = MockDevice::new();
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default(),
        PcmLoader::new(2, 44100),
        pcm_bytes(SLOT * 4),
    );
    let channel = engine.channel_id();

    engine.play().unwrap();
    device.finish_buffers(channel, 2);
    device.set_state(channel, ChannelState::Stopped);

    let report = engine.tick().unwrap();

    assert_eq!(engine.pool().count(SlotState::Queued), 2);
    assert_eq!(engine.state(), EngineState::Playing);
    assert!(!report.finished());
    assert!(
        report
            .events
            .contains(&StreamEvent::UnderrunRecovered { queued: 2 })
    );
    assert_eq!(device.start_count(channel), 2);
    assert_eq!(device.channel_state(channel), ChannelState::Playing);
}

#[test]
fn test_drained_device_recovers_after_refill() {
    let device = MockDevice::new();
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default().buffer_count(2),
        PcmLoader::new(2, 44100),
        pcm_bytes(SLOT * 6),
    );
    let channel = engine.channel_id();

    engine.play().unwrap();
    // Device plays everything before the next tick and stops itself.
    device.finish_buffers(channel, 2);
    assert_eq!(device.channel_state(channel), ChannelState::Stopped);

    let report = engine.tick().unwrap();
    assert_eq!(report.submitted, 2);
    assert_eq!(device.start_count(channel), 2);
    assert_eq!(engine.state(), EngineState::Playing);
}

#[test]
fn test_set_volume_clamps() {
    let device = MockDevice::new();
    let mut engine = engine(&device, StreamConfig::default());
    let channel = engine.channel_id();

    assert_eq!(engine.set_volume(1.5).unwrap(), 1.0);
    assert_eq!(device.volume(channel), Some(1.0));

    assert_eq!(engine.set_volume(-0.2).unwrap(), 0.0);
    assert_eq!(device.volume(channel), Some(0.0));
    assert_eq!(engine.volume(), 0.0);
    assert_eq!(engine.state(), EngineState::Idle);
}

#[test]
fn test_initial_volume_comes_from_config() {
    let device = MockDevice::new();
    let engine = engine(&device, StreamConfig::default().volume(3.0));
    assert_eq!(device.volume(engine.channel_id()), Some(1.0));
}

#[test]
fn test_play_twice_resets_position() {
    let device = MockDevice::new();
    let clock = Arc::new(ManualClock::new());
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default(),
        PcmLoader::new(1, 8000),
        pcm_bytes(SLOT * 10),
    )
    .with_clock(clock.clone());

    engine.play().unwrap();
    assert_eq!(engine.position_in_seconds(), 0.0);

    clock.advance(Duration::from_secs(5));
    assert_eq!(engine.position_in_seconds(), 5.0);

    engine.play().unwrap();
    assert_eq!(engine.position_in_seconds(), 0.0);
    assert_eq!(engine.state(), EngineState::Playing);

    // Restart re-primes from the first byte.
    let submits = device.submits();
    assert_eq!(submits.len(), 8);
    assert_eq!(submits[4].data, submits[0].data);
    assert_eq!(engine.pool().count(SlotState::Queued), 4);
}

#[test]
fn test_position_is_clamped_to_duration() {
    let device = MockDevice::new();
    let clock = Arc::new(ManualClock::new());
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default(),
        PcmLoader::new(1, 8000),
        pcm_bytes(16000),
    )
    .with_clock(clock.clone());

    assert_eq!(engine.duration_in_seconds(), 1.0);
    engine.play().unwrap();
    clock.advance(Duration::from_millis(456));
    assert_eq!(engine.position_in_seconds(), 0.46);
    clock.advance(Duration::from_secs(30));
    assert_eq!(engine.position_in_seconds(), 1.0);
}

#[test]
fn test_play_without_source_fails() {
    let device = MockDevice::new();
    let mut engine = engine(&device, StreamConfig::default());

    assert!(matches!(
        engine.play(),
        Err(PetalStreamError::SourceNotLoaded)
    ));
    assert!(device.submits().is_empty());
}

#[test]
fn test_tick_is_noop_when_idle_or_stopped() {
    let device = MockDevice::new();
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default(),
        PcmLoader::new(2, 44100),
        pcm_bytes(SLOT * 10),
    );

    let report = engine.tick().unwrap();
    assert_eq!(report.reclaimed, 0);
    assert!(device.submits().is_empty());

    engine.play().unwrap();
    engine.stop().unwrap();
    device.clear_submits();

    let report = engine.tick().unwrap();
    assert_eq!(report, TickReport::default());
    assert!(device.submits().is_empty());
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[test]
fn test_stop_discards_queued_buffers() {
    let device = MockDevice::new();
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default(),
        PcmLoader::new(2, 44100),
        pcm_bytes(SLOT * 10),
    );
    let channel = engine.channel_id();

    engine.play().unwrap();
    engine.stop().unwrap();

    assert_eq!(engine.state(), EngineState::Stopped);
    assert_eq!(engine.pool().count(SlotState::Free), 4);
    assert_eq!(device.processed_count(channel), 0);
    assert_eq!(device.channel_state(channel), ChannelState::Stopped);
    assert_eq!(engine.position_in_seconds(), 0.0);
    assert!(engine.session().is_none());
    assert!(!engine.is_playing());
}

#[test]
fn test_play_after_finish_starts_new_session() {
    let device = MockDevice::new();
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default(),
        PcmLoader::new(2, 44100),
        pcm_bytes(40000),
    );
    let channel = engine.channel_id();

    engine.play().unwrap();
    let first = engine.session().unwrap().id();
    device.finish_buffers(channel, 3);
    engine.tick().unwrap();
    assert_eq!(engine.state(), EngineState::Finished);

    engine.play().unwrap();
    assert_eq!(engine.state(), EngineState::Playing);
    assert_ne!(engine.session().unwrap().id(), first);
    assert_eq!(device.submitted_sizes()[3..], [16384, 16384, 7232]);
}

#[test]
fn test_failed_submit_is_retried_next_tick() {
    let device = MockDevice::new();
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default(),
        PcmLoader::new(2, 44100),
        pcm_bytes(SLOT * 10),
    );
    let channel = engine.channel_id();

    engine.play().unwrap();
    device.fail_next_submits(1);
    device.finish_buffers(channel, 1);

    let report = engine.tick().unwrap();
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.submitted, 0);
    assert!(matches!(
        report.events.as_slice(),
        [StreamEvent::SubmitFailed { .. }]
    ));
    assert_eq!(engine.pool().count(SlotState::PendingRefill), 1);
    assert_eq!(engine.state(), EngineState::Playing);
    assert_pool_conserved(&engine);

    let report = engine.tick().unwrap();
    assert_eq!(report.submitted, 1);
    assert_eq!(engine.pool().count(SlotState::Queued), 4);

    let submits = device.submits();
    assert_eq!(submits.len(), 5);
    assert_eq!(submits[4].data, pcm_bytes(SLOT * 10)[SLOT * 4..SLOT * 5]);
}

struct FlakyDecoder {
    remaining: usize,
}

impl PcmDecoder for FlakyDecoder {
    fn source(&self) -> StreamSource {
        StreamSource {
            channels: 1,
            sample_rate: 8000,
            duration: Duration::from_secs(2),
        }
    }

    fn read(&mut self, buffer: &mut [u8]) -> petalstream::Result<usize> {
        if self.remaining == 0 {
            return Err(PetalStreamError::Decode("corrupt frame".into()));
        }
        let n = buffer.len().min(self.remaining);
        buffer[..n].fill(0x11);
        self.remaining -= n;
        Ok(n)
    }

    fn rewind(&mut self) -> petalstream::Result<()> {
        self.remaining = 1500;
        Ok(())
    }
}

struct FlakyLoader;

impl SourceLoader for FlakyLoader {
    fn open(&self, _bytes: Arc<[u8]>) -> petalstream::Result<Box<dyn PcmDecoder>> {
        Ok(Box::new(FlakyDecoder { remaining: 1500 }))
    }
}

#[test]
fn test_mid_stream_decode_fault_ends_playback_cleanly() {
    let device = MockDevice::new();
    let mut engine = engine(&device, StreamConfig::default().buffer_count(2).buffer_size(1024));
    let channel = engine.channel_id();
    engine.load_with(&FlakyLoader, vec![0u8; 8]).unwrap();

    engine.play().unwrap();
    assert_eq!(device.submitted_sizes(), vec![1024, 476]);

    device.finish_buffers(channel, 2);
    let report = engine.tick().unwrap();
    assert!(report.finished());
    assert_eq!(engine.state(), EngineState::Finished);
}

#[test]
fn test_rejected_submit_keeps_decode_order() {
    let device = MockDevice::new();
    let data = pcm_bytes(1024 * 20);
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default().buffer_size(1024),
        PcmLoader::new(1, 8000),
        data.clone(),
    );
    let channel = engine.channel_id();

    engine.play().unwrap();
    device.fail_next_submits(1);
    device.finish_buffers(channel, 2);

    let report = engine.tick().unwrap();
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.submitted, 0);
    assert_pool_conserved(&engine);

    let report = engine.tick().unwrap();
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.submitted, 2);
    assert_eq!(engine.pool().count(SlotState::Queued), 4);

    let concatenated: Vec<u8> = device.submits().into_iter().flat_map(|s| s.data).collect();
    assert_eq!(concatenated.len(), 1024 * 6);
    assert_eq!(concatenated, data[..concatenated.len()]);
}

#[test]
fn test_rejected_priming_submit_is_retried_in_order() {
    let device = MockDevice::new();
    let data = pcm_bytes(1024 * 20);
    let mut engine = engine(&device, StreamConfig::default().buffer_size(1024));
    engine
        .load_with(&PcmLoader::new(1, 8000), data.clone())
        .unwrap();

    device.fail_next_submits(1);
    engine.play().unwrap();
    assert!(device.submits().is_empty());
    assert_eq!(engine.pool().count(SlotState::Free), 3);

    let report = engine.tick().unwrap();
    assert!(matches!(
        report.events.first(),
        Some(StreamEvent::SubmitFailed { .. })
    ));
    assert_eq!(report.submitted, 4);
    assert_eq!(engine.pool().count(SlotState::Queued), 4);

    let concatenated: Vec<u8> = device.submits().into_iter().flat_map(|s| s.data).collect();
    assert_eq!(concatenated, data[..1024 * 4]);
}

#[test]
fn test_end_of_stream_is_reported_to_device_once() {
    let device = MockDevice::new();
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default(),
        PcmLoader::new(2, 44100),
        pcm_bytes(40000),
    );
    let channel = engine.channel_id();

    engine.play().unwrap();
    assert_eq!(device.end_of_stream_count(channel), 1);

    device.finish_buffers(channel, 3);
    engine.tick().unwrap();
    assert_eq!(engine.state(), EngineState::Finished);
    assert_eq!(device.end_of_stream_count(channel), 1);

    engine.play().unwrap();
    assert_eq!(device.end_of_stream_count(channel), 2);
}

#[test]
fn test_loop_during_priming_is_reported() {
    let device = MockDevice::new();
    let clock = Arc::new(ManualClock::new());
    let data = pcm_bytes(2048);
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default()
            .buffer_size(1024)
            .loop_mode(LoopMode::Infinite),
        PcmLoader::new(1, 8000),
        data.clone(),
    )
    .with_clock(clock.clone());
    let channel = engine.channel_id();

    engine.play().unwrap();
    let session = engine.session().unwrap().id();
    assert_eq!(device.submits().len(), 4);
    assert_eq!(device.submits()[2].data, data[..1024]);

    let report = engine.tick().unwrap();
    assert_eq!(
        report.events,
        vec![StreamEvent::Looped {
            session,
            loop_count: 1
        }]
    );

    // One full source length played: position is back near the start.
    clock.advance(Duration::from_millis(128 + 50));
    assert_eq!(engine.position_in_seconds(), 0.05);

    device.finish_buffers(channel, 2);
    let report = engine.tick().unwrap();
    let loops: Vec<u32> = report
        .events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Looped { loop_count, .. } => Some(*loop_count),
            _ => None,
        })
        .collect();
    assert_eq!(loops, vec![2]);
    assert_eq!(device.end_of_stream_count(channel), 0);
}

#[test]
fn test_infinite_loop_wraps_instead_of_finishing() {
    let device = MockDevice::new();
    let data = pcm_bytes(2048);
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default()
            .buffer_count(2)
            .buffer_size(1024)
            .loop_mode(LoopMode::Infinite),
        PcmLoader::new(1, 8000),
        data.clone(),
    );
    let channel = engine.channel_id();

    engine.play().unwrap();
    device.finish_buffers(channel, 2);
    let report = engine.tick().unwrap();

    assert_eq!(report.submitted, 2);
    assert!(!report.finished());
    let looped: Vec<_> = report
        .events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Looped { loop_count: 1, .. }))
        .collect();
    assert_eq!(looped.len(), 1);

    let submits = device.submits();
    assert_eq!(submits[2].data, data[..1024]);
    assert_eq!(submits[3].data, data[1024..]);
    assert_eq!(engine.state(), EngineState::Playing);
}

#[test]
fn test_pause_and_resume() {
    let device = MockDevice::new();
    let clock = Arc::new(ManualClock::new());
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default(),
        PcmLoader::new(1, 8000),
        pcm_bytes(SLOT * 10),
    )
    .with_clock(clock.clone());
    let channel = engine.channel_id();

    engine.play().unwrap();
    clock.advance(Duration::from_secs(2));
    engine.pause().unwrap();

    assert_eq!(engine.state(), EngineState::Paused);
    assert_eq!(device.channel_state(channel), ChannelState::Paused);
    assert!(engine.is_playing());

    device.finish_buffers(channel, 1);
    assert_eq!(engine.tick().unwrap().reclaimed, 0);

    clock.advance(Duration::from_secs(3));
    assert_eq!(engine.position_in_seconds(), 2.0);

    engine.resume().unwrap();
    clock.advance(Duration::from_secs(1));
    assert_eq!(engine.position_in_seconds(), 3.0);
    assert!(engine.is_playing());
    assert_eq!(engine.tick().unwrap().reclaimed, 1);
}

#[test]
fn test_release_frees_device_resources() {
    let device = MockDevice::new();
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default(),
        PcmLoader::new(2, 44100),
        pcm_bytes(SLOT * 10),
    );
    engine.play().unwrap();
    assert_eq!(device.live_handle_count(), 4);

    engine.release().unwrap();
    engine.release().unwrap();

    assert_eq!(device.live_handle_count(), 0);
    assert_eq!(device.channel_count(), 0);
    assert!(engine.play().is_err());
}

#[test]
fn test_drop_releases_device_resources() {
    let device = MockDevice::new();
    {
        let mut engine = loaded_engine(
            &device,
            StreamConfig::default(),
            PcmLoader::new(2, 44100),
            pcm_bytes(SLOT),
        );
        engine.play().unwrap();
    }
    assert_eq!(device.live_handle_count(), 0);
    assert_eq!(device.channel_count(), 0);
}

#[test]
fn test_invalid_config_is_rejected() {
    init_logging();
    let device = MockDevice::new();
    let result = StreamingEngine::new(device.clone(), StreamConfig::default().buffer_count(1));
    assert!(matches!(
        result,
        Err(PetalStreamError::InvalidConfiguration(_))
    ));
    assert_eq!(device.channel_count(), 0);
}

#[test]
fn test_frame_larger_than_buffer_is_rejected() {
    let device = MockDevice::new();
    let mut engine = engine(&device, StreamConfig::default().buffer_size(3));
    let result = engine.load_with(&PcmLoader::new(2, 44100), pcm_bytes(8));
    assert!(matches!(
        result,
        Err(PetalStreamError::InvalidConfiguration(_))
    ));
    assert!(engine.source().is_none());
}

#[test]
fn test_loading_while_playing_stops_session() {
    let device = MockDevice::new();
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default(),
        PcmLoader::new(2, 44100),
        pcm_bytes(SLOT * 10),
    );
    let channel = engine.channel_id();
    engine.play().unwrap();

    let source = engine
        .load_with(&PcmLoader::new(1, 22050), pcm_bytes(22050 * 2))
        .unwrap();

    assert_eq!(source.channels, 1);
    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(engine.pool().count(SlotState::Free), 4);
    assert_eq!(device.channel_state(channel), ChannelState::Stopped);
    assert_eq!(engine.duration_in_seconds(), 1.0);
}

#[test]
fn test_corrupt_source_keeps_previous_one() {
    let device = MockDevice::new();
    let mut engine = loaded_engine(
        &device,
        StreamConfig::default(),
        PcmLoader::new(2, 44100),
        pcm_bytes(SLOT),
    );

    let result = engine.load(pcm_bytes(300));
    assert!(matches!(
        result,
        Err(PetalStreamError::UnsupportedOrCorruptSource(_))
    ));
    assert!(matches!(
        engine.load(Vec::<u8>::new()),
        Err(PetalStreamError::UnsupportedOrCorruptSource(_))
    ));
    assert_eq!(engine.source().map(|s| s.channels), Some(2));
}

/// Builds a canonical 16-bit PCM WAV file in memory
fn wav_bytes(channels: u16, sample_rate: u32, pcm: &[u8]) -> Vec<u8> {
    let data_len = pcm.len() as u32;
    let block_align = channels * 2;
    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

#[test]
fn test_streams_wav_through_symphonia() {
    let device = MockDevice::new();
    let pcm = pcm_bytes(40000);
    let mut engine = engine(&device, StreamConfig::default());
    let channel = engine.channel_id();

    let source = engine.load(wav_bytes(1, 8000, &pcm)).unwrap();
    assert_eq!(source.channels, 1);
    assert_eq!(source.sample_rate, 8000);
    assert!((engine.duration_in_seconds() - 2.5).abs() < 1e-3);

    engine.play().unwrap();
    assert_eq!(device.submitted_sizes(), vec![16384, 16384, 7232]);

    let concatenated: Vec<u8> = device.submits().into_iter().flat_map(|s| s.data).collect();
    assert_eq!(concatenated, pcm);
    assert!(
        device
            .submits()
            .iter()
            .all(|s| s.sample_rate == 8000 && s.format == petalstream::AudioFormat::Mono16)
    );

    device.finish_buffers(channel, 3);
    assert!(engine.tick().unwrap().finished());
}

#[test]
fn test_load_file_from_disk() {
    let device = MockDevice::new();
    let mut engine = engine(&device, StreamConfig::default());

    let path = std::env::temp_dir().join(format!("petalstream-{}.wav", uuid::Uuid::new_v4()));
    std::fs::write(&path, wav_bytes(2, 44100, &pcm_bytes(44100 * 4))).unwrap();

    let source = engine.load_file(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(source.channels, 2);
    assert!((source.duration_in_seconds() - 1.0).abs() < 1e-3);

    let missing = engine.load_file(std::env::temp_dir().join("petalstream-missing.ogg"));
    assert!(matches!(missing, Err(PetalStreamError::Io(_))));
}
