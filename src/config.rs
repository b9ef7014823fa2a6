//! Configuration for PetalStream

use crate::error::{PetalStreamError, Result};
use crate::playback::LoopMode;

/// Default size of one device buffer in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 16;

/// Default number of device buffers cycled by an engine.
pub const DEFAULT_BUFFER_COUNT: usize = 4;

#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Number of buffers in the pool, at least 2
    pub buffer_count: usize,
    /// Capacity of each buffer in bytes
    pub buffer_size: usize,
    /// Initial channel volume (0.0 = silent, 1.0 = full volume)
    pub volume: f32,
    /// What happens when the source runs out
    pub loop_mode: LoopMode,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_count: DEFAULT_BUFFER_COUNT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            volume: 1.0,
            loop_mode: LoopMode::Once,
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = count;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn loop_mode(mut self, mode: LoopMode) -> Self {
        self.loop_mode = mode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_count < 2 {
            return Err(PetalStreamError::InvalidConfiguration(format!(
                "buffer_count must be at least 2 (got {})",
                self.buffer_count
            )));
        }
        if self.buffer_size < 1 {
            return Err(PetalStreamError::InvalidConfiguration(
                "buffer_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
