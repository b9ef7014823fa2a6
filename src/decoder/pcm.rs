use super::{PcmDecoder, SourceLoader, StreamSource};
use crate::error::{PetalStreamError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Loader for headerless interleaved 16-bit little-endian PCM
#[derive(Debug, Clone, Copy)]
pub struct PcmLoader {
    channels: u16,
    sample_rate: u32,
}

impl PcmLoader {
    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }
}

impl SourceLoader for PcmLoader {
    fn open(&self, bytes: Arc<[u8]>) -> Result<Box<dyn PcmDecoder>> {
        if self.channels == 0 || self.sample_rate == 0 {
            return Err(PetalStreamError::UnsupportedOrCorruptSource(format!(
                "Invalid PCM layout: {} channels at {} Hz",
                self.channels, self.sample_rate
            )));
        }

        let frame_size = self.channels as usize * 2;
        if bytes.is_empty() || bytes.len() % frame_size != 0 {
            return Err(PetalStreamError::UnsupportedOrCorruptSource(format!(
                "PCM length {} is not a whole number of {}-byte frames",
                bytes.len(),
                frame_size
            )));
        }

        let frames = bytes.len() / frame_size;
        let source = StreamSource {
            channels: self.channels,
            sample_rate: self.sample_rate,
            duration: Duration::from_secs_f64(frames as f64 / self.sample_rate as f64),
        };

        Ok(Box::new(RawPcmDecoder {
            bytes,
            cursor: 0,
            source,
        }))
    }
}

struct RawPcmDecoder {
    bytes: Arc<[u8]>,
    cursor: usize,
    source: StreamSource,
}

impl PcmDecoder for RawPcmDecoder {
    fn source(&self) -> StreamSource {
        self.source
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let remaining = &self.bytes[self.cursor..];
        let n = remaining.len().min(buffer.len());
        buffer[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        Ok(n)
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }
}
