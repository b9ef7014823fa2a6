//! Pull-based PCM decoding.
//!
//! A [`SourceLoader`] turns compressed bytes into a [`PcmDecoder`], which
//! yields interleaved 16-bit little-endian PCM on demand. The engine only
//! talks to decoders through [`DecoderAdapter`], which fills buffer slots and
//! reduces every way a stream can end to a single zero-byte fill.

mod pcm;
mod symphonia_decoder;

pub use pcm::PcmLoader;
pub use symphonia_decoder::SymphoniaLoader;

use crate::error::{PetalStreamError, Result};
use crate::format::AudioFormat;
use crate::pool::BufferSlot;
use std::sync::Arc;
use std::time::Duration;

/// Properties of an opened source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSource {
    pub channels: u16,
    pub sample_rate: u32,
    pub duration: Duration,
}

impl StreamSource {
    pub fn format(&self) -> AudioFormat {
        AudioFormat::from_channels(self.channels)
    }

    pub fn duration_in_seconds(&self) -> f32 {
        self.duration.as_secs_f32()
    }
}

/// Decode cursor over one audio asset
pub trait PcmDecoder: Send {
    fn source(&self) -> StreamSource;

    /// Writes up to `buffer.len()` bytes of interleaved 16-bit LE PCM.
    ///
    /// `Ok(0)` means the stream is exhausted. May return fewer bytes than
    /// requested before the end.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Moves the cursor back to the first frame
    fn rewind(&mut self) -> Result<()>;
}

/// Opens in-memory source bytes.
///
/// Implement this to stream formats or codecs the built-in loaders don't
/// cover.
///
/// # Example
///
/// ```
/// use petalstream::decoder::{PcmDecoder, PcmLoader, SourceLoader};
/// use std::sync::Arc;
///
/// let loader = PcmLoader::new(1, 8000);
/// let decoder = loader.open(Arc::from(vec![0u8; 16])).unwrap();
/// assert_eq!(decoder.source().channels, 1);
/// ```
pub trait SourceLoader {
    fn open(&self, bytes: Arc<[u8]>) -> Result<Box<dyn PcmDecoder>>;
}

/// Uniform slot-filling front end over any [`PcmDecoder`].
///
/// Decode faults never escape [`DecoderAdapter::fill_slot`]: they are
/// logged and reported as end of stream. After a zero-byte fill the adapter
/// keeps returning zero until [`DecoderAdapter::rewind`].
pub struct DecoderAdapter {
    decoder: Box<dyn PcmDecoder>,
    source: StreamSource,
    exhausted: bool,
}

impl DecoderAdapter {
    pub fn open(loader: &dyn SourceLoader, bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(PetalStreamError::UnsupportedOrCorruptSource(
                "Source is empty".to_string(),
            ));
        }

        let decoder = loader.open(bytes).map_err(|e| match e {
            PetalStreamError::UnsupportedOrCorruptSource(_) => e,
            other => PetalStreamError::UnsupportedOrCorruptSource(other.to_string()),
        })?;

        let source = decoder.source();
        if source.channels == 0 || source.channels > 2 {
            return Err(PetalStreamError::UnsupportedOrCorruptSource(format!(
                "Unsupported channel count: {}",
                source.channels
            )));
        }
        if source.sample_rate == 0 {
            return Err(PetalStreamError::UnsupportedOrCorruptSource(
                "Sample rate not found".to_string(),
            ));
        }

        Ok(Self {
            decoder,
            source,
            exhausted: false,
        })
    }

    pub fn source(&self) -> &StreamSource {
        &self.source
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fills `slot` from offset 0 with up to `max_bytes` of whole frames.
    ///
    /// Returns the number of bytes written; `0` exactly when the stream is
    /// exhausted.
    pub fn fill_slot(&mut self, slot: &mut BufferSlot, max_bytes: usize) -> usize {
        if self.exhausted {
            slot.set_len(0);
            return 0;
        }

        let frame_size = self.source.format().frame_size();
        let mut budget = max_bytes.min(slot.capacity());
        budget -= budget % frame_size;

        let storage = &mut slot.storage_mut()[..budget];
        let mut written = 0;
        while written < budget {
            match self.decoder.read(&mut storage[written..]) {
                Ok(0) => {
                    self.exhausted = true;
                    break;
                }
                Ok(n) => written += n,
                Err(e) => {
                    log::warn!("Decode fault, ending stream early: {}", e);
                    self.exhausted = true;
                    break;
                }
            }
        }

        written -= written % frame_size;
        if written == 0 {
            self.exhausted = true;
        }
        slot.set_len(written);
        written
    }

    /// Resets the read cursor to the start of the stream.
    ///
    /// A decoder that cannot rewind leaves the adapter exhausted, so the
    /// next fill reports end of stream instead of failing.
    pub fn rewind(&mut self) {
        match self.decoder.rewind() {
            Ok(()) => self.exhausted = false,
            Err(e) => {
                log::warn!("Rewind failed, source left exhausted: {}", e);
                self.exhausted = true;
            }
        }
    }
}
