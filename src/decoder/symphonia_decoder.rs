use super::{PcmDecoder, SourceLoader, StreamSource};
use crate::error::{PetalStreamError, Result};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use symphonia::{
    core::{
        audio::SampleBuffer,
        codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions},
        errors::Error,
        formats::{FormatOptions, FormatReader},
        io::MediaSourceStream,
        meta::MetadataOptions,
        probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Default source loader backed by the Symphonia decoder library.
///
/// Supports every container and codec enabled in Symphonia's default
/// feature set (WAV, FLAC, OGG/Vorbis, ...). Packets are decoded lazily as
/// the engine asks for more bytes.
///
/// # Examples
///
/// ```ignore
/// use petalstream::decoder::{DecoderAdapter, SymphoniaLoader};
///
/// let bytes = std::fs::read("music/theme.ogg")?;
/// let adapter = DecoderAdapter::open(&SymphoniaLoader::with_extension("ogg"), bytes)?;
/// println!("{:?}", adapter.source());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SymphoniaLoader {
    extension: Option<String>,
}

impl SymphoniaLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a file extension as a probing hint
    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            extension: Some(extension.into()),
        }
    }
}

impl SourceLoader for SymphoniaLoader {
    fn open(&self, bytes: Arc<[u8]>) -> Result<Box<dyn PcmDecoder>> {
        let probed = probe(&bytes, self.extension.as_deref())?;
        Ok(Box::new(SymphoniaDecoder {
            bytes,
            extension: self.extension.clone(),
            format: probed.format,
            decoder: probed.decoder,
            track_id: probed.track_id,
            source: probed.source,
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
            fault: None,
        }))
    }
}

struct Probed {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    source: StreamSource,
}

fn corrupt(message: String) -> PetalStreamError {
    PetalStreamError::UnsupportedOrCorruptSource(message)
}

fn probe(bytes: &Arc<[u8]>, extension: Option<&str>) -> Result<Probed> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.clone())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| corrupt(format!("Failed to probe audio format: {}", e)))?;

    let format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| corrupt("No supported audio track found".to_string()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| corrupt("Sample rate not found".to_string()))?;

    let channels = params
        .channels
        .ok_or_else(|| corrupt("Channel count not found".to_string()))?
        .count() as u16;

    let duration = match (params.time_base, params.n_frames) {
        (Some(time_base), Some(frames)) => {
            let time = time_base.calc_time(frames);
            Duration::from_secs_f64(time.seconds as f64 + time.frac)
        }
        (None, Some(frames)) => Duration::from_secs_f64(frames as f64 / sample_rate as f64),
        _ => Duration::ZERO,
    };

    let decoder = get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| corrupt(format!("Failed to create decoder: {}", e)))?;

    Ok(Probed {
        format,
        decoder,
        track_id,
        source: StreamSource {
            channels,
            sample_rate,
            duration,
        },
    })
}

struct SymphoniaDecoder {
    bytes: Arc<[u8]>,
    extension: Option<String>,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    source: StreamSource,
    /// Decoded bytes of the current packet not yet handed out
    pending: Vec<u8>,
    pending_pos: usize,
    finished: bool,
    /// Fault hit after some bytes were already returned; reported next read
    fault: Option<PetalStreamError>,
}

impl SymphoniaDecoder {
    /// Decodes the next packet of our track into `pending`.
    /// Returns `false` at end of stream.
    fn decode_next(&mut self) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(_)) => return Ok(false), // end-of-file
                Err(Error::ResetRequired) => return Ok(false),
                Err(e) => {
                    return Err(PetalStreamError::Decode(format!(
                        "Error reading packet: {}",
                        e
                    )));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = self.decoder.decode(&packet).map_err(|e| {
                PetalStreamError::Decode(format!("Error decoding packet: {}", e))
            })?;

            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let mut tmp = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            tmp.copy_interleaved_ref(decoded);

            self.pending.clear();
            self.pending_pos = 0;
            self.pending
                .extend(tmp.samples().iter().flat_map(|s| s.to_le_bytes()));
            return Ok(true);
        }
    }
}

impl PcmDecoder for SymphoniaDecoder {
    fn source(&self) -> StreamSource {
        self.source
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if let Some(fault) = self.fault.take() {
            return Err(fault);
        }

        let mut written = 0;
        while written < buffer.len() {
            let available = self.pending.len() - self.pending_pos;
            if available > 0 {
                let n = available.min(buffer.len() - written);
                buffer[written..written + n]
                    .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
                self.pending_pos += n;
                written += n;
                continue;
            }

            if self.finished {
                break;
            }

            match self.decode_next() {
                Ok(true) => {}
                Ok(false) => self.finished = true,
                Err(e) if written == 0 => return Err(e),
                Err(e) => {
                    self.fault = Some(e);
                    break;
                }
            }
        }

        Ok(written)
    }

    fn rewind(&mut self) -> Result<()> {
        let probed = probe(&self.bytes, self.extension.as_deref())?;
        self.format = probed.format;
        self.decoder = probed.decoder;
        self.track_id = probed.track_id;
        self.pending.clear();
        self.pending_pos = 0;
        self.finished = false;
        self.fault = None;
        Ok(())
    }
}
