use crate::error::{PetalStreamError, Result};
use rubato::{FftFixedIn, Resampler};

/// Upper bound on zero-padded passes when flushing the filter delay
const MAX_FLUSH_ROUNDS: usize = 16;

/// Sample-rate converter for a continuous stream of interleaved buffers.
///
/// Input that does not fill a whole resampler chunk is carried over to the
/// next call, so consecutive buffers are converted without seams.
pub struct StreamResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: u16,
    chunk_size: usize,
    resampler: Option<FftFixedIn<f32>>,
    pending: Vec<Vec<f32>>,
    frames_in: u64,
    frames_out: u64,
}

impl StreamResampler {
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(PetalStreamError::InvalidConfiguration(
                "Sample rates must be greater than 0".to_string(),
            ));
        }

        if channels == 0 {
            return Err(PetalStreamError::InvalidConfiguration(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        let chunk_size = chunk_size.unwrap_or(1024);
        let resampler = Self::build(source_sample_rate, target_sample_rate, channels, chunk_size)?;

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            channels,
            chunk_size,
            resampler,
            pending: vec![Vec::new(); channels as usize],
            frames_in: 0,
            frames_out: 0,
        })
    }

    fn build(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        chunk_size: usize,
    ) -> Result<Option<FftFixedIn<f32>>> {
        if source_sample_rate == target_sample_rate {
            return Ok(None);
        }

        let resampler = FftFixedIn::new(
            source_sample_rate as usize,
            target_sample_rate as usize,
            chunk_size,
            2, // sub_chunks
            channels as usize,
        )
        .map_err(|e| {
            PetalStreamError::AudioDevice(format!("Failed to create resampler: {}", e))
        })?;

        Ok(Some(resampler))
    }

    /// Converts interleaved samples and returns whatever output is ready.
    pub fn process_interleaved(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(interleaved.to_vec());
        };

        let channels = self.channels as usize;
        for frame in interleaved.chunks_exact(channels) {
            for (ch, sample) in frame.iter().enumerate() {
                self.pending[ch].push(*sample);
            }
        }
        self.frames_in += (interleaved.len() / channels) as u64;

        let mut output = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }

            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|ch| ch.drain(..needed).collect())
                .collect();

            let waves_out = resampler
                .process(&chunk, None)
                .map_err(|e| PetalStreamError::AudioDevice(format!("Resampling error: {}", e)))?;

            let frames = waves_out.first().map_or(0, |ch| ch.len());
            interleave_into(&mut output, &waves_out, frames);
            self.frames_out += frames as u64;
        }

        Ok(output)
    }

    /// Pushes carried-over input and the filter delay through the resampler.
    ///
    /// The returned samples complete the stream so that its total length
    /// matches the rate ratio. The resampler is reset afterwards.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let ratio = self.resample_ratio();
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(Vec::new());
        };

        let target =
            (self.frames_in as f64 * ratio).round() as u64 + resampler.output_delay() as u64;
        let mut tail: Option<Vec<Vec<f32>>> = if self.pending[0].is_empty() {
            None
        } else {
            Some(self.pending.iter_mut().map(std::mem::take).collect())
        };

        let mut output = Vec::new();
        for _ in 0..MAX_FLUSH_ROUNDS {
            if self.frames_out >= target {
                break;
            }
            let waves_out = match tail.take() {
                Some(chunk) => resampler.process_partial(Some(chunk.as_slice()), None),
                None => resampler.process_partial(None::<&[Vec<f32>]>, None),
            }
            .map_err(|e| PetalStreamError::AudioDevice(format!("Resampling error: {}", e)))?;

            let frames = waves_out.first().map_or(0, |ch| ch.len());
            let keep = frames.min((target - self.frames_out) as usize);
            interleave_into(&mut output, &waves_out, keep);
            self.frames_out += keep as u64;
        }

        self.reset()?;
        Ok(output)
    }

    /// Drops carried-over input and filter state
    pub fn reset(&mut self) -> Result<()> {
        for ch in &mut self.pending {
            ch.clear();
        }
        self.frames_in = 0;
        self.frames_out = 0;
        self.resampler = Self::build(
            self.source_sample_rate,
            self.target_sample_rate,
            self.channels,
            self.chunk_size,
        )?;
        Ok(())
    }

    /// Filter latency in output frames
    pub fn output_delay(&self) -> usize {
        self.resampler.as_ref().map_or(0, |r| r.output_delay())
    }

    pub fn pending_frames(&self) -> usize {
        self.pending.first().map_or(0, |ch| ch.len())
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn resample_ratio(&self) -> f64 {
        self.target_sample_rate as f64 / self.source_sample_rate as f64
    }
}

fn interleave_into(output: &mut Vec<f32>, waves: &[Vec<f32>], frames: usize) {
    output.reserve(frames * waves.len());
    for frame_idx in 0..frames {
        for ch in waves {
            output.push(ch[frame_idx]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resampler_creation() {
        let resampler = StreamResampler::new(44100, 48000, 2, None);
        assert!(resampler.is_ok());

        let resampler = resampler.unwrap();
        assert_eq!(resampler.source_sample_rate(), 44100);
        assert_eq!(resampler.target_sample_rate(), 48000);
    }

    #[test]
    fn test_resampler_no_resampling_needed() {
        let mut resampler = StreamResampler::new(44100, 44100, 1, None).unwrap();
        let samples = vec![0.1, 0.2, 0.3, 0.4];
        let result = resampler.process_interleaved(&samples).unwrap();
        assert_eq!(result, samples);
    }

    #[test]
    fn test_invalid_sample_rates() {
        assert!(StreamResampler::new(0, 48000, 2, None).is_err());
        assert!(StreamResampler::new(44100, 0, 2, None).is_err());
        assert!(StreamResampler::new(44100, 48000, 0, None).is_err());
    }

    #[test]
    fn test_short_input_is_carried_over() {
        let mut resampler = StreamResampler::new(44100, 48000, 2, Some(1024)).unwrap();

        let out = resampler.process_interleaved(&[0.0; 20]).unwrap();
        assert!(out.is_empty());
        assert_eq!(resampler.pending_frames(), 10);

        let out = resampler.process_interleaved(&vec![0.0; 2 * 8192]).unwrap();
        assert!(!out.is_empty());
        assert_eq!(out.len() % 2, 0);

        resampler.reset().unwrap();
        assert_eq!(resampler.pending_frames(), 0);
    }

    #[test]
    fn test_flush_emits_the_stream_tail() {
        let mut resampler = StreamResampler::new(44100, 48000, 1, Some(1024)).unwrap();
        let delay = resampler.output_delay();

        let mut frames = resampler.process_interleaved(&vec![0.25; 3616]).unwrap().len();
        assert_eq!(resampler.pending_frames(), 544);

        frames += resampler.flush().unwrap().len();
        let expected = (3616.0 * 48000.0 / 44100.0_f64).round() as usize;
        assert_eq!(frames, expected + delay);
        assert_eq!(resampler.pending_frames(), 0);
    }

    #[test]
    fn test_flush_without_resampling_is_empty() {
        let mut resampler = StreamResampler::new(48000, 48000, 2, None).unwrap();
        resampler.process_interleaved(&[0.1; 6]).unwrap();
        assert!(resampler.flush().unwrap().is_empty());
    }
}
