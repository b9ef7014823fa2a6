//! PCM formats accepted by device buffers

/// Sample layout of the bytes submitted to a device buffer.
///
/// Only 16-bit signed little-endian PCM is streamed. Two-channel sources
/// are submitted as [`AudioFormat::Stereo16`], everything else as
/// [`AudioFormat::Mono16`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mono16,
    Stereo16,
}

impl AudioFormat {
    pub fn from_channels(channels: u16) -> Self {
        if channels == 2 {
            Self::Stereo16
        } else {
            Self::Mono16
        }
    }

    pub fn channels(&self) -> u16 {
        match self {
            Self::Mono16 => 1,
            Self::Stereo16 => 2,
        }
    }

    /// Bytes occupied by one interleaved frame
    pub fn frame_size(&self) -> usize {
        self.channels() as usize * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_channels() {
        assert_eq!(AudioFormat::from_channels(2), AudioFormat::Stereo16);
        assert_eq!(AudioFormat::from_channels(1), AudioFormat::Mono16);
        assert_eq!(AudioFormat::from_channels(6), AudioFormat::Mono16);
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(AudioFormat::Mono16.frame_size(), 2);
        assert_eq!(AudioFormat::Stereo16.frame_size(), 4);
    }
}
