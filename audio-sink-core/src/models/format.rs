use serde::{Deserialize, Serialize};

use super::error::SinkError;

/// Sample encoding of the PCM data handed to the sink.
///
/// `Unspecified` is what any unrecognised bit depth maps to. It is never
/// coerced into another format; opening a sink with it is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    Float32,
    I32,
    /// Signed 24-bit little-endian, packed into three bytes.
    I24Packed,
    #[default]
    I16,
    Unspecified,
}

impl SampleFormat {
    /// Map a caller-supplied bit depth and float flag onto a sample format.
    ///
    /// `is_float` only matters for 32-bit data.
    pub fn configure(bit_depth: u16, is_float: bool) -> Self {
        match (bit_depth, is_float) {
            (32, true) => Self::Float32,
            (32, false) => Self::I32,
            (24, _) => Self::I24Packed,
            (16, _) => Self::I16,
            _ => Self::Unspecified,
        }
    }

    /// Width of one sample in bytes, or `None` for `Unspecified`.
    pub fn bytes_per_sample(self) -> Option<usize> {
        match self {
            Self::Float32 | Self::I32 => Some(4),
            Self::I24Packed => Some(3),
            Self::I16 => Some(2),
            Self::Unspecified => None,
        }
    }

    pub fn bit_depth(self) -> Option<u16> {
        self.bytes_per_sample().map(|bytes| bytes as u16 * 8)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32)
    }

    pub fn is_specified(self) -> bool {
        !matches!(self, Self::Unspecified)
    }

    /// WAVE `fmt ` format code: 1 for integer PCM, 3 for IEEE float.
    pub fn wav_format_code(self) -> u16 {
        if self.is_float() {
            3
        } else {
            1
        }
    }
}

/// Number of whole frames contained in `byte_size` bytes.
///
/// A trailing partial frame is dropped (truncation). `Unspecified` formats and
/// a zero channel count fail instead of dividing by an undefined frame width.
pub fn frame_count(byte_size: usize, channel_count: u16, format: SampleFormat) -> Result<usize, SinkError> {
    let bytes_per_sample = format
        .bytes_per_sample()
        .ok_or_else(|| SinkError::ConfigurationFailed("sample format is unspecified".into()))?;
    if channel_count == 0 {
        return Err(SinkError::InvalidArgument("channel count must be at least 1".into()));
    }
    Ok(byte_size / (channel_count as usize * bytes_per_sample))
}

/// Layout of one interleaved PCM frame, fixed for the lifetime of an open sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatDescriptor {
    channel_count: u16,
    format: SampleFormat,
}

impl FormatDescriptor {
    /// Build a descriptor from open-time parameters.
    ///
    /// Rejects unsupported bit depths and zero channels, so a constructed
    /// descriptor always has a non-zero frame width.
    pub fn new(channel_count: u16, bit_depth: u16, is_float: bool) -> Result<Self, SinkError> {
        let format = SampleFormat::configure(bit_depth, is_float);
        if !format.is_specified() {
            return Err(SinkError::UnsupportedFormat { bit_depth, is_float });
        }
        Self::with_format(channel_count, format)
    }

    pub fn with_format(channel_count: u16, format: SampleFormat) -> Result<Self, SinkError> {
        if !format.is_specified() {
            return Err(SinkError::ConfigurationFailed("sample format is unspecified".into()));
        }
        if channel_count == 0 {
            return Err(SinkError::ConfigurationFailed(
                "channel count must be at least 1".into(),
            ));
        }
        Ok(Self { channel_count, format })
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn bytes_per_sample(&self) -> usize {
        // Unspecified is rejected at construction.
        self.format.bytes_per_sample().unwrap_or(0)
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channel_count as usize
    }

    /// Whole frames in `byte_size` bytes (truncating).
    pub fn frame_count(&self, byte_size: usize) -> usize {
        byte_size / self.bytes_per_frame()
    }

    /// Bytes left over after the last whole frame.
    pub fn trailing_bytes(&self, byte_size: usize) -> usize {
        byte_size % self.bytes_per_frame()
    }

    pub fn frames_to_bytes(&self, frames: usize) -> usize {
        frames * self.bytes_per_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_maps_supported_depths() {
        assert_eq!(SampleFormat::configure(32, true), SampleFormat::Float32);
        assert_eq!(SampleFormat::configure(32, false), SampleFormat::I32);
        assert_eq!(SampleFormat::configure(24, false), SampleFormat::I24Packed);
        assert_eq!(SampleFormat::configure(24, true), SampleFormat::I24Packed);
        assert_eq!(SampleFormat::configure(16, false), SampleFormat::I16);
        assert_eq!(SampleFormat::configure(16, true), SampleFormat::I16);
    }

    #[test]
    fn bytes_per_sample_matches_depth() {
        assert_eq!(SampleFormat::Float32.bytes_per_sample(), Some(4));
        assert_eq!(SampleFormat::I32.bytes_per_sample(), Some(4));
        assert_eq!(SampleFormat::I24Packed.bytes_per_sample(), Some(3));
        assert_eq!(SampleFormat::I16.bytes_per_sample(), Some(2));
        assert_eq!(SampleFormat::Unspecified.bytes_per_sample(), None);
    }

    #[test]
    fn unknown_depths_are_unspecified() {
        for depth in [0u16, 1, 8, 12, 20, 48, 64] {
            assert_eq!(SampleFormat::configure(depth, false), SampleFormat::Unspecified);
            assert_eq!(SampleFormat::configure(depth, true), SampleFormat::Unspecified);
        }
    }

    #[test]
    fn default_is_i16() {
        assert_eq!(SampleFormat::default(), SampleFormat::I16);
    }

    #[test]
    fn frame_count_truncates_partial_frames() {
        // stereo 16-bit: 4 bytes per frame
        assert_eq!(frame_count(4608, 2, SampleFormat::I16).unwrap(), 1152);
        assert_eq!(frame_count(4611, 2, SampleFormat::I16).unwrap(), 1152);
        assert_eq!(frame_count(3, 2, SampleFormat::I16).unwrap(), 0);
        assert_eq!(frame_count(17, 2, SampleFormat::I24Packed).unwrap(), 2);
    }

    #[test]
    fn frame_count_remainder_is_below_one_frame() {
        let formats = [
            SampleFormat::Float32,
            SampleFormat::I32,
            SampleFormat::I24Packed,
            SampleFormat::I16,
        ];
        for format in formats {
            let bps = format.bytes_per_sample().unwrap();
            for channels in 1u16..=8 {
                for byte_size in [0usize, 1, 7, 100, 1023, 4096, 9999] {
                    let frames = frame_count(byte_size, channels, format).unwrap();
                    let used = frames * channels as usize * bps;
                    assert!(used <= byte_size);
                    assert!(byte_size - used < channels as usize * bps);
                }
            }
        }
    }

    #[test]
    fn frame_count_rejects_unspecified() {
        assert!(matches!(
            frame_count(1024, 2, SampleFormat::Unspecified),
            Err(SinkError::ConfigurationFailed(_))
        ));
        assert!(frame_count(1024, 0, SampleFormat::I16).is_err());
    }

    #[test]
    fn descriptor_rejects_unsupported() {
        assert_eq!(
            FormatDescriptor::new(2, 8, false),
            Err(SinkError::UnsupportedFormat { bit_depth: 8, is_float: false })
        );
        assert!(FormatDescriptor::new(0, 16, false).is_err());
    }

    #[test]
    fn descriptor_frame_math() {
        let desc = FormatDescriptor::new(2, 16, false).unwrap();
        assert_eq!(desc.bytes_per_frame(), 4);
        assert_eq!(desc.frame_count(4610), 1152);
        assert_eq!(desc.trailing_bytes(4610), 2);
        assert_eq!(desc.frames_to_bytes(1152), 4608);

        let desc = FormatDescriptor::new(6, 24, false).unwrap();
        assert_eq!(desc.bytes_per_frame(), 18);

        let desc = FormatDescriptor::new(1, 32, true).unwrap();
        assert_eq!(desc.format(), SampleFormat::Float32);
        assert_eq!(desc.bytes_per_frame(), 4);
    }

    #[test]
    fn wav_codes() {
        assert_eq!(SampleFormat::Float32.wav_format_code(), 3);
        assert_eq!(SampleFormat::I24Packed.wav_format_code(), 1);
        assert_eq!(SampleFormat::I16.bit_depth(), Some(16));
        assert_eq!(SampleFormat::I24Packed.bit_depth(), Some(24));
    }
}
