//! WAV file format utilities.
//!
//! Generates and parses the canonical 44-byte RIFF header used by
//! `WavFileDevice`.

/// Size of the canonical WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Fields of a canonical WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    /// 1 = integer PCM, 3 = IEEE float.
    pub format_code: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub data_size: u32,
}

/// Generate a 44-byte WAV RIFF header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    file size - 8 (36 + data_size)
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (fmt chunk size)
/// [20-21]  format code (1 = PCM, 3 = IEEE float)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(spec: &WavSpec) -> [u8; WAV_HEADER_SIZE] {
    let block_align = spec.channels * spec.bit_depth / 8;
    let byte_rate = spec.sample_rate * block_align as u32;
    let chunk_size = 36u32.saturating_add(spec.data_size);

    let mut header = [0u8; WAV_HEADER_SIZE];

    // RIFF chunk descriptor
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt sub-chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&spec.format_code.to_le_bytes());
    header[22..24].copy_from_slice(&spec.channels.to_le_bytes());
    header[24..28].copy_from_slice(&spec.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&spec.bit_depth.to_le_bytes());

    // data sub-chunk
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&spec.data_size.to_le_bytes());

    header
}

/// Parse a canonical 44-byte header. Returns `None` if the magic is wrong.
pub fn parse_wav_header(bytes: &[u8]) -> Option<WavSpec> {
    let header = bytes.get(..WAV_HEADER_SIZE)?;
    if &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" || &header[36..40] != b"data" {
        return None;
    }
    let u16_at = |i: usize| u16::from_le_bytes([header[i], header[i + 1]]);
    let u32_at = |i: usize| u32::from_le_bytes([header[i], header[i + 1], header[i + 2], header[i + 3]]);
    Some(WavSpec {
        format_code: u16_at(20),
        channels: u16_at(22),
        sample_rate: u32_at(24),
        bit_depth: u16_at(34),
        data_size: u32_at(40),
    })
}
