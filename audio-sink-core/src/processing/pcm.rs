//! Conversions between `f32` samples and the little-endian byte layouts the
//! sink accepts.

use crate::models::format::SampleFormat;

const I24_MAX: f32 = 8_388_607.0;

/// Append `sample` (clamped to `[-1.0, 1.0]`) to `out` in `format`.
///
/// `Unspecified` appends nothing.
pub fn encode_sample(sample: f32, format: SampleFormat, out: &mut Vec<u8>) {
    let clamped = sample.clamp(-1.0, 1.0);
    match format {
        SampleFormat::Float32 => out.extend_from_slice(&clamped.to_le_bytes()),
        SampleFormat::I32 => {
            let value = (clamped as f64 * i32::MAX as f64) as i32;
            out.extend_from_slice(&value.to_le_bytes());
        }
        SampleFormat::I24Packed => {
            let value = (clamped * I24_MAX) as i32;
            out.extend_from_slice(&value.to_le_bytes()[..3]);
        }
        SampleFormat::I16 => {
            let value = (clamped * i16::MAX as f32) as i16;
            out.extend_from_slice(&value.to_le_bytes());
        }
        SampleFormat::Unspecified => {}
    }
}

/// Encode a slice of samples. Output length = `samples.len() * bytes_per_sample`.
pub fn encode_samples(samples: &[f32], format: SampleFormat) -> Vec<u8> {
    let width = format.bytes_per_sample().unwrap_or(0);
    let mut data = Vec::with_capacity(samples.len() * width);
    for &sample in samples {
        encode_sample(sample, format, &mut data);
    }
    data
}

/// Decode one sample from the start of `bytes`.
///
/// Returns `None` if `bytes` is shorter than one sample or the format is unspecified.
pub fn decode_sample(bytes: &[u8], format: SampleFormat) -> Option<f32> {
    let width = format.bytes_per_sample()?;
    let bytes = bytes.get(..width)?;
    let sample = match format {
        SampleFormat::Float32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        SampleFormat::I32 => {
            let value = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            (value as f64 / i32::MAX as f64) as f32
        }
        SampleFormat::I24Packed => i24_to_i32(bytes[0], bytes[1], bytes[2]) as f32 / I24_MAX,
        SampleFormat::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / i16::MAX as f32,
        SampleFormat::Unspecified => return None,
    };
    Some(sample)
}

/// Sign-extend a packed little-endian 24-bit sample.
pub fn i24_to_i32(b0: u8, b1: u8, b2: u8) -> i32 {
    // Shift into the top three bytes, then arithmetic-shift back down.
    i32::from_le_bytes([0, b0, b1, b2]) >> 8
}

/// Widen packed 24-bit samples into left-justified 32-bit samples.
///
/// Converts `min(src.len() / 3, dest.len() / 4)` samples and returns that count.
pub fn expand_i24_to_i32(src: &[u8], dest: &mut [u8]) -> usize {
    let samples = (src.len() / 3).min(dest.len() / 4);
    for (packed, wide) in src.chunks_exact(3).zip(dest.chunks_exact_mut(4)).take(samples) {
        wide.copy_from_slice(&[0, packed[0], packed[1], packed[2]]);
    }
    samples
}
