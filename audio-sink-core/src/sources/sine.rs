use std::f64::consts::TAU;

use crate::models::format::FormatDescriptor;
use crate::processing::pcm;
use crate::traits::pcm_source::PcmSource;

pub const DEFAULT_FREQUENCY: f64 = 440.0;
pub const DEFAULT_AMPLITUDE: f32 = 0.5;

/// Test tone: the same sine written to every channel.
///
/// Phase is carried across `read_frames` calls, so consecutive buffers join
/// without a click.
#[derive(Debug, Clone)]
pub struct SineGenerator {
    format: FormatDescriptor,
    sample_rate: u32,
    frequency: f64,
    amplitude: f32,
    phase: f64,
    /// Frames left before the source is exhausted; `None` runs forever.
    remaining: Option<u64>,
}

impl SineGenerator {
    /// A `sample_rate` of 0 is treated as 1 Hz.
    pub fn new(format: FormatDescriptor, sample_rate: u32) -> Self {
        Self {
            format,
            sample_rate: sample_rate.max(1),
            frequency: DEFAULT_FREQUENCY,
            amplitude: DEFAULT_AMPLITUDE,
            phase: 0.0,
            remaining: None,
        }
    }

    pub fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = frequency;
        self
    }

    /// Peak amplitude, clamped to `[0.0, 1.0]`.
    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    /// Stop after `frames` frames.
    pub fn with_duration(mut self, frames: u64) -> Self {
        self.remaining = Some(frames);
        self
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    fn next_sample(&mut self) -> f32 {
        let value = (self.phase * TAU).sin() as f32 * self.amplitude;
        self.phase = (self.phase + self.frequency / self.sample_rate as f64).fract();
        value
    }
}

impl PcmSource for SineGenerator {
    fn format(&self) -> FormatDescriptor {
        self.format
    }

    fn read_frames(&mut self, frame_count: usize) -> Option<Vec<u8>> {
        let frames = match self.remaining {
            Some(0) => return None,
            Some(left) => frame_count.min(left as usize),
            None => frame_count,
        };
        if frames == 0 {
            return None;
        }

        let channels = self.format.channel_count() as usize;
        let sample_format = self.format.format();
        let mut data = Vec::with_capacity(self.format.frames_to_bytes(frames));
        for _ in 0..frames {
            let sample = self.next_sample();
            for _ in 0..channels {
                pcm::encode_sample(sample, sample_format, &mut data);
            }
        }

        if let Some(left) = self.remaining.as_mut() {
            *left -= frames as u64;
        }
        Some(data)
    }
}
