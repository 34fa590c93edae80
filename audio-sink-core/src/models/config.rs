use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::SinkError;
use super::format::{FormatDescriptor, SampleFormat};

/// Effectively unbounded timeout for push-mode writes.
pub const BLOCKING_WRITE_TIMEOUT: Duration = Duration::MAX;

/// How audio reaches the device once the sink is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Pull model: the device's real-time thread drains the pending queue.
    #[default]
    Callback,
    /// Push model: the producer blocks in `write` until the device accepts data.
    Blocking,
}

/// Whether the output resource is reserved for this sink alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingMode {
    #[default]
    Exclusive,
    Shared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceMode {
    None,
    PowerSaving,
    #[default]
    LowLatency,
}

/// Sample-rate conversion quality requested from the backend (best effort).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionQuality {
    None,
    Fastest,
    Low,
    Medium,
    High,
    #[default]
    Best,
}

/// Configuration for an output sink.
///
/// Validated as a whole when the sink opens; nothing here is mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfiguration {
    /// Interleaved channel count (default: 2).
    pub channel_count: u16,

    /// Sample rate in Hz (default: 44100).
    pub sample_rate: u32,

    /// Bits per sample. Valid values: 16, 24, 32.
    pub bit_depth: u16,

    /// Float encoding; only meaningful when `bit_depth` is 32.
    pub is_float: bool,

    pub mode: OutputMode,

    pub sharing_mode: SharingMode,

    pub performance_mode: PerformanceMode,

    pub conversion_quality: ConversionQuality,

    /// Frames requested per real-time callback, or `None` for the device default.
    pub frames_per_callback: Option<u32>,

    /// Maximum number of buffers waiting in the pull-mode queue.
    pub max_pending_buffers: usize,

    /// Size of the device-side ring used by push mode, in frames.
    pub buffer_capacity_frames: u32,

    /// Default timeout for push-mode writes.
    #[serde(with = "timeout_nanos")]
    pub write_timeout: Duration,
}

impl SinkConfiguration {
    /// Configuration for the given stream parameters, all other fields default.
    pub fn new(channel_count: u16, sample_rate: u32, bit_depth: u16, is_float: bool) -> Self {
        Self {
            channel_count,
            sample_rate,
            bit_depth,
            is_float,
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn sample_format(&self) -> SampleFormat {
        SampleFormat::configure(self.bit_depth, self.is_float)
    }

    pub fn validate(&self) -> Result<(), SinkError> {
        if self.channel_count == 0 {
            return Err(SinkError::ConfigurationFailed(
                "channel count must be at least 1".into(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(SinkError::ConfigurationFailed("sample rate must be positive".into()));
        }
        if !self.sample_format().is_specified() {
            return Err(SinkError::UnsupportedFormat {
                bit_depth: self.bit_depth,
                is_float: self.is_float,
            });
        }
        if self.frames_per_callback == Some(0) {
            return Err(SinkError::ConfigurationFailed(
                "frames per callback must be positive".into(),
            ));
        }
        if self.mode == OutputMode::Callback && self.max_pending_buffers == 0 {
            return Err(SinkError::ConfigurationFailed(
                "pending queue needs room for at least one buffer".into(),
            ));
        }
        if self.mode == OutputMode::Blocking && self.buffer_capacity_frames == 0 {
            return Err(SinkError::ConfigurationFailed(
                "buffer capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Validate and derive the frame layout.
    pub fn format_descriptor(&self) -> Result<FormatDescriptor, SinkError> {
        self.validate()?;
        FormatDescriptor::new(self.channel_count, self.bit_depth, self.is_float)
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, SinkError> {
        serde_json::from_str(json)
            .map_err(|e| SinkError::ConfigurationFailed(format!("invalid configuration: {}", e)))
    }

    pub fn to_json(&self) -> Result<String, SinkError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SinkError::ConfigurationFailed(format!("failed to serialize configuration: {}", e)))
    }
}

impl Default for SinkConfiguration {
    fn default() -> Self {
        Self {
            channel_count: 2,
            sample_rate: 44100,
            bit_depth: 16,
            is_float: false,
            mode: OutputMode::Callback,
            sharing_mode: SharingMode::Exclusive,
            performance_mode: PerformanceMode::LowLatency,
            conversion_quality: ConversionQuality::Best,
            frames_per_callback: None,
            max_pending_buffers: 64,
            buffer_capacity_frames: 4096,
            write_timeout: BLOCKING_WRITE_TIMEOUT,
        }
    }
}

/// Timeouts travel as nanoseconds, saturating at `u64::MAX`.
mod timeout_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(value.as_nanos()).unwrap_or(u64::MAX);
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = u64::deserialize(deserializer)?;
        if nanos == u64::MAX {
            Ok(super::BLOCKING_WRITE_TIMEOUT)
        } else {
            Ok(Duration::from_nanos(nanos))
        }
    }
}
