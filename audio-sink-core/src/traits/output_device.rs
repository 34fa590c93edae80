use std::sync::Arc;
use std::time::Duration;

use crate::models::audio_models::AudioDevice;
use crate::models::config::{ConversionQuality, PerformanceMode, SharingMode, SinkConfiguration};
use crate::models::error::SinkError;
use crate::models::format::FormatDescriptor;
use crate::models::state::StreamState;
use crate::traits::audio_callback::AudioCallback;

/// Parameters a device stream is opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub format: FormatDescriptor,
    pub sample_rate: u32,
    pub sharing_mode: SharingMode,
    pub performance_mode: PerformanceMode,
    pub conversion_quality: ConversionQuality,
    pub frames_per_callback: Option<u32>,
    /// Device-side buffer for push mode, in frames.
    pub buffer_capacity_frames: u32,
}

impl StreamRequest {
    pub fn from_config(config: &SinkConfiguration, format: FormatDescriptor) -> Self {
        Self {
            format,
            sample_rate: config.sample_rate,
            sharing_mode: config.sharing_mode,
            performance_mode: config.performance_mode,
            conversion_quality: config.conversion_quality,
            frames_per_callback: config.frames_per_callback,
            buffer_capacity_frames: config.buffer_capacity_frames,
        }
    }
}

/// How the opened stream gets its data.
#[derive(Clone)]
pub enum StreamDriver {
    /// The device pulls frames from this callback on its real-time thread.
    Callback(Arc<dyn AudioCallback>),
    /// The producer pushes frames through `OutputStream::write`.
    Blocking,
}

impl StreamDriver {
    pub fn is_callback(&self) -> bool {
        matches!(self, Self::Callback(_))
    }
}

/// Interface for audio output backends.
///
/// Implemented by:
/// - `NullDevice` (manually pumped, for tests)
/// - `WavFileDevice` (renders to a WAV file in real time)
/// - `CpalOutputDevice` (`audio-sink-cpal`)
pub trait OutputDevice: Send + Sync {
    /// Whether the device can currently be opened.
    fn is_available(&self) -> bool;

    /// Acquire an output stream. Failure leaves nothing held.
    fn open_stream(
        &self,
        request: &StreamRequest,
        driver: StreamDriver,
    ) -> Result<Arc<dyn OutputStream>, SinkError>;

    /// Information about the device backing this output.
    fn device_info(&self) -> AudioDevice;
}

impl<T: OutputDevice + ?Sized> OutputDevice for Arc<T> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn open_stream(
        &self,
        request: &StreamRequest,
        driver: StreamDriver,
    ) -> Result<Arc<dyn OutputStream>, SinkError> {
        (**self).open_stream(request, driver)
    }

    fn device_info(&self) -> AudioDevice {
        (**self).device_info()
    }
}

/// An acquired output stream.
///
/// Methods take `&self` so a blocked `write` never stops another thread from
/// pausing or stopping the stream.
pub trait OutputStream: Send + Sync {
    fn request_start(&self) -> Result<(), SinkError>;

    fn request_pause(&self) -> Result<(), SinkError>;

    /// Discard audio buffered in the device without playing it.
    fn request_flush(&self) -> Result<(), SinkError>;

    /// Stop delivering frames. Once this returns the data callback will not
    /// be invoked again and blocked writers have been released.
    fn request_stop(&self) -> Result<(), SinkError>;

    /// Release the underlying resource. Idempotent.
    fn close(&self) -> Result<(), SinkError>;

    fn state(&self) -> StreamState;

    /// Sharing mode the backend actually granted.
    fn granted_sharing_mode(&self) -> SharingMode;

    /// Blocking write of `frame_count` frames from `data`.
    ///
    /// Returns the number of frames accepted before `timeout` elapsed.
    /// Only meaningful for streams opened with `StreamDriver::Blocking`.
    fn write(&self, data: &[u8], frame_count: usize, timeout: Duration) -> Result<usize, SinkError>;
}
