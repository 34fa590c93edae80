//! # audio-sink-cpal
//!
//! cpal output backend for audio-sink-core.
//!
//! Provides:
//! - `CpalOutputDevice`: default or named output device, implements `OutputDevice`
//! - `CpalOutputStream`: cpal stream owned by a dedicated control thread
//! - `DeviceEnumerator`: output device listing
//!
//! ## Platform Notes
//! - cpal exposes shared access only; exclusive requests are granted as shared
//! - Packed 24-bit PCM is opened as 32-bit and widened in the data callback
//! - cpal does not resample: the requested rate must be supported by the device
//!
//! ## Usage
//! ```ignore
//! use audio_sink_cpal::CpalOutputDevice;
//! use audio_sink_core::{SinkConfiguration, StreamSink};
//!
//! let device = CpalOutputDevice::default_device()?;
//! let sink = StreamSink::new(device);
//! sink.open(SinkConfiguration::new(2, 48000, 16, false))?;
//! sink.start()?;
//! ```

pub mod cpal_device;
pub mod cpal_stream;
pub mod device_enumerator;
pub mod error;

pub use cpal_device::CpalOutputDevice;
pub use cpal_stream::CpalOutputStream;
pub use device_enumerator::DeviceEnumerator;
pub use error::BackendError;
