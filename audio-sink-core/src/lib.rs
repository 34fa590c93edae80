//! # audio-sink-core
//!
//! Platform-agnostic low-latency PCM output sink.
//!
//! Provides the frame layout model, the sink lifecycle, the pull-mode pending
//! queue consumed by a real-time callback, the push-mode blocking write path,
//! and a handle-based registry for binding layers. Hardware backends
//! (`audio-sink-cpal`) implement the `OutputDevice` trait and plug into the
//! generic `StreamSink`.
//!
//! ## Architecture
//!
//! ```text
//! audio-sink-core (this crate)
//! ├── traits/       ← OutputDevice, OutputStream, AudioCallback, SinkDelegate, PcmSource
//! ├── models/       ← SinkError, SinkState, SinkConfiguration, FormatDescriptor, diagnostics
//! ├── processing/   ← PendingQueue, BlockingRing, RingBuffer, PCM encoding, WAV headers
//! ├── sink/         ← StreamSink (generic over the device), SinkRegistry
//! ├── devices/      ← NullDevice (manually pumped), WavFileDevice
//! ├── sources/      ← SineGenerator
//! └── storage/      ← WavWriter
//! ```

pub mod devices;
pub mod models;
pub mod processing;
pub mod sink;
pub mod sources;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use devices::null_device::{NullDevice, NullStream};
pub use devices::wav_file::WavFileDevice;
pub use models::audio_models::{AudioDevice, SinkDiagnostics};
pub use models::config::{
    ConversionQuality, OutputMode, PerformanceMode, SharingMode, SinkConfiguration,
    BLOCKING_WRITE_TIMEOUT,
};
pub use models::error::SinkError;
pub use models::format::{frame_count, FormatDescriptor, SampleFormat};
pub use models::state::{SinkState, StreamState};
pub use processing::blocking_ring::BlockingRing;
pub use processing::pending_queue::{PendingBuffer, PendingQueue};
pub use sink::registry::{SinkHandle, SinkRegistry};
pub use sink::stream_sink::StreamSink;
pub use sources::sine::SineGenerator;
pub use storage::wav_writer::WavWriter;
pub use traits::audio_callback::{AudioCallback, CallbackResult};
pub use traits::output_device::{OutputDevice, OutputStream, StreamDriver, StreamRequest};
pub use traits::pcm_source::PcmSource;
pub use traits::sink_delegate::SinkDelegate;
