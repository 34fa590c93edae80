use thiserror::Error;

use super::config::OutputMode;

/// Errors that can occur while driving an output sink.
///
/// Underrun is deliberately absent: an empty queue on the real-time thread is
/// answered with silence and only shows up in the diagnostics counters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("device not available")]
    DeviceNotAvailable,

    #[error("failed to acquire output stream: {0}")]
    ResourceAcquisition(String),

    #[error("unsupported sample format: {bit_depth}-bit (float: {is_float})")]
    UnsupportedFormat { bit_depth: u16, is_float: bool },

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("sink is not open")]
    NotOpen,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("operation requires {expected:?} mode but sink is in {actual:?} mode")]
    WrongMode { expected: OutputMode, actual: OutputMode },

    #[error("pending queue is full ({capacity} buffers)")]
    QueueFull { capacity: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("output stream disconnected")]
    Disconnected,

    #[error("output stream closed")]
    StreamClosed,

    #[error("backend error: {0}")]
    Backend(String),

    #[error("unknown sink handle: {0}")]
    UnknownHandle(u64),

    #[error("storage error: {0}")]
    Storage(String),
}
