use crate::models::error::SinkError;

/// What the device should do after a data callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackResult {
    Continue,
    /// Stop invoking the callback. Only returned for an explicit stop request,
    /// never for a transient underrun.
    Stop,
}

/// Data-callback capability handed to a device in pull mode.
///
/// `on_audio_ready` runs on the device's real-time thread: implementations
/// must not block, allocate, or log.
pub trait AudioCallback: Send + Sync {
    /// Fill `output` with `frame_count` interleaved frames.
    ///
    /// `output` is exactly `frame_count` frames long for well-behaved devices;
    /// implementations must write every byte of it.
    fn on_audio_ready(&self, output: &mut [u8], frame_count: usize) -> CallbackResult;

    /// Called off the data path when the stream fails asynchronously.
    fn on_stream_error(&self, _error: &SinkError) {}
}
