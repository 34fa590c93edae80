use crate::models::format::FormatDescriptor;

/// A producer of interleaved PCM buffers.
///
/// This is the buffer-supply contract shared by real producers (decoders in a
/// host application) and built-in test signals; the sink never special-cases
/// either.
pub trait PcmSource: Send {
    /// Frame layout of the buffers this source produces.
    fn format(&self) -> FormatDescriptor;

    /// Produce up to `frame_count` frames, or `None` once the source is exhausted.
    fn read_frames(&mut self, frame_count: usize) -> Option<Vec<u8>>;
}
