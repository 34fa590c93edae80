pub mod blocking_ring;
pub mod pcm;
pub mod pending_queue;
pub mod ring_buffer;
pub mod wav_format;
