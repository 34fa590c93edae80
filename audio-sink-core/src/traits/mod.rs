pub mod audio_callback;
pub mod output_device;
pub mod pcm_source;
pub mod sink_delegate;
