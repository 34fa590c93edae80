//! Software output devices.

pub mod null_device;
pub mod wav_file;
