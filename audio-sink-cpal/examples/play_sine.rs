//! Play a 440 Hz test tone on the default output device.
//!
//! ```text
//! cargo run -p audio-sink-cpal --example play_sine            # callback mode
//! cargo run -p audio-sink-cpal --example play_sine -- blocking
//! RUST_LOG=debug cargo run -p audio-sink-cpal --example play_sine
//! ```

use std::thread;
use std::time::Duration;

use audio_sink_core::{
    OutputMode, PcmSource, SharingMode, SineGenerator, SinkConfiguration, SinkError, StreamSink,
};
use audio_sink_cpal::{CpalOutputDevice, DeviceEnumerator};

const SAMPLE_RATE: u32 = 48000;
const SECONDS: u64 = 3;
const CHUNK_FRAMES: usize = 1152;

fn main() -> Result<(), SinkError> {
    env_logger::init();

    let mode = match std::env::args().nth(1).as_deref() {
        Some("blocking") => OutputMode::Blocking,
        _ => OutputMode::Callback,
    };

    for device in DeviceEnumerator::new().list_output_devices()? {
        log::info!("Output device: {}{}", device.name, if device.is_default { " (default)" } else { "" });
    }

    let config = SinkConfiguration {
        sharing_mode: SharingMode::Shared,
        frames_per_callback: Some(CHUNK_FRAMES as u32),
        ..SinkConfiguration::new(2, SAMPLE_RATE, 32, true).with_mode(mode)
    };
    let sink = StreamSink::new(CpalOutputDevice::default_device()?);
    sink.open(config)?;

    let format = sink.format().ok_or(SinkError::NotOpen)?;
    let mut sine = SineGenerator::new(format, SAMPLE_RATE).with_duration(SAMPLE_RATE as u64 * SECONDS);

    match mode {
        OutputMode::Callback => {
            sink.start()?;
            let chunk = Duration::from_secs_f64(CHUNK_FRAMES as f64 / SAMPLE_RATE as f64);
            while let Some(buffer) = sine.read_frames(CHUNK_FRAMES) {
                // Keep a few chunks ahead of the device.
                while sink.queue_len() >= 4 {
                    thread::sleep(chunk / 2);
                }
                sink.enqueue_owned(buffer)?;
            }
            while sink.queue_len() > 0 {
                thread::sleep(chunk);
            }
        }
        OutputMode::Blocking => {
            // Prime the device buffer before starting.
            if let Some(buffer) = sine.read_frames(CHUNK_FRAMES) {
                sink.write(&buffer, None)?;
            }
            sink.start()?;
            while let Some(buffer) = sine.read_frames(CHUNK_FRAMES) {
                sink.write(&buffer, None)?;
            }
        }
    }

    let diagnostics = sink.diagnostics();
    log::info!(
        "Done: {} callbacks, {} underruns, {} frames written",
        diagnostics.callback_count,
        diagnostics.underrun_count,
        diagnostics.frames_written
    );
    sink.stop()
}
