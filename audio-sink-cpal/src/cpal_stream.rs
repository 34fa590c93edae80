//! An output stream backed by `cpal`.
//!
//! `cpal::Stream` must stay on the thread that built it, so each stream gets a
//! `cpal-output` control thread that owns it and executes play/pause requests
//! sent over a channel. The data callback itself runs on cpal's real-time
//! thread and only touches the callback, the ring, and its own scratch buffer.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use audio_sink_core::models::config::{PerformanceMode, SharingMode};
use audio_sink_core::models::error::SinkError;
use audio_sink_core::models::format::SampleFormat;
use audio_sink_core::models::state::StreamState;
use audio_sink_core::processing::blocking_ring::BlockingRing;
use audio_sink_core::processing::pcm;
use audio_sink_core::traits::audio_callback::CallbackResult;
use audio_sink_core::traits::output_device::{OutputStream, StreamDriver, StreamRequest};

use crate::error::BackendError;

/// Scratch size for 24-bit expansion when no callback size was requested.
const DEFAULT_SCRATCH_FRAMES: usize = 4096;

type Reply = Sender<Result<(), BackendError>>;

enum Command {
    Play(Reply),
    Pause(Reply),
    Shutdown,
}

/// Device-side sample format for a sink format.
///
/// Packed 24-bit has no cpal equivalent and is widened to 32-bit in the
/// data callback.
pub(crate) fn device_sample_format(format: SampleFormat) -> Option<cpal::SampleFormat> {
    match format {
        SampleFormat::Float32 => Some(cpal::SampleFormat::F32),
        SampleFormat::I32 | SampleFormat::I24Packed => Some(cpal::SampleFormat::I32),
        SampleFormat::I16 => Some(cpal::SampleFormat::I16),
        SampleFormat::Unspecified => None,
    }
}

pub(crate) fn stream_config(request: &StreamRequest) -> cpal::StreamConfig {
    let buffer_size = match (request.performance_mode, request.frames_per_callback) {
        (PerformanceMode::LowLatency, Some(frames)) => cpal::BufferSize::Fixed(frames),
        _ => cpal::BufferSize::Default,
    };
    cpal::StreamConfig {
        channels: request.format.channel_count(),
        sample_rate: cpal::SampleRate(request.sample_rate),
        buffer_size,
    }
}

struct StreamShared {
    state: Mutex<StreamState>,
    ring: Option<BlockingRing>,
}

impl StreamShared {
    fn set_state(&self, next: StreamState) {
        let mut state = self.state.lock();
        if *state != StreamState::Disconnected {
            *state = next;
        }
    }
}

/// Real-time side of the stream. Owned by cpal's data callback.
struct Renderer {
    shared: Arc<StreamShared>,
    driver: StreamDriver,
    bytes_per_frame: usize,
    stopped: bool,
}

impl Renderer {
    fn fill(&mut self, output: &mut [u8]) {
        match &self.driver {
            StreamDriver::Callback(callback) => {
                if self.stopped {
                    output.fill(0);
                    return;
                }
                let frames = output.len() / self.bytes_per_frame;
                if callback.on_audio_ready(output, frames) == CallbackResult::Stop {
                    self.stopped = true;
                }
            }
            StreamDriver::Blocking => {
                let read = self
                    .shared
                    .ring
                    .as_ref()
                    .and_then(|ring| ring.read_into(output))
                    .unwrap_or(0);
                output[read..].fill(0);
            }
        }
    }
}

/// Stream handed out by `CpalOutputDevice`.
pub struct CpalOutputStream {
    commands: Sender<Command>,
    shared: Arc<StreamShared>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CpalOutputStream {
    /// Build the stream on a fresh control thread and wait until it is ready.
    pub(crate) fn open(
        device: cpal::Device,
        request: &StreamRequest,
        driver: StreamDriver,
    ) -> Result<Self, SinkError> {
        let format = request.format;
        let sample_format = device_sample_format(format.format())
            .ok_or_else(|| SinkError::ConfigurationFailed("sample format is unspecified".into()))?;
        let config = stream_config(request);

        let ring = match driver {
            StreamDriver::Blocking => Some(BlockingRing::new(
                request.buffer_capacity_frames as usize,
                format.bytes_per_frame(),
            )),
            StreamDriver::Callback(_) => None,
        };
        let shared = Arc::new(StreamShared {
            state: Mutex::new(StreamState::Open),
            ring,
        });

        let mut renderer = Renderer {
            shared: Arc::clone(&shared),
            driver: driver.clone(),
            bytes_per_frame: format.bytes_per_frame(),
            stopped: false,
        };

        // Packed 24-bit is rendered into scratch and widened chunk by chunk,
        // so the callback never allocates whatever size cpal asks for.
        let widen_i24 = format.format() == SampleFormat::I24Packed;
        let scratch_frames = request
            .frames_per_callback
            .map(|f| f as usize)
            .unwrap_or(DEFAULT_SCRATCH_FRAMES);
        let mut scratch = vec![0u8; if widen_i24 { format.frames_to_bytes(scratch_frames) } else { 0 }];
        let wide_chunk = scratch_frames * format.channel_count() as usize * 4;

        let data_callback = move |data: &mut cpal::Data, _: &cpal::OutputCallbackInfo| {
            let output = data.bytes_mut();
            if !widen_i24 {
                renderer.fill(output);
                return;
            }
            for wide in output.chunks_mut(wide_chunk) {
                let packed = &mut scratch[..wide.len() / 4 * 3];
                renderer.fill(packed);
                pcm::expand_i24_to_i32(packed, wide);
            }
        };

        let error_shared = Arc::clone(&shared);
        let error_driver = driver;
        let error_callback = move |error: cpal::StreamError| {
            let error = SinkError::from(BackendError::from(error));
            log::warn!("Output stream error: {}", error);
            if error == SinkError::Disconnected {
                *error_shared.state.lock() = StreamState::Disconnected;
                if let Some(ring) = &error_shared.ring {
                    ring.close();
                }
            }
            if let StreamDriver::Callback(callback) = &error_driver {
                callback.on_stream_error(&error);
            }
        };

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let handle = thread::Builder::new()
            .name("cpal-output".into())
            .spawn(move || {
                let built =
                    device.build_output_stream_raw(&config, sample_format, data_callback, error_callback, None);
                match built {
                    Ok(stream) => {
                        if ready_tx.send(Ok(())).is_ok() {
                            control_loop(&stream, &command_rx);
                        }
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(BackendError::from(e)));
                    }
                }
            })
            .map_err(|e| SinkError::ResourceAcquisition(format!("failed to spawn output thread: {}", e)))?;

        let ready = ready_rx.recv().map_err(|_| BackendError::ControlThreadGone);
        if let Err(e) = ready.and_then(|result| result) {
            let _ = handle.join();
            return Err(e.into());
        }

        log::debug!(
            "cpal stream built: {} ch, {} Hz, {:?}",
            format.channel_count(),
            request.sample_rate,
            sample_format
        );

        Ok(Self {
            commands: command_tx,
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    fn send(&self, command: impl FnOnce(Reply) -> Command) -> Result<(), SinkError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(command(reply_tx))
            .map_err(|_| BackendError::ControlThreadGone)?;
        let result = reply_rx.recv().map_err(|_| BackendError::ControlThreadGone)?;
        result.map_err(SinkError::from)
    }

    fn check_usable(&self) -> Result<(), SinkError> {
        match *self.shared.state.lock() {
            StreamState::Closed => Err(SinkError::StreamClosed),
            StreamState::Disconnected => Err(SinkError::Disconnected),
            _ => Ok(()),
        }
    }
}

fn control_loop(stream: &cpal::Stream, commands: &Receiver<Command>) {
    for command in commands.iter() {
        match command {
            Command::Play(reply) => {
                let _ = reply.send(stream.play().map_err(BackendError::from));
            }
            Command::Pause(reply) => {
                let _ = reply.send(stream.pause().map_err(BackendError::from));
            }
            Command::Shutdown => break,
        }
    }
}

impl OutputStream for CpalOutputStream {
    fn request_start(&self) -> Result<(), SinkError> {
        self.check_usable()?;
        self.shared.set_state(StreamState::Starting);
        self.send(Command::Play)?;
        self.shared.set_state(StreamState::Started);
        Ok(())
    }

    fn request_pause(&self) -> Result<(), SinkError> {
        self.check_usable()?;
        self.shared.set_state(StreamState::Pausing);
        self.send(Command::Pause)?;
        self.shared.set_state(StreamState::Paused);
        Ok(())
    }

    /// cpal has no flush, so the stream is paused and the ring emptied.
    fn request_flush(&self) -> Result<(), SinkError> {
        self.check_usable()?;
        self.shared.set_state(StreamState::Flushing);
        self.send(Command::Pause)?;
        if let Some(ring) = &self.shared.ring {
            ring.reset();
        }
        self.shared.set_state(StreamState::Flushed);
        Ok(())
    }

    fn request_stop(&self) -> Result<(), SinkError> {
        if let Some(ring) = &self.shared.ring {
            ring.close();
        }
        self.check_usable()?;
        self.shared.set_state(StreamState::Stopping);
        self.send(Command::Pause)?;
        self.shared.set_state(StreamState::Stopped);
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        self.shared.set_state(StreamState::Closed);
        if let Some(ring) = &self.shared.ring {
            ring.close();
        }
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.handle.lock().take() {
            handle
                .join()
                .map_err(|_| SinkError::Backend("output thread panicked".into()))?;
        }
        Ok(())
    }

    fn state(&self) -> StreamState {
        *self.shared.state.lock()
    }

    fn granted_sharing_mode(&self) -> SharingMode {
        SharingMode::Shared
    }

    fn write(&self, data: &[u8], _frame_count: usize, timeout: Duration) -> Result<usize, SinkError> {
        let ring = self.shared.ring.as_ref().ok_or_else(|| {
            SinkError::InvalidState("stream was opened in callback mode".into())
        })?;
        self.check_usable()?;
        ring.write(data, timeout)
    }
}

impl Drop for CpalOutputStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Failed to close cpal stream: {}", e);
        }
    }
}
