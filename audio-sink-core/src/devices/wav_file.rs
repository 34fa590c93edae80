//! Output device that renders into a WAV file at real-time pace.
//!
//! A `wav-render` thread wakes once per period, pulls one period of frames
//! (from the data callback, or from the push-mode ring) and appends them to
//! the file. Nothing is rendered while the stream is not started.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_models::AudioDevice;
use crate::models::config::SharingMode;
use crate::models::error::SinkError;
use crate::models::state::StreamState;
use crate::processing::blocking_ring::BlockingRing;
use crate::storage::wav_writer::WavWriter;
use crate::traits::audio_callback::CallbackResult;
use crate::traits::output_device::{OutputDevice, OutputStream, StreamDriver, StreamRequest};

const DEFAULT_PERIOD_FRAMES: u32 = 512;

pub struct WavFileDevice {
    path: PathBuf,
    period_frames: Option<u32>,
    frames_rendered: Arc<AtomicU64>,
}

impl WavFileDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            period_frames: None,
            frames_rendered: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Render in periods of `frames` regardless of the requested callback size.
    pub fn with_period_frames(mut self, frames: u32) -> Self {
        self.period_frames = Some(frames.max(1));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames appended to the file by every stream of this device.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }
}

impl OutputDevice for WavFileDevice {
    fn is_available(&self) -> bool {
        true
    }

    fn open_stream(
        &self,
        request: &StreamRequest,
        driver: StreamDriver,
    ) -> Result<Arc<dyn OutputStream>, SinkError> {
        let mut writer = WavWriter::new(self.path.clone(), &request.format, request.sample_rate);
        writer.open()?;

        let period_frames = self
            .period_frames
            .or(request.frames_per_callback)
            .unwrap_or(DEFAULT_PERIOD_FRAMES);
        let period = Duration::from_secs_f64(period_frames as f64 / request.sample_rate as f64);

        let ring = match driver {
            StreamDriver::Blocking => Some(BlockingRing::new(
                request.buffer_capacity_frames as usize,
                request.format.bytes_per_frame(),
            )),
            StreamDriver::Callback(_) => None,
        };

        let shared = Arc::new(RenderShared {
            state: Mutex::new(StreamState::Open),
            running: AtomicBool::new(true),
            driver,
            ring,
        });

        let render = RenderLoop {
            shared: Arc::clone(&shared),
            writer,
            buffer: vec![0; period_frames as usize * request.format.bytes_per_frame()],
            frames_per_period: period_frames as usize,
            period,
            frames_rendered: Arc::clone(&self.frames_rendered),
        };
        let handle = thread::Builder::new()
            .name("wav-render".into())
            .spawn(move || render.run())
            .map_err(|e| SinkError::ResourceAcquisition(format!("failed to spawn render thread: {}", e)))?;

        log::info!(
            "Rendering to {} ({} frames per period)",
            self.path.display(),
            period_frames
        );

        Ok(Arc::new(WavFileStream {
            shared,
            handle: Mutex::new(Some(handle)),
            sharing_mode: request.sharing_mode,
        }))
    }

    fn device_info(&self) -> AudioDevice {
        AudioDevice {
            id: format!("wav:{}", self.path.display()),
            name: self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "WAV file".into()),
            is_default: false,
            default_sample_rate: None,
            max_channels: None,
        }
    }
}

struct RenderShared {
    state: Mutex<StreamState>,
    running: AtomicBool,
    driver: StreamDriver,
    ring: Option<BlockingRing>,
}

struct RenderLoop {
    shared: Arc<RenderShared>,
    writer: WavWriter,
    buffer: Vec<u8>,
    frames_per_period: usize,
    period: Duration,
    frames_rendered: Arc<AtomicU64>,
}

impl RenderLoop {
    fn run(mut self) {
        while self.shared.running.load(Ordering::SeqCst) {
            thread::sleep(self.period);
            if *self.shared.state.lock() != StreamState::Started {
                continue;
            }
            self.render_period();
        }

        if let Err(e) = self.writer.close() {
            log::error!("Failed to finalize {}: {}", self.writer.file_path().display(), e);
        }
    }

    fn render_period(&mut self) {
        match &self.shared.driver {
            StreamDriver::Callback(callback) => {
                if callback.on_audio_ready(&mut self.buffer, self.frames_per_period) == CallbackResult::Stop {
                    *self.shared.state.lock() = StreamState::Stopped;
                }
            }
            StreamDriver::Blocking => {
                let read = self
                    .shared
                    .ring
                    .as_ref()
                    .map(|ring| ring.drain_into(&mut self.buffer))
                    .unwrap_or(0);
                self.buffer[read..].fill(0);
            }
        }

        if let Err(e) = self.writer.write(&self.buffer) {
            log::error!("Failed to write audio data: {}", e);
            return;
        }
        self.frames_rendered
            .fetch_add(self.frames_per_period as u64, Ordering::Relaxed);
    }
}

/// Stream handed out by `WavFileDevice`.
pub struct WavFileStream {
    shared: Arc<RenderShared>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    sharing_mode: SharingMode,
}

impl WavFileStream {
    fn transition(&self, next: StreamState) -> Result<(), SinkError> {
        let mut state = self.shared.state.lock();
        if *state == StreamState::Closed {
            return Err(SinkError::StreamClosed);
        }
        *state = next;
        Ok(())
    }
}

impl OutputStream for WavFileStream {
    fn request_start(&self) -> Result<(), SinkError> {
        self.transition(StreamState::Started)
    }

    fn request_pause(&self) -> Result<(), SinkError> {
        self.transition(StreamState::Paused)
    }

    fn request_flush(&self) -> Result<(), SinkError> {
        self.transition(StreamState::Flushed)?;
        if let Some(ring) = &self.shared.ring {
            ring.reset();
        }
        Ok(())
    }

    fn request_stop(&self) -> Result<(), SinkError> {
        if let Some(ring) = &self.shared.ring {
            ring.close();
        }
        self.transition(StreamState::Stopped)
    }

    fn close(&self) -> Result<(), SinkError> {
        *self.shared.state.lock() = StreamState::Closed;
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(ring) = &self.shared.ring {
            ring.close();
        }
        if let Some(handle) = self.handle.lock().take() {
            handle
                .join()
                .map_err(|_| SinkError::Backend("render thread panicked".into()))?;
        }
        Ok(())
    }

    fn state(&self) -> StreamState {
        *self.shared.state.lock()
    }

    fn granted_sharing_mode(&self) -> SharingMode {
        self.sharing_mode
    }

    fn write(&self, data: &[u8], _frame_count: usize, timeout: Duration) -> Result<usize, SinkError> {
        let ring = self.shared.ring.as_ref().ok_or_else(|| {
            SinkError::InvalidState("stream was opened in callback mode".into())
        })?;
        if self.state() == StreamState::Closed {
            return Err(SinkError::StreamClosed);
        }
        ring.write(data, timeout)
    }
}

impl Drop for WavFileStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Failed to close WAV stream: {}", e);
        }
    }
}
