//! A software output device with no clock of its own.
//!
//! Nothing is played: the owner drives the stream by hand with
//! [`NullStream::pump`], which stands in for one period of the hardware's
//! real-time thread. Used by tests and as a placeholder backend when no audio
//! hardware exists.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_models::AudioDevice;
use crate::models::config::SharingMode;
use crate::models::error::SinkError;
use crate::models::state::StreamState;
use crate::processing::blocking_ring::BlockingRing;
use crate::traits::audio_callback::CallbackResult;
use crate::traits::output_device::{OutputDevice, OutputStream, StreamDriver, StreamRequest};

/// Fill byte for pumped buffers, so tests can tell untouched bytes from silence.
pub const UNWRITTEN_BYTE: u8 = 0xA5;

const DEFAULT_FRAMES_PER_CALLBACK: u32 = 256;

#[derive(Debug, Default)]
struct Holders {
    exclusive: bool,
    shared: usize,
}

/// Manually pumped output device.
pub struct NullDevice {
    name: String,
    holders: Arc<Mutex<Holders>>,
    fail_next_open: Mutex<Option<SinkError>>,
    open_count: AtomicUsize,
    last_stream: Mutex<Option<Arc<NullStream>>>,
}

impl NullDevice {
    pub fn new() -> Self {
        Self::named("Null Output")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            holders: Arc::new(Mutex::new(Holders::default())),
            fail_next_open: Mutex::new(None),
            open_count: AtomicUsize::new(0),
            last_stream: Mutex::new(None),
        }
    }

    /// Make the next `open_stream` fail with `error`.
    pub fn fail_next_open(&self, error: SinkError) {
        *self.fail_next_open.lock() = Some(error);
    }

    /// Streams successfully acquired over the device's lifetime.
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// The most recently opened stream.
    pub fn last_stream(&self) -> Option<Arc<NullStream>> {
        self.last_stream.lock().clone()
    }

    fn acquire(&self, mode: SharingMode) -> Result<(), SinkError> {
        let mut holders = self.holders.lock();
        if holders.exclusive {
            return Err(SinkError::ResourceAcquisition(
                "exclusive access denied: device is held by another stream".into(),
            ));
        }
        match mode {
            SharingMode::Exclusive if holders.shared > 0 => Err(SinkError::ResourceAcquisition(
                "exclusive access denied: device is shared".into(),
            )),
            SharingMode::Exclusive => {
                holders.exclusive = true;
                Ok(())
            }
            SharingMode::Shared => {
                holders.shared += 1;
                Ok(())
            }
        }
    }
}

impl Default for NullDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDevice for NullDevice {
    fn is_available(&self) -> bool {
        true
    }

    fn open_stream(
        &self,
        request: &StreamRequest,
        driver: StreamDriver,
    ) -> Result<Arc<dyn OutputStream>, SinkError> {
        if let Some(error) = self.fail_next_open.lock().take() {
            return Err(error);
        }
        self.acquire(request.sharing_mode)?;

        let ring = match driver {
            StreamDriver::Blocking => Some(BlockingRing::new(
                request.buffer_capacity_frames as usize,
                request.format.bytes_per_frame(),
            )),
            StreamDriver::Callback(_) => None,
        };

        let stream = Arc::new(NullStream {
            request: request.clone(),
            driver,
            ring,
            state: Mutex::new(StreamState::Open),
            holders: Arc::clone(&self.holders),
            released: AtomicBool::new(false),
            start_requests: AtomicUsize::new(0),
        });

        self.open_count.fetch_add(1, Ordering::SeqCst);
        *self.last_stream.lock() = Some(Arc::clone(&stream));
        Ok(stream)
    }

    fn device_info(&self) -> AudioDevice {
        AudioDevice {
            id: "null".into(),
            name: self.name.clone(),
            is_default: true,
            default_sample_rate: None,
            max_channels: None,
        }
    }
}

/// Stream handed out by `NullDevice`.
pub struct NullStream {
    request: StreamRequest,
    driver: StreamDriver,
    ring: Option<BlockingRing>,
    state: Mutex<StreamState>,
    holders: Arc<Mutex<Holders>>,
    released: AtomicBool,
    start_requests: AtomicUsize,
}

impl NullStream {
    /// Run one device period of `frame_count` frames.
    ///
    /// Returns the bytes the device would have played, or `None` if the stream
    /// is not started. The buffer is pre-filled with [`UNWRITTEN_BYTE`].
    pub fn pump(&self, frame_count: usize) -> Option<Vec<u8>> {
        if *self.state.lock() != StreamState::Started {
            return None;
        }

        let mut output = vec![UNWRITTEN_BYTE; frame_count * self.request.format.bytes_per_frame()];
        match &self.driver {
            StreamDriver::Callback(callback) => {
                if callback.on_audio_ready(&mut output, frame_count) == CallbackResult::Stop {
                    // A concurrent close may already have moved the stream on.
                    let mut state = self.state.lock();
                    if *state == StreamState::Started {
                        *state = StreamState::Stopped;
                    }
                }
            }
            StreamDriver::Blocking => {
                let read = self.ring.as_ref().map(|ring| ring.drain_into(&mut output)).unwrap_or(0);
                output[read..].fill(0);
            }
        }
        Some(output)
    }

    /// `pump` with the requested frames-per-callback (or a default).
    pub fn pump_period(&self) -> Option<Vec<u8>> {
        let frames = self.request.frames_per_callback.unwrap_or(DEFAULT_FRAMES_PER_CALLBACK);
        self.pump(frames as usize)
    }

    /// Simulate the OS reclaiming the device.
    pub fn disconnect(&self) {
        *self.state.lock() = StreamState::Disconnected;
        if let Some(ring) = &self.ring {
            ring.close();
        }
        if let StreamDriver::Callback(callback) = &self.driver {
            callback.on_stream_error(&SinkError::Disconnected);
        }
        self.release();
    }

    /// Force the reported state, e.g. to mimic an asynchronous `Starting`.
    pub fn force_state(&self, state: StreamState) {
        *self.state.lock() = state;
    }

    /// How many times `request_start` reached the device.
    pub fn start_requests(&self) -> usize {
        self.start_requests.load(Ordering::SeqCst)
    }

    pub fn request(&self) -> &StreamRequest {
        &self.request
    }

    /// Frames sitting in the push-mode ring.
    pub fn buffered_frames(&self) -> usize {
        self.ring.as_ref().map(BlockingRing::buffered_frames).unwrap_or(0)
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut holders = self.holders.lock();
        match self.request.sharing_mode {
            SharingMode::Exclusive => holders.exclusive = false,
            SharingMode::Shared => holders.shared = holders.shared.saturating_sub(1),
        }
    }

    fn transition(&self, next: StreamState) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        match *state {
            StreamState::Closed => Err(SinkError::StreamClosed),
            StreamState::Disconnected => Err(SinkError::Disconnected),
            _ => {
                *state = next;
                Ok(())
            }
        }
    }
}

impl OutputStream for NullStream {
    fn request_start(&self) -> Result<(), SinkError> {
        self.transition(StreamState::Started)?;
        self.start_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn request_pause(&self) -> Result<(), SinkError> {
        self.transition(StreamState::Paused)
    }

    fn request_flush(&self) -> Result<(), SinkError> {
        self.transition(StreamState::Flushed)?;
        if let Some(ring) = &self.ring {
            ring.reset();
        }
        Ok(())
    }

    fn request_stop(&self) -> Result<(), SinkError> {
        if let Some(ring) = &self.ring {
            ring.close();
        }
        self.transition(StreamState::Stopped)
    }

    fn close(&self) -> Result<(), SinkError> {
        {
            let mut state = self.state.lock();
            if *state != StreamState::Disconnected {
                *state = StreamState::Closed;
            }
        }
        if let Some(ring) = &self.ring {
            ring.close();
        }
        self.release();
        Ok(())
    }

    fn state(&self) -> StreamState {
        *self.state.lock()
    }

    fn granted_sharing_mode(&self) -> SharingMode {
        self.request.sharing_mode
    }

    fn write(&self, data: &[u8], frame_count: usize, timeout: Duration) -> Result<usize, SinkError> {
        let Some(ring) = &self.ring else {
            return Err(SinkError::InvalidState(
                "stream was opened in callback mode".into(),
            ));
        };
        match self.state() {
            StreamState::Closed => return Err(SinkError::StreamClosed),
            StreamState::Disconnected => return Err(SinkError::Disconnected),
            _ => {}
        }
        let bytes = (frame_count * self.request.format.bytes_per_frame()).min(data.len());
        ring.write(&data[..bytes], timeout)
    }
}
