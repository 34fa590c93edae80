use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioDevice, DiagnosticCounters, SinkDiagnostics};
use crate::models::config::{OutputMode, SinkConfiguration};
use crate::models::error::SinkError;
use crate::models::format::FormatDescriptor;
use crate::models::state::{SinkState, StreamState};
use crate::processing::pending_queue::{PendingBuffer, PendingQueue};
use crate::traits::audio_callback::{AudioCallback, CallbackResult};
use crate::traits::output_device::{OutputDevice, OutputStream, StreamDriver, StreamRequest};
use crate::traits::sink_delegate::SinkDelegate;

/// The stream held while the sink is open.
struct ActiveStream {
    stream: Arc<dyn OutputStream>,
    format: FormatDescriptor,
    mode: OutputMode,
    /// Present in callback mode only.
    callback: Option<Arc<SinkCallback>>,
    write_timeout: Duration,
}

/// Mutable sink state, protected by the lifecycle lock.
struct Lifecycle {
    state: SinkState,
    config: Option<SinkConfiguration>,
    active: Option<ActiveStream>,
}

/// Low-latency PCM output sink.
///
/// Owns one output stream acquired from an `OutputDevice` and feeds it in
/// either of two modes:
///
/// ```text
/// callback:  [producer] → enqueue → [PendingQueue] → SinkCallback → [device RT thread]
/// blocking:  [producer] → write ──────────────────────────────────→ [device buffer]
/// ```
///
/// Control-plane calls serialize on a lifecycle lock. The real-time callback
/// never touches that lock, and blocking writers release it before they
/// block, so `stop` can always interrupt a stalled `write`.
pub struct StreamSink<D: OutputDevice> {
    device: D,
    lifecycle: Mutex<Lifecycle>,
    counters: Arc<DiagnosticCounters>,
    delegate: Mutex<Option<Arc<dyn SinkDelegate>>>,
}

impl<D: OutputDevice> StreamSink<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            lifecycle: Mutex::new(Lifecycle {
                state: SinkState::Closed,
                config: None,
                active: None,
            }),
            counters: Arc::new(DiagnosticCounters::default()),
            delegate: Mutex::new(None),
        }
    }

    /// Install an observer. Takes effect for streams opened afterwards.
    pub fn set_delegate(&self, delegate: Arc<dyn SinkDelegate>) {
        *self.delegate.lock() = Some(delegate);
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_info(&self) -> AudioDevice {
        self.device.device_info()
    }

    pub fn state(&self) -> SinkState {
        self.lifecycle.lock().state
    }

    /// Frame layout of the open stream.
    pub fn format(&self) -> Option<FormatDescriptor> {
        self.lifecycle.lock().active.as_ref().map(|a| a.format)
    }

    /// Configuration of the current or most recent stream.
    pub fn config(&self) -> Option<SinkConfiguration> {
        self.lifecycle.lock().config.clone()
    }

    /// State reported by the device stream, if one is held.
    pub fn stream_state(&self) -> Option<StreamState> {
        self.lifecycle.lock().active.as_ref().map(|a| a.stream.state())
    }

    /// Whether the OS reclaimed the device under the open stream.
    pub fn is_disconnected(&self) -> bool {
        let lifecycle = self.lifecycle.lock();
        let Some(active) = lifecycle.active.as_ref() else {
            return false;
        };
        active.callback.as_ref().is_some_and(|cb| cb.is_disconnected())
            || active.stream.state() == StreamState::Disconnected
    }

    pub fn diagnostics(&self) -> SinkDiagnostics {
        self.counters.snapshot()
    }

    /// Buffers waiting in the pull-mode queue.
    pub fn queue_len(&self) -> usize {
        self.callback().map(|cb| cb.queue.lock().len()).unwrap_or(0)
    }

    /// Unplayed bytes across the pull-mode queue.
    pub fn pending_bytes(&self) -> usize {
        self.callback().map(|cb| cb.queue.lock().pending_bytes()).unwrap_or(0)
    }

    /// Acquire the output stream. Transitions: closed → open.
    ///
    /// The whole configuration is validated before the device is touched.
    /// On failure the sink stays closed and holds nothing.
    pub fn open(&self, config: SinkConfiguration) -> Result<(), SinkError> {
        let mut lifecycle = self.lifecycle.lock();
        if !lifecycle.state.is_closed() {
            return Err(SinkError::InvalidState(format!(
                "cannot open a sink that is {}",
                lifecycle.state.name()
            )));
        }

        let format = config.format_descriptor()?;
        if !self.device.is_available() {
            return Err(SinkError::DeviceNotAvailable);
        }

        let callback = match config.mode {
            OutputMode::Callback => Some(Arc::new(SinkCallback::new(
                format,
                config.max_pending_buffers,
                Arc::clone(&self.counters),
                self.delegate.lock().clone(),
            ))),
            OutputMode::Blocking => None,
        };
        let driver = match &callback {
            Some(cb) => StreamDriver::Callback(Arc::clone(cb) as Arc<dyn AudioCallback>),
            None => StreamDriver::Blocking,
        };

        let request = StreamRequest::from_config(&config, format);
        let stream = self.device.open_stream(&request, driver).map_err(|e| {
            log::error!("Failed to open output stream: {}", e);
            e
        })?;

        let granted = stream.granted_sharing_mode();
        if granted != config.sharing_mode {
            log::warn!(
                "Requested {:?} sharing but the device granted {:?}",
                config.sharing_mode,
                granted
            );
        }
        log::info!(
            "Sink opened: {} ch, {} Hz, {:?}, {:?} mode",
            format.channel_count(),
            config.sample_rate,
            format.format(),
            config.mode
        );

        lifecycle.active = Some(ActiveStream {
            stream,
            format,
            mode: config.mode,
            callback,
            write_timeout: config.write_timeout,
        });
        lifecycle.config = Some(config);
        lifecycle.state = SinkState::Open;
        drop(lifecycle);

        self.notify_state(SinkState::Open);
        Ok(())
    }

    /// Begin playback. Transitions: open/paused → started.
    ///
    /// Idempotent: a sink that is already started, or whose stream already
    /// reports starting or started, is left alone.
    pub fn start(&self) -> Result<(), SinkError> {
        let mut lifecycle = self.lifecycle.lock();
        let active = lifecycle.active.as_ref().ok_or(SinkError::NotOpen)?;
        if lifecycle.state.is_started() {
            return Ok(());
        }

        if active.stream.state().is_starting_or_started() {
            log::debug!("Stream already starting, skipping start request");
        } else {
            active.stream.request_start()?;
            log::debug!("Sink started");
        }
        lifecycle.state = SinkState::Started;
        drop(lifecycle);

        self.notify_state(SinkState::Started);
        Ok(())
    }

    /// Suspend playback, keeping queued audio. Transitions: started → paused.
    pub fn pause(&self) -> Result<(), SinkError> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            SinkState::Closed => return Err(SinkError::NotOpen),
            SinkState::Open => {
                return Err(SinkError::InvalidState(
                    "cannot pause a sink that was never started".into(),
                ))
            }
            SinkState::Paused => return Ok(()),
            SinkState::Started => {}
        }

        if let Some(active) = lifecycle.active.as_ref() {
            active.stream.request_pause()?;
        }
        lifecycle.state = SinkState::Paused;
        drop(lifecycle);

        log::debug!("Sink paused");
        self.notify_state(SinkState::Paused);
        Ok(())
    }

    /// Discard queued and device-buffered audio.
    ///
    /// The sink keeps its state; a started stream is restarted so playback
    /// continues with whatever is enqueued next.
    pub fn flush(&self) -> Result<(), SinkError> {
        let lifecycle = self.lifecycle.lock();
        let active = lifecycle.active.as_ref().ok_or(SinkError::NotOpen)?;

        if let Some(callback) = &active.callback {
            let discarded = callback.queue.lock().clear();
            DiagnosticCounters::add(&self.counters.buffers_discarded, discarded as u64);
        }
        active.stream.request_flush()?;
        if lifecycle.state.is_started() {
            active.stream.request_start()?;
        }

        log::debug!("Sink flushed");
        Ok(())
    }

    /// Stop and release the stream. Transitions: any → closed.
    ///
    /// The data callback is told to stop before the stream is stopped and
    /// closed, and pending buffers are dropped last. A closed sink is left
    /// alone.
    pub fn stop(&self) -> Result<(), SinkError> {
        let mut lifecycle = self.lifecycle.lock();
        let Some(active) = lifecycle.active.take() else {
            return Ok(());
        };

        if let Some(callback) = &active.callback {
            callback.request_stop();
        }
        let stopped = match active.stream.request_stop() {
            Err(SinkError::Disconnected | SinkError::StreamClosed) => Ok(()),
            other => other,
        };
        let closed = active.stream.close();

        if let Some(callback) = &active.callback {
            let discarded = callback.queue.lock().clear();
            DiagnosticCounters::add(&self.counters.buffers_discarded, discarded as u64);
        }
        lifecycle.state = SinkState::Closed;
        drop(lifecycle);
        drop(active);

        log::info!("Sink closed");
        self.notify_state(SinkState::Closed);
        stopped.and(closed)
    }

    /// `stop` for teardown paths: never fails, logs backend errors.
    pub fn close(&self) {
        if let Err(e) = self.stop() {
            log::error!("Error while closing output stream: {}", e);
        }
    }

    /// Close and open again with the last configuration.
    ///
    /// Used to recover once the device was reclaimed.
    pub fn reopen(&self) -> Result<(), SinkError> {
        let config = self
            .config()
            .ok_or_else(|| SinkError::InvalidState("sink was never opened".into()))?;
        self.close();
        self.open(config)
    }

    /// Copy `data` into the pull-mode queue.
    ///
    /// A trailing partial frame is dropped and counted. Empty input is a no-op.
    pub fn enqueue(&self, data: &[u8]) -> Result<(), SinkError> {
        let callback = self.enqueue_target()?;
        let usable = callback.usable_bytes(data.len());
        if usable == 0 {
            return Ok(());
        }

        // Copy outside the queue lock so the real-time side is not held up.
        let spare = callback.queue.lock().take_spare();
        let mut storage = spare.unwrap_or_else(|| Vec::with_capacity(usable));
        storage.extend_from_slice(&data[..usable]);
        callback.push(storage)
    }

    /// Move a producer-owned buffer into the pull-mode queue without copying.
    pub fn enqueue_owned(&self, mut data: Vec<u8>) -> Result<(), SinkError> {
        let callback = self.enqueue_target()?;
        let usable = callback.usable_bytes(data.len());
        if usable == 0 {
            return Ok(());
        }
        data.truncate(usable);
        callback.push(data)
    }

    /// Blocking write of every whole frame in `data`.
    ///
    /// See [`write_frames`](Self::write_frames).
    pub fn write(&self, data: &[u8], timeout: Option<Duration>) -> Result<usize, SinkError> {
        let format = self.format().ok_or(SinkError::NotOpen)?;
        let trailing = format.trailing_bytes(data.len());
        if trailing > 0 {
            DiagnosticCounters::add(&self.counters.bytes_truncated, trailing as u64);
        }
        self.write_frames(data, format.frame_count(data.len()), timeout)
    }

    /// Blocking write of `frame_count` frames from `data`.
    ///
    /// Blocks until the device accepted every frame or `timeout` (default:
    /// the configured write timeout) elapsed; a timeout yields the partial
    /// count rather than an error. Writing before `start` primes the device.
    pub fn write_frames(
        &self,
        data: &[u8],
        frame_count: usize,
        timeout: Option<Duration>,
    ) -> Result<usize, SinkError> {
        let (stream, format, default_timeout) = {
            let lifecycle = self.lifecycle.lock();
            let active = lifecycle.active.as_ref().ok_or(SinkError::NotOpen)?;
            if active.mode != OutputMode::Blocking {
                return Err(SinkError::WrongMode {
                    expected: OutputMode::Blocking,
                    actual: active.mode,
                });
            }
            (Arc::clone(&active.stream), active.format, active.write_timeout)
        };

        let needed = format.frames_to_bytes(frame_count);
        if needed > data.len() {
            return Err(SinkError::InvalidArgument(format!(
                "{} frames need {} bytes but only {} were given",
                frame_count,
                needed,
                data.len()
            )));
        }
        if frame_count == 0 {
            return Ok(0);
        }

        match stream.write(&data[..needed], frame_count, timeout.unwrap_or(default_timeout)) {
            Ok(written) => {
                DiagnosticCounters::add(&self.counters.frames_written, written as u64);
                let interrupted = matches!(
                    stream.state(),
                    StreamState::Stopping | StreamState::Stopped
                ) || stream.state().is_terminal();
                if written < frame_count && !interrupted {
                    DiagnosticCounters::add(&self.counters.write_timeouts, 1);
                    log::warn!("Write timed out after {} of {} frames", written, frame_count);
                }
                Ok(written)
            }
            Err(e) => {
                if e == SinkError::Disconnected || stream.state() == StreamState::Disconnected {
                    DiagnosticCounters::add(&self.counters.stream_errors, 1);
                    log::warn!("Output stream disconnected during write");
                    self.notify_error(&SinkError::Disconnected);
                    return Err(SinkError::Disconnected);
                }
                Err(e)
            }
        }
    }

    // --- Internal helpers ---

    fn callback(&self) -> Option<Arc<SinkCallback>> {
        self.lifecycle.lock().active.as_ref()?.callback.clone()
    }

    fn enqueue_target(&self) -> Result<Arc<SinkCallback>, SinkError> {
        let lifecycle = self.lifecycle.lock();
        let active = lifecycle.active.as_ref().ok_or(SinkError::NotOpen)?;
        let callback = active.callback.as_ref().ok_or(SinkError::WrongMode {
            expected: OutputMode::Callback,
            actual: active.mode,
        })?;
        if callback.is_disconnected() {
            return Err(SinkError::Disconnected);
        }
        Ok(Arc::clone(callback))
    }

    fn notify_state(&self, state: SinkState) {
        let delegate = self.delegate.lock().clone();
        if let Some(delegate) = delegate {
            delegate.on_state_changed(state);
        }
    }

    fn notify_error(&self, error: &SinkError) {
        let delegate = self.delegate.lock().clone();
        if let Some(delegate) = delegate {
            delegate.on_error(error);
        }
    }
}

impl<D: OutputDevice> Drop for StreamSink<D> {
    fn drop(&mut self) {
        self.close();
    }
}

/// The pull-mode data path handed to the device.
///
/// Shared between the producer (`enqueue`) and the device's real-time thread
/// (`on_audio_ready`). Only atomics and a `try_lock` are touched on the
/// real-time side.
pub(crate) struct SinkCallback {
    format: FormatDescriptor,
    queue: Mutex<PendingQueue>,
    stop_requested: AtomicBool,
    disconnected: AtomicBool,
    counters: Arc<DiagnosticCounters>,
    delegate: Option<Arc<dyn SinkDelegate>>,
}

impl SinkCallback {
    fn new(
        format: FormatDescriptor,
        max_pending_buffers: usize,
        counters: Arc<DiagnosticCounters>,
        delegate: Option<Arc<dyn SinkDelegate>>,
    ) -> Self {
        Self {
            format,
            queue: Mutex::new(PendingQueue::new(max_pending_buffers)),
            stop_requested: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            counters,
            delegate,
        }
    }

    fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Whole-frame prefix of `len` bytes; the remainder is counted as truncated.
    fn usable_bytes(&self, len: usize) -> usize {
        let trailing = self.format.trailing_bytes(len);
        if trailing > 0 {
            DiagnosticCounters::add(&self.counters.bytes_truncated, trailing as u64);
        }
        len - trailing
    }

    /// Queue `storage`. Surplus allocations are dropped here, after the lock
    /// is released, never on the real-time thread.
    fn push(&self, storage: Vec<u8>) -> Result<(), SinkError> {
        let mut queue = self.queue.lock();
        let (result, surplus) = match queue.push(PendingBuffer::new(storage)) {
            Ok(evicted) => {
                DiagnosticCounters::add(&self.counters.buffers_enqueued, 1);
                (Ok(()), evicted)
            }
            Err((error, rejected)) => (Err(error), queue.recycle(rejected)),
        };
        drop(queue);
        drop(surplus);
        result
    }
}

impl AudioCallback for SinkCallback {
    fn on_audio_ready(&self, output: &mut [u8], _frame_count: usize) -> CallbackResult {
        if self.stop_requested.load(Ordering::Acquire) {
            output.fill(0);
            return CallbackResult::Stop;
        }

        let counters = &self.counters;
        DiagnosticCounters::add(&counters.callback_count, 1);

        let copied = match self.queue.try_lock() {
            Some(mut queue) => queue.fill(output),
            None => {
                DiagnosticCounters::add(&counters.lock_contention_count, 1);
                0
            }
        };
        output[copied..].fill(0);

        if copied == 0 {
            DiagnosticCounters::add(&counters.underrun_count, 1);
        } else if copied < output.len() {
            DiagnosticCounters::add(&counters.partial_fill_count, 1);
        }

        let bytes_per_frame = self.format.bytes_per_frame();
        let total_frames = output.len() / bytes_per_frame;
        let delivered = copied / bytes_per_frame;
        DiagnosticCounters::add(&counters.frames_delivered, delivered as u64);
        DiagnosticCounters::add(&counters.silence_frames, (total_frames - delivered) as u64);
        CallbackResult::Continue
    }

    fn on_stream_error(&self, error: &SinkError) {
        if *error == SinkError::Disconnected {
            self.disconnected.store(true, Ordering::Release);
        }
        DiagnosticCounters::add(&self.counters.stream_errors, 1);
        if let Some(delegate) = &self.delegate {
            delegate.on_error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    use super::*;
    use crate::devices::null_device::{NullDevice, NullStream, UNWRITTEN_BYTE};
    use crate::models::config::SharingMode;

    fn stereo_16() -> SinkConfiguration {
        SinkConfiguration::new(2, 44100, 16, false)
    }

    fn open_sink(config: SinkConfiguration) -> (StreamSink<NullDevice>, Arc<NullStream>) {
        let sink = StreamSink::new(NullDevice::new());
        sink.open(config).unwrap();
        let stream = sink.device().last_stream().unwrap();
        (sink, stream)
    }

    fn ramp(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8 + 1).collect()
    }

    #[derive(Default)]
    struct RecordingDelegate {
        states: Mutex<Vec<SinkState>>,
        errors: Mutex<Vec<SinkError>>,
    }

    impl SinkDelegate for RecordingDelegate {
        fn on_state_changed(&self, state: SinkState) {
            self.states.lock().push(state);
        }

        fn on_error(&self, error: &SinkError) {
            self.errors.lock().push(error.clone());
        }
    }

    #[test]
    fn one_callback_drains_one_buffer() {
        let (sink, stream) = open_sink(stereo_16());
        let data = ramp(4608);

        sink.enqueue(&data).unwrap();
        assert_eq!(sink.queue_len(), 1);

        sink.start().unwrap();
        assert_eq!(stream.pump(1152).unwrap(), data);
        assert_eq!(sink.queue_len(), 0);

        assert!(stream.pump(1152).unwrap().iter().all(|&b| b == 0));

        let diag = sink.diagnostics();
        assert_eq!(diag.callback_count, 2);
        assert_eq!(diag.underrun_count, 1);
        assert_eq!(diag.frames_delivered, 1152);
        assert_eq!(diag.silence_frames, 1152);
    }

    #[test]
    fn buffers_play_in_fifo_order() {
        let (sink, stream) = open_sink(stereo_16());
        for value in 1..=3u8 {
            sink.enqueue(&[value; 16]).unwrap();
        }
        sink.start().unwrap();

        for value in 1..=3u8 {
            assert_eq!(stream.pump(4).unwrap(), vec![value; 16]);
        }
    }

    #[test]
    fn short_buffer_is_silence_filled() {
        let (sink, stream) = open_sink(stereo_16());
        sink.enqueue(&[7; 8]).unwrap();
        sink.enqueue(&[9; 8]).unwrap();
        sink.start().unwrap();

        let out = stream.pump(4).unwrap();
        assert!(out.iter().all(|&b| b != UNWRITTEN_BYTE));
        assert_eq!(&out[..8], &[7; 8]);
        assert_eq!(&out[8..], &[0; 8]);
        assert_eq!(sink.queue_len(), 1);
        assert_eq!(sink.diagnostics().partial_fill_count, 1);
    }

    #[test]
    fn long_buffer_carries_over() {
        let (sink, stream) = open_sink(stereo_16());
        let data = ramp(32);
        sink.enqueue(&data).unwrap();
        sink.start().unwrap();

        assert_eq!(stream.pump(4).unwrap(), &data[..16]);
        assert_eq!(sink.pending_bytes(), 16);
        assert_eq!(stream.pump(4).unwrap(), &data[16..]);
        assert_eq!(sink.queue_len(), 0);
    }

    #[test]
    fn partial_trailing_frame_is_truncated() {
        let (sink, stream) = open_sink(stereo_16());
        sink.enqueue(&[3; 6]).unwrap();
        sink.enqueue(&[1, 2, 3]).unwrap();
        sink.enqueue(&[]).unwrap();
        assert_eq!(sink.queue_len(), 1);
        assert_eq!(sink.diagnostics().bytes_truncated, 5);

        sink.start().unwrap();
        let out = stream.pump(2).unwrap();
        assert_eq!(&out[..4], &[3; 4]);
    }

    #[test]
    fn enqueue_owned_moves_buffer() {
        let (sink, stream) = open_sink(stereo_16());
        sink.enqueue_owned(vec![5; 8]).unwrap();
        sink.start().unwrap();
        assert_eq!(stream.pump(2).unwrap(), vec![5; 8]);
    }

    #[test]
    fn queue_is_bounded() {
        let config = SinkConfiguration {
            max_pending_buffers: 2,
            ..stereo_16()
        };
        let (sink, _stream) = open_sink(config);
        sink.enqueue(&[0; 4]).unwrap();
        sink.enqueue(&[0; 4]).unwrap();
        assert_eq!(sink.enqueue(&[0; 4]), Err(SinkError::QueueFull { capacity: 2 }));
        assert_eq!(sink.diagnostics().buffers_enqueued, 2);
    }

    #[test]
    fn start_is_idempotent() {
        let (sink, stream) = open_sink(stereo_16());
        sink.start().unwrap();
        sink.start().unwrap();
        assert_eq!(stream.start_requests(), 1);
        assert_eq!(sink.device().open_count(), 1);
        assert_eq!(sink.state(), SinkState::Started);
    }

    #[test]
    fn start_skips_stream_already_starting() {
        let (sink, stream) = open_sink(stereo_16());
        stream.force_state(StreamState::Starting);
        sink.start().unwrap();
        assert_eq!(stream.start_requests(), 0);
        assert_eq!(sink.state(), SinkState::Started);
    }

    #[test]
    fn operations_on_closed_sink() {
        let sink = StreamSink::new(NullDevice::new());
        assert_eq!(sink.enqueue(&[0; 4]), Err(SinkError::NotOpen));
        assert_eq!(sink.write(&[0; 4], None), Err(SinkError::NotOpen));
        assert_eq!(sink.start(), Err(SinkError::NotOpen));
        assert_eq!(sink.pause(), Err(SinkError::NotOpen));
        assert_eq!(sink.flush(), Err(SinkError::NotOpen));
        assert_eq!(sink.stop(), Ok(()));
        assert_eq!(sink.queue_len(), 0);
    }

    #[test]
    fn invalid_configuration_leaves_sink_closed() {
        let sink = StreamSink::new(NullDevice::new());
        let result = sink.open(SinkConfiguration::new(2, 44100, 8, false));
        assert_eq!(
            result,
            Err(SinkError::UnsupportedFormat {
                bit_depth: 8,
                is_float: false
            })
        );
        assert_eq!(sink.state(), SinkState::Closed);
        assert_eq!(sink.device().open_count(), 0);
    }

    #[test]
    fn acquisition_failure_leaves_sink_closed() {
        let sink = StreamSink::new(NullDevice::new());
        sink.device().fail_next_open(SinkError::DeviceNotAvailable);
        assert_eq!(sink.open(stereo_16()), Err(SinkError::DeviceNotAvailable));
        assert_eq!(sink.state(), SinkState::Closed);
        sink.open(stereo_16()).unwrap();
    }

    #[test]
    fn double_open_is_rejected() {
        let (sink, _stream) = open_sink(stereo_16());
        assert!(matches!(sink.open(stereo_16()), Err(SinkError::InvalidState(_))));
    }

    #[test]
    fn mode_mismatch_is_rejected() {
        let (sink, _stream) = open_sink(stereo_16());
        assert_eq!(
            sink.write(&[0; 4], None),
            Err(SinkError::WrongMode {
                expected: OutputMode::Blocking,
                actual: OutputMode::Callback
            })
        );

        let (sink, _stream) = open_sink(stereo_16().with_mode(OutputMode::Blocking));
        assert_eq!(
            sink.enqueue(&[0; 4]),
            Err(SinkError::WrongMode {
                expected: OutputMode::Callback,
                actual: OutputMode::Blocking
            })
        );
    }

    #[test]
    fn pause_rules() {
        let (sink, stream) = open_sink(stereo_16());
        assert!(matches!(sink.pause(), Err(SinkError::InvalidState(_))));

        sink.enqueue(&[1; 8]).unwrap();
        sink.start().unwrap();
        sink.pause().unwrap();
        sink.pause().unwrap();
        assert_eq!(sink.state(), SinkState::Paused);
        assert!(stream.pump(2).is_none());
        assert_eq!(sink.queue_len(), 1);

        sink.start().unwrap();
        assert_eq!(stream.pump(2).unwrap(), vec![1; 8]);
    }

    #[test]
    fn flush_discards_queue_and_keeps_playing() {
        let (sink, stream) = open_sink(stereo_16());
        for _ in 0..3 {
            sink.enqueue(&[1; 8]).unwrap();
        }
        sink.start().unwrap();
        sink.flush().unwrap();

        assert_eq!(sink.queue_len(), 0);
        assert_eq!(sink.state(), SinkState::Started);
        assert_eq!(sink.diagnostics().buffers_discarded, 3);
        assert_eq!(stream.pump(2).unwrap(), vec![0; 8]);
    }

    #[test]
    fn flush_on_open_sink_does_not_start() {
        let (sink, stream) = open_sink(stereo_16());
        sink.enqueue(&[1; 8]).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.state(), SinkState::Open);
        assert_eq!(stream.start_requests(), 0);
    }

    #[test]
    fn stop_closes_stream_and_drops_queue() {
        let (sink, stream) = open_sink(stereo_16());
        sink.enqueue(&[1; 8]).unwrap();
        sink.enqueue(&[2; 8]).unwrap();
        sink.start().unwrap();

        sink.stop().unwrap();
        assert_eq!(sink.state(), SinkState::Closed);
        assert_eq!(stream.state(), StreamState::Closed);
        assert!(stream.pump(2).is_none());
        assert_eq!(sink.diagnostics().buffers_discarded, 2);

        sink.stop().unwrap();
        sink.close();
        assert_eq!(sink.enqueue(&[0; 4]), Err(SinkError::NotOpen));
    }

    #[test]
    fn stop_while_callback_is_running() {
        let (sink, stream) = open_sink(stereo_16());
        sink.start().unwrap();

        let periods = Arc::new(AtomicUsize::new(0));
        let pump = {
            let stream = Arc::clone(&stream);
            let periods = Arc::clone(&periods);
            thread::spawn(move || {
                while let Some(out) = stream.pump(2) {
                    assert!(out.iter().all(|&b| b == 7 || b == 0), "unexpected bytes {:?}", out);
                    periods.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        for _ in 0..10_000 {
            match sink.enqueue(&[7; 8]) {
                Ok(()) | Err(SinkError::QueueFull { .. }) => {}
                Err(e) => panic!("enqueue failed: {}", e),
            }
            if periods.load(Ordering::SeqCst) >= 50 {
                break;
            }
            thread::yield_now();
        }
        sink.stop().unwrap();

        pump.join().unwrap();
        assert!(periods.load(Ordering::SeqCst) > 0);
        assert_eq!(stream.state(), StreamState::Closed);
        assert_eq!(sink.queue_len(), 0);
    }

    #[test]
    fn stopped_callback_outputs_silence() {
        let format = FormatDescriptor::new(1, 16, false).unwrap();
        let callback = SinkCallback::new(format, 4, Arc::new(DiagnosticCounters::default()), None);
        callback.push(vec![9; 4]).unwrap();
        callback.request_stop();

        let mut out = [UNWRITTEN_BYTE; 4];
        assert_eq!(callback.on_audio_ready(&mut out, 2), CallbackResult::Stop);
        assert_eq!(out, [0; 4]);
    }

    #[test]
    fn contention_plays_silence() {
        let format = FormatDescriptor::new(1, 16, false).unwrap();
        let counters = Arc::new(DiagnosticCounters::default());
        let callback = SinkCallback::new(format, 4, Arc::clone(&counters), None);
        callback.push(vec![9; 4]).unwrap();

        let guard = callback.queue.lock();
        let mut out = [UNWRITTEN_BYTE; 4];
        assert_eq!(callback.on_audio_ready(&mut out, 2), CallbackResult::Continue);
        assert_eq!(out, [0; 4]);
        drop(guard);

        let diag = counters.snapshot();
        assert_eq!(diag.lock_contention_count, 1);
        assert_eq!(diag.underrun_count, 1);
        assert_eq!(callback.queue.lock().len(), 1);
    }

    #[test]
    fn exclusive_device_refuses_second_sink() {
        let device = Arc::new(NullDevice::new());
        let first = StreamSink::new(Arc::clone(&device));
        let second = StreamSink::new(Arc::clone(&device));

        first.open(stereo_16()).unwrap();
        assert!(matches!(second.open(stereo_16()), Err(SinkError::ResourceAcquisition(_))));
        assert_eq!(second.state(), SinkState::Closed);

        first.close();
        second.open(stereo_16()).unwrap();
    }

    #[test]
    fn shared_sinks_coexist() {
        let device = Arc::new(NullDevice::new());
        let shared = SinkConfiguration {
            sharing_mode: SharingMode::Shared,
            ..stereo_16()
        };
        let first = StreamSink::new(Arc::clone(&device));
        let second = StreamSink::new(Arc::clone(&device));
        first.open(shared.clone()).unwrap();
        second.open(shared).unwrap();
        assert_eq!(device.open_count(), 2);
    }

    #[test]
    fn reopen_after_disconnect() {
        let (sink, stream) = open_sink(stereo_16());
        let delegate = Arc::new(RecordingDelegate::default());
        sink.set_delegate(delegate.clone());
        sink.reopen().unwrap();
        let stream_after_reopen = sink.device().last_stream().unwrap();
        assert!(!Arc::ptr_eq(&stream, &stream_after_reopen));

        sink.start().unwrap();
        stream_after_reopen.disconnect();
        assert!(sink.is_disconnected());
        assert_eq!(sink.enqueue(&[0; 4]), Err(SinkError::Disconnected));
        assert_eq!(*delegate.errors.lock(), vec![SinkError::Disconnected]);
        assert_eq!(sink.diagnostics().stream_errors, 1);

        sink.reopen().unwrap();
        assert_eq!(sink.state(), SinkState::Open);
        assert!(!sink.is_disconnected());
        assert_eq!(sink.device().open_count(), 3);
    }

    #[test]
    fn delegate_sees_transitions() {
        let sink = StreamSink::new(NullDevice::new());
        let delegate = Arc::new(RecordingDelegate::default());
        sink.set_delegate(delegate.clone());

        sink.open(stereo_16()).unwrap();
        sink.start().unwrap();
        sink.pause().unwrap();
        sink.stop().unwrap();

        assert_eq!(
            *delegate.states.lock(),
            vec![SinkState::Open, SinkState::Started, SinkState::Paused, SinkState::Closed]
        );
    }

    #[test]
    fn blocking_write_primes_before_start() {
        let (sink, stream) = open_sink(stereo_16().with_mode(OutputMode::Blocking));
        let data = ramp(16);
        assert_eq!(sink.write(&data, None).unwrap(), 4);
        assert_eq!(stream.buffered_frames(), 4);

        sink.start().unwrap();
        let out = stream.pump(6).unwrap();
        assert_eq!(&out[..16], &data[..]);
        assert_eq!(&out[16..], &[0; 8]);
        assert_eq!(sink.diagnostics().frames_written, 4);
    }

    #[test]
    fn blocking_write_times_out_with_partial_count() {
        let config = SinkConfiguration {
            buffer_capacity_frames: 4,
            ..stereo_16().with_mode(OutputMode::Blocking)
        };
        let (sink, _stream) = open_sink(config);

        let written = sink.write(&[1; 32], Some(Duration::from_millis(10))).unwrap();
        assert_eq!(written, 4);
        assert_eq!(sink.diagnostics().write_timeouts, 1);
    }

    #[test]
    fn blocking_write_waits_for_device() {
        let config = SinkConfiguration {
            buffer_capacity_frames: 4,
            ..stereo_16().with_mode(OutputMode::Blocking)
        };
        let (sink, stream) = open_sink(config);
        let sink = Arc::new(sink);
        sink.start().unwrap();

        let writer = {
            let sink = Arc::clone(&sink);
            thread::spawn(move || sink.write(&[1; 64], None))
        };

        let mut played = 0;
        while played < 16 {
            let out = stream.pump(2).unwrap();
            played += out.chunks_exact(4).filter(|frame| frame == &[1; 4]).count();
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(writer.join().unwrap().unwrap(), 16);
        assert_eq!(sink.diagnostics().write_timeouts, 0);
    }

    #[test]
    fn stop_releases_blocked_writer() {
        let config = SinkConfiguration {
            buffer_capacity_frames: 2,
            ..stereo_16().with_mode(OutputMode::Blocking)
        };
        let (sink, _stream) = open_sink(config);
        let sink = Arc::new(sink);

        let writer = {
            let sink = Arc::clone(&sink);
            thread::spawn(move || sink.write(&[1; 32], None))
        };
        thread::sleep(Duration::from_millis(20));
        sink.stop().unwrap();

        assert_eq!(writer.join().unwrap(), Ok(2));
    }

    #[test]
    fn write_frames_checks_length() {
        let (sink, _stream) = open_sink(stereo_16().with_mode(OutputMode::Blocking));
        assert!(matches!(
            sink.write_frames(&[0; 8], 3, None),
            Err(SinkError::InvalidArgument(_))
        ));
        assert_eq!(sink.write_frames(&[0; 8], 0, None), Ok(0));
        assert_eq!(sink.write_frames(&[0; 12], 2, None), Ok(2));
    }

    #[test]
    fn blocking_write_after_disconnect() {
        let (sink, stream) = open_sink(stereo_16().with_mode(OutputMode::Blocking));
        let delegate = Arc::new(RecordingDelegate::default());
        sink.set_delegate(delegate.clone());

        stream.disconnect();
        assert_eq!(sink.write(&[0; 4], None), Err(SinkError::Disconnected));
        assert!(sink.is_disconnected());
        assert_eq!(*delegate.errors.lock(), vec![SinkError::Disconnected]);
    }
}
