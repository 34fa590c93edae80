use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::error::SinkError;
use crate::processing::ring_buffer::RingBuffer;

struct RingState {
    buffer: RingBuffer,
    closed: bool,
}

/// Device-side buffer for push-mode streams.
///
/// Producers block in `write` until every frame fits or the timeout elapses;
/// the device's real-time side drains it with the non-blocking `read_into`.
/// Frames are never split: the ring only accepts whole frames.
pub struct BlockingRing {
    state: Mutex<RingState>,
    space: Condvar,
    bytes_per_frame: usize,
}

impl BlockingRing {
    pub fn new(capacity_frames: usize, bytes_per_frame: usize) -> Self {
        Self {
            state: Mutex::new(RingState {
                buffer: RingBuffer::new(capacity_frames * bytes_per_frame),
                closed: false,
            }),
            space: Condvar::new(),
            bytes_per_frame,
        }
    }

    /// Write the whole frames in `data`, blocking while the ring is full.
    ///
    /// Returns the frames accepted, which is fewer than requested only if
    /// `timeout` elapsed or the ring was closed mid-write. Writing to a closed
    /// ring before any progress is `StreamClosed`.
    pub fn write(&self, data: &[u8], timeout: Duration) -> Result<usize, SinkError> {
        let bpf = self.bytes_per_frame;
        if bpf == 0 {
            return Ok(0);
        }
        let total_frames = data.len() / bpf;
        let deadline = Instant::now().checked_add(timeout);
        let mut written = 0;

        let mut state = self.state.lock();
        loop {
            if state.closed {
                return if written > 0 {
                    Ok(written)
                } else {
                    Err(SinkError::StreamClosed)
                };
            }

            let room = state.buffer.free() / bpf;
            let frames = room.min(total_frames - written);
            if frames > 0 {
                state.buffer.write(&data[written * bpf..(written + frames) * bpf]);
                written += frames;
            }
            if written == total_frames {
                return Ok(written);
            }

            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Ok(written);
                    }
                    self.space.wait_until(&mut state, deadline);
                }
                None => self.space.wait(&mut state),
            }
        }
    }

    /// Non-blocking drain for the real-time thread.
    ///
    /// Returns `None` if a producer holds the lock; the caller plays silence.
    pub fn read_into(&self, dest: &mut [u8]) -> Option<usize> {
        let mut state = self.state.try_lock()?;
        let read = state.buffer.read_into(dest);
        drop(state);
        if read > 0 {
            self.space.notify_all();
        }
        Some(read)
    }

    /// Blocking variant of `read_into`, for software devices off the real-time path.
    pub fn drain_into(&self, dest: &mut [u8]) -> usize {
        let read = self.state.lock().buffer.read_into(dest);
        if read > 0 {
            self.space.notify_all();
        }
        read
    }

    /// Discard everything buffered. Returns the frames dropped.
    pub fn reset(&self) -> usize {
        let dropped = {
            let mut state = self.state.lock();
            let count = state.buffer.count();
            state.buffer.reset();
            count
        };
        self.space.notify_all();
        dropped / self.bytes_per_frame.max(1)
    }

    /// Reject further writes and wake every blocked writer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.space.notify_all();
    }

    pub fn buffered_frames(&self) -> usize {
        self.state.lock().buffer.count() / self.bytes_per_frame.max(1)
    }

    pub fn capacity_frames(&self) -> usize {
        self.state.lock().buffer.capacity() / self.bytes_per_frame.max(1)
    }
}
