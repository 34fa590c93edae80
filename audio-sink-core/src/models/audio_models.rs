use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// An output device a sink can be opened against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    /// Preferred sample rate reported by the backend, if any.
    pub default_sample_rate: Option<u32>,
    pub max_channels: Option<u16>,
}

/// Snapshot of sink counters, for debugging dropouts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkDiagnostics {
    pub callback_count: u64,
    pub underrun_count: u64,
    pub partial_fill_count: u64,
    pub lock_contention_count: u64,
    pub frames_delivered: u64,
    pub silence_frames: u64,
    pub buffers_enqueued: u64,
    pub buffers_discarded: u64,
    pub bytes_truncated: u64,
    pub frames_written: u64,
    pub write_timeouts: u64,
    pub stream_errors: u64,
}

/// Lock-free counters behind `SinkDiagnostics`.
///
/// Updated from the real-time thread, so everything is a relaxed atomic add.
#[derive(Debug, Default)]
pub(crate) struct DiagnosticCounters {
    pub callback_count: AtomicU64,
    pub underrun_count: AtomicU64,
    pub partial_fill_count: AtomicU64,
    pub lock_contention_count: AtomicU64,
    pub frames_delivered: AtomicU64,
    pub silence_frames: AtomicU64,
    pub buffers_enqueued: AtomicU64,
    pub buffers_discarded: AtomicU64,
    pub bytes_truncated: AtomicU64,
    pub frames_written: AtomicU64,
    pub write_timeouts: AtomicU64,
    pub stream_errors: AtomicU64,
}

impl DiagnosticCounters {
    pub fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SinkDiagnostics {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SinkDiagnostics {
            callback_count: get(&self.callback_count),
            underrun_count: get(&self.underrun_count),
            partial_fill_count: get(&self.partial_fill_count),
            lock_contention_count: get(&self.lock_contention_count),
            frames_delivered: get(&self.frames_delivered),
            silence_frames: get(&self.silence_frames),
            buffers_enqueued: get(&self.buffers_enqueued),
            buffers_discarded: get(&self.buffers_discarded),
            bytes_truncated: get(&self.bytes_truncated),
            frames_written: get(&self.frames_written),
            write_timeouts: get(&self.write_timeouts),
            stream_errors: get(&self.stream_errors),
        }
    }
}
