use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::models::config::SinkConfiguration;
use crate::models::error::SinkError;
use crate::sink::stream_sink::StreamSink;
use crate::traits::output_device::OutputDevice;

/// Opaque identifier for a sink owned by a `SinkRegistry`.
///
/// Never zero, so a binding layer can use 0 as "no sink".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SinkHandle(u64);

impl SinkHandle {
    pub fn from_raw(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink#{}", self.0)
    }
}

/// Handle-based surface over a set of sinks sharing one device.
///
/// Every operation looks the sink up and releases the table lock before
/// calling into it, so a blocked `write` on one handle never stalls the
/// others.
pub struct SinkRegistry<D: OutputDevice> {
    device: Arc<D>,
    template: SinkConfiguration,
    sinks: Mutex<HashMap<SinkHandle, Arc<StreamSink<Arc<D>>>>>,
    next_handle: AtomicU64,
}

impl<D: OutputDevice> SinkRegistry<D> {
    /// Registry whose sinks use the default configuration besides their format.
    pub fn new(device: D) -> Self {
        Self::with_template(device, SinkConfiguration::default())
    }

    /// Registry whose sinks take mode, sharing and buffering from `template`.
    pub fn with_template(device: D, template: SinkConfiguration) -> Self {
        Self {
            device: Arc::new(device),
            template,
            sinks: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Open a sink for the given stream parameters.
    pub fn open(
        &self,
        channel_count: u16,
        sample_rate: u32,
        bit_depth: u16,
        is_float: bool,
    ) -> Result<SinkHandle, SinkError> {
        let config = SinkConfiguration {
            channel_count,
            sample_rate,
            bit_depth,
            is_float,
            ..self.template.clone()
        };
        self.open_with(config)
    }

    pub fn open_with(&self, config: SinkConfiguration) -> Result<SinkHandle, SinkError> {
        let sink = StreamSink::new(Arc::clone(&self.device));
        sink.open(config)?;

        let handle = SinkHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.sinks.lock().insert(handle, Arc::new(sink));
        log::debug!("Registered {}", handle);
        Ok(handle)
    }

    pub fn start(&self, handle: SinkHandle) -> Result<(), SinkError> {
        self.sink(handle)?.start()
    }

    pub fn pause(&self, handle: SinkHandle) -> Result<(), SinkError> {
        self.sink(handle)?.pause()
    }

    pub fn flush(&self, handle: SinkHandle) -> Result<(), SinkError> {
        self.sink(handle)?.flush()
    }

    /// Stop, close and forget a sink. Unknown handles are ignored.
    pub fn close(&self, handle: SinkHandle) {
        let removed = self.sinks.lock().remove(&handle);
        if let Some(sink) = removed {
            sink.close();
            log::debug!("Released {}", handle);
        }
    }

    pub fn close_all(&self) {
        let drained: Vec<_> = self.sinks.lock().drain().collect();
        for (_, sink) in drained {
            sink.close();
        }
    }

    pub fn enqueue(&self, handle: SinkHandle, data: &[u8]) -> Result<(), SinkError> {
        self.sink(handle)?.enqueue(data)
    }

    /// Blocking write; `timeout_nanos` of `None` uses the sink's configured timeout.
    pub fn write(
        &self,
        handle: SinkHandle,
        data: &[u8],
        timeout_nanos: Option<u64>,
    ) -> Result<usize, SinkError> {
        self.sink(handle)?
            .write(data, timeout_nanos.map(Duration::from_nanos))
    }

    pub fn write_frames(
        &self,
        handle: SinkHandle,
        data: &[u8],
        frame_count: usize,
        timeout_nanos: Option<u64>,
    ) -> Result<usize, SinkError> {
        self.sink(handle)?
            .write_frames(data, frame_count, timeout_nanos.map(Duration::from_nanos))
    }

    pub fn sink(&self, handle: SinkHandle) -> Result<Arc<StreamSink<Arc<D>>>, SinkError> {
        self.sinks
            .lock()
            .get(&handle)
            .cloned()
            .ok_or(SinkError::UnknownHandle(handle.0))
    }

    pub fn len(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.lock().is_empty()
    }
}

impl<D: OutputDevice> Drop for SinkRegistry<D> {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::null_device::NullDevice;
    use crate::models::config::{OutputMode, SharingMode};
    use crate::models::state::SinkState;

    fn shared_registry(mode: OutputMode) -> SinkRegistry<NullDevice> {
        let template = SinkConfiguration {
            sharing_mode: SharingMode::Shared,
            ..SinkConfiguration::default().with_mode(mode)
        };
        SinkRegistry::with_template(NullDevice::new(), template)
    }

    #[test]
    fn handles_are_distinct_and_non_zero() {
        let registry = shared_registry(OutputMode::Callback);
        let a = registry.open(2, 44100, 16, false).unwrap();
        let b = registry.open(1, 48000, 32, true).unwrap();
        assert_ne!(a, b);
        assert_ne!(a.as_raw(), 0);
        assert_eq!(registry.len(), 2);
        assert_eq!(SinkHandle::from_raw(0), None);
        assert_eq!(SinkHandle::from_raw(a.as_raw()), Some(a));
    }

    #[test]
    fn unsupported_format_is_a_configuration_error() {
        let registry = shared_registry(OutputMode::Callback);
        assert_eq!(
            registry.open(2, 44100, 20, false),
            Err(SinkError::UnsupportedFormat {
                bit_depth: 20,
                is_float: false
            })
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn pull_mode_through_handles() {
        let registry = shared_registry(OutputMode::Callback);
        let handle = registry.open(2, 44100, 16, false).unwrap();

        registry.enqueue(handle, &[4; 16]).unwrap();
        registry.start(handle).unwrap();
        let stream = registry.device().last_stream().unwrap();
        assert_eq!(stream.pump(4).unwrap(), vec![4; 16]);

        registry.pause(handle).unwrap();
        assert_eq!(registry.sink(handle).unwrap().state(), SinkState::Paused);
        registry.flush(handle).unwrap();
    }

    #[test]
    fn push_mode_through_handles() {
        let registry = shared_registry(OutputMode::Blocking);
        let handle = registry.open(1, 8000, 16, false).unwrap();
        assert_eq!(registry.write(handle, &[0; 10], Some(1_000_000)).unwrap(), 5);
        assert_eq!(registry.write_frames(handle, &[0; 10], 2, None).unwrap(), 2);
    }

    #[test]
    fn unknown_handle_is_rejected() {
        let registry = shared_registry(OutputMode::Callback);
        let handle = registry.open(2, 44100, 16, false).unwrap();
        registry.close(handle);

        assert_eq!(registry.start(handle), Err(SinkError::UnknownHandle(handle.as_raw())));
        assert!(matches!(registry.enqueue(handle, &[0; 4]), Err(SinkError::UnknownHandle(_))));
        registry.close(handle);
        assert!(registry.is_empty());
    }

    #[test]
    fn close_releases_the_device() {
        let registry = SinkRegistry::new(NullDevice::new());
        let first = registry.open(2, 44100, 16, false).unwrap();
        assert!(registry.open(2, 44100, 16, false).is_err());

        registry.close(first);
        registry.open(2, 44100, 16, false).unwrap();
        registry.close_all();
        assert!(registry.is_empty());
    }
}
