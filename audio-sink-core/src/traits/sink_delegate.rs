use crate::models::error::SinkError;
use crate::models::state::SinkState;

/// Event delegate for sink notifications.
///
/// State changes are reported from whichever control thread made the
/// transition. Stream errors come from the backend's error path, never from
/// the real-time data callback. Implementations should marshal to the UI
/// thread if needed.
pub trait SinkDelegate: Send + Sync {
    /// Called after the sink state changes.
    fn on_state_changed(&self, state: SinkState);

    /// Called when the stream fails asynchronously, e.g. the device is unplugged.
    fn on_error(&self, error: &SinkError);
}
