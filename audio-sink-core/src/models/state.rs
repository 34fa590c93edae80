/// Sink lifecycle state machine.
///
/// State transitions:
/// ```text
/// closed → open → started ↔ paused
///    ↑       ↓       ↓        ↓
///    └───────┴───────┴────────┘  (stop / close)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SinkState {
    #[default]
    Closed,
    Open,
    Started,
    Paused,
}

impl SinkState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Whether a stream is currently held.
    pub fn has_stream(&self) -> bool {
        !self.is_closed()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::Started => "started",
            Self::Paused => "paused",
        }
    }
}

/// State reported by a device stream.
///
/// Backends transition asynchronously, so a stream may sit in `Starting`
/// for a while after `request_start` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    Open,
    Starting,
    Started,
    Pausing,
    Paused,
    Flushing,
    Flushed,
    Stopping,
    Stopped,
    Closed,
    /// The OS or driver reclaimed the device.
    Disconnected,
}

impl StreamState {
    /// A start is already in flight or done.
    pub fn is_starting_or_started(&self) -> bool {
        matches!(self, Self::Starting | Self::Started)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Disconnected)
    }
}
