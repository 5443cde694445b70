//! Stream tunables.

/// Public AIS Stream relay endpoint.
pub const DEFAULT_AIS_WS_URL: &str = "wss://stream.aisstream.io/v0/stream";
/// How many inbound messages each connection keeps.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;
/// How many buffered messages a single-connection status query returns.
pub const DEFAULT_STATUS_WINDOW: usize = 10;

/// Configuration for the AIS stream registry and supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Upstream websocket URL the supervisor dials for every connection.
    pub ws_url: String,
    /// Capacity of each connection's message ring buffer.
    pub buffer_capacity: usize,
    /// Number of buffered messages returned by a single-connection status query.
    pub status_window: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_AIS_WS_URL.to_string(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            status_window: DEFAULT_STATUS_WINDOW,
        }
    }
}

impl StreamConfig {
    /// Same defaults, different relay. Used by tests pointing at a local mock.
    pub fn with_url(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ..Self::default()
        }
    }

    /// The status window, never wider than what a buffer can hold.
    pub fn effective_status_window(&self) -> usize {
        self.status_window.min(self.buffer_capacity)
    }
}
