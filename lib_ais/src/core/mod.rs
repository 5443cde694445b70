//! # Core Module
//!
//! The in-memory side of the AIS proxy. Nothing in here touches the network.
//!
//! ## Core Components:
//!
//! - **`ring_buffer`**: a fixed-capacity FIFO. Each connection stores its most
//!   recent inbound payloads here, so memory stays flat no matter how fast the
//!   relay pushes.
//!
//! - **`record`**: the per-connection state (`ConnectionRecord`) and the status
//!   state machine, plus the serializable views handed to HTTP clients.
//!
//! - **`registry`**: the process-wide table of records. It is an ordinary value,
//!   constructed once at startup and shared behind an `Arc`.
//!
//! - **`error`**: the error taxonomy shared by every layer.
//!
//! - **`config`**: tunables (relay URL, buffer capacity, status window).

/// Tunables shared by the registry and the supervisor.
pub mod config;
/// Error taxonomy for registry, supervisor and dispatcher.
pub mod error;
/// Per-connection state and its client-facing views.
pub mod record;
/// The connection table.
pub mod registry;
/// Bounded FIFO for recent inbound messages.
pub mod ring_buffer;

// --- Public API Re-exports ---
pub use config::StreamConfig;
pub use error::{AisStreamError, Result};
pub use record::{
    ConnectionId, ConnectionRecord, ConnectionSnapshot, ConnectionStatus, ConnectionSummary,
    TransportCommand, TransportHandle,
};
pub use registry::ConnectionRegistry;
pub use ring_buffer::MessageRingBuffer;
