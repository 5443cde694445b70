//! # Ingestors Module
//!
//! Everything that talks to the AIS Stream relay.
//!
//! ## Core Components:
//!
//! - **`subscription`**: the client-side subscription config, its validation,
//!   and the handshake frame the relay expects after the socket opens.
//!
//! - **`ais_stream`**: the `StreamSupervisor`. One spawned task per connection
//!   owns the websocket, pushes status transitions into the registry, and feeds
//!   decoded messages into the record's ring buffer.

/// Supervisor and per-connection socket tasks.
pub mod ais_stream;
/// Subscription config and the relay handshake.
pub mod subscription;

// --- Public API Re-exports ---
pub use ais_stream::StreamSupervisor;
pub use subscription::{BoundingBox, SubscriptionConfig, SubscriptionMessage};
