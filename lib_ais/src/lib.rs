//! # lib_ais
//!
//! Connection bookkeeping for the maritime dashboard's AIS Stream proxy.
//!
//! A browser asks the server to open a stream, then polls for status. The server
//! keeps one [`core::ConnectionRecord`] per opened stream in a
//! [`core::ConnectionRegistry`], drives the outbound websocket from
//! [`ingestors::StreamSupervisor`] tasks, and bounds every stream's memory with a
//! [`core::MessageRingBuffer`]. The [`api`] module puts a request dispatcher and
//! axum routes in front of all of it.
//!
//! ## Feature flags
//! - `core`: records, ring buffer, registry and the error type.
//! - `ingestors`: the tokio-tungstenite supervisor (implies `core`).
//! - `api`: dispatcher and HTTP routes (implies `ingestors`).
//! - `full`: all of the above (default).

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Records, the bounded message buffer, the registry and errors.
#[cfg(feature = "core")]
pub mod core;

/// Outbound AIS Stream websocket handling.
#[cfg(feature = "ingestors")]
pub mod ingestors;

/// Request dispatcher and the HTTP surface.
#[cfg(feature = "api")]
pub mod api;

// --- Public API Re-exports ---
#[cfg(feature = "core")]
pub use crate::core::{
    AisStreamError, ConnectionId, ConnectionRecord, ConnectionRegistry, ConnectionStatus,
    MessageRingBuffer, StreamConfig,
};
#[cfg(feature = "ingestors")]
pub use crate::ingestors::{StreamSupervisor, SubscriptionConfig};
#[cfg(feature = "api")]
pub use crate::api::{router, RequestDispatcher};
