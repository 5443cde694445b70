//! # API Module
//!
//! The request-facing half of the proxy.
//!
//! ## Core Components:
//!
//! - **`dispatcher`**: `RequestDispatcher` maps an `action` (`connect`,
//!   `disconnect`, `updateSubscription`, `getStatus`) onto the registry and the
//!   supervisor and shapes the JSON reply.
//!
//! - **`routes`**: the axum `Router` and the HTTP status mapping for
//!   `AisStreamError`.

/// Action routing and reply payloads.
pub mod dispatcher;
/// axum routes and error responses.
pub mod routes;

// --- Public API Re-exports ---
pub use dispatcher::{
    AisStreamRequest, ActionAck, ConnectionListReply, ConnectionStatusReply, DispatchReply,
    RequestDispatcher, SystemStatus,
};
pub use routes::{router, AIS_STREAM_PATH, HEALTH_PATH, SYSTEM_STATUS_PATH};
