use thiserror::Error;

use super::record::{ConnectionId, ConnectionStatus};

/// Errors raised by the registry, the supervisor and the dispatcher.
///
/// Transport failures on an already-open socket are not returned to anyone;
/// the supervisor records them on the connection and clients see them by polling.
/// `Transport` here only covers failures the caller is waiting on, such as a
/// resubscribe that could not be handed to the socket.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AisStreamError {
    #[error("{0}")]
    Validation(String),

    #[error("Connection not found: {0}")]
    NotFound(ConnectionId),

    #[error("Connection {id} is {status}, expected subscribed")]
    InvalidState {
        id: ConnectionId,
        status: ConnectionStatus,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AisStreamError>;
