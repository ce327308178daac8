use hub_core::ClientId;
use hub_protocol::CodecError;
use thiserror::Error;

/// Errors returned by [`Hub`](crate::hub::Hub) operations.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("failed to encode payload: {0}")]
    Encode(#[from] CodecError),

    #[error("client {0} is already registered")]
    DuplicateClient(ClientId),

    #[error("client {0} is not active")]
    NotActive(ClientId),

    #[error("hub is shut down")]
    Closed,
}

/// Transport-level failure on one connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
