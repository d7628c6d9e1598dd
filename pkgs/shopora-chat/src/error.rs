use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[from] shopora_store::StoreError),

    #[error("Identity lookup failed: {0}")]
    Identity(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Errors from the duplex transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport is not connected")]
    NotConnected,

    #[error("Connection timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Errors decoding Socket.IO frames
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Empty frame")]
    Empty,

    #[error("Unknown packet type: {0}")]
    UnknownPacket(char),

    #[error("Malformed event payload: {0}")]
    MalformedEvent(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
