use std::time::Duration;

/// Errors that can occur in engine operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Setting up the stream with the remote service failed.
    #[error("connection error: {0}")]
    Connection(#[from] silkcast_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] silkcast_frame::FrameError),

    /// The decoder rejected a frame buffer.
    #[error("decode failed: {0}")]
    Decode(String),

    /// No frame arrived in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The engine was closed.
    #[error("engine closed")]
    Closed,

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
