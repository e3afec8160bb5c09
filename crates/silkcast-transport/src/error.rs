use std::net::SocketAddr;

/// Errors that can occur while talking to the wire or the remote service.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind a datagram socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// An I/O error occurred on a socket or body stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote service answered with a non-success status.
    #[error("{url} responded {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    /// The request never produced a response (refused, timed out, reset).
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// True when the failure is a timeout rather than a refusal or a bad status.
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ),
            TransportError::Request { message, .. } => message.contains("timed out"),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
