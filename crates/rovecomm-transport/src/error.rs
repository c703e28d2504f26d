use std::net::SocketAddr;

/// Errors surfaced by the transport engines.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind a local socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to connect to a remote peer.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the socket. The underlying error is
    /// preserved for the caller to inspect.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the TCP stream.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The engine has already been closed; a fresh instance is required.
    #[error("engine closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
