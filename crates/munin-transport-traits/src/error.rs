//! Transport error types.

use std::io;
use thiserror::Error;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Represents errors that can occur during transport operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// The remote peer closed or reset the connection.
    #[error("Client disconnected")]
    ClientDisconnected,

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// Binding the listening socket failed.
    #[error("Bind failed: {0}")]
    BindFailed(String),

    /// Accepting an inbound connection failed.
    #[error("Accept failed: {0}")]
    AcceptFailed(String),

    /// Failed to send bytes to the peer.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive bytes from the peer.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// The operation is not valid in the transport's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An underlying I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),
}

impl TransportError {
    /// Returns `true` for the distinguished "client disconnected" condition.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::ClientDisconnected)
    }

    /// Returns `true` when the operation was cancelled by the caller.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Classifies an I/O error raised while exchanging bytes with a peer.
    ///
    /// Resets, aborts, broken pipes and unexpected EOF all mean the peer went
    /// away and map to [`TransportError::ClientDisconnected`].
    pub fn from_peer_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => Self::ClientDisconnected,
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
