//! Error types for the munin node.

use std::path::PathBuf;

use munin_transport_traits::TransportError;
use thiserror::Error;

/// A boxed error returned by user-supplied plugin code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A specialized `Result` type for node operations.
pub type NodeResult<T> = Result<T, NodeError>;

/// Errors surfaced by node construction, the lifecycle operations and sessions.
///
/// Conditions inside a session (unknown commands, unknown plugins, a failing
/// value fetch) are answered on the wire and never become a `NodeError`.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum NodeError {
    /// Invalid node, plugin or field definition.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A transport operation failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The operation is not valid in the node's current lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The configuration file does not exist.
    #[error("Configuration file not found: {0}")]
    ConfigFileNotFound(PathBuf),

    /// The configuration file extension is not one of the supported formats.
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedConfigFormat,

    /// The configuration sources could not be loaded or deserialized.
    #[error("Failed to parse configuration: {0}")]
    ConfigFile(#[from] config::ConfigError),

    /// An I/O error outside of a client connection.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// Creates a [`NodeError::Configuration`] error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a [`NodeError::InvalidState`] error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Returns `true` when the remote peer closed the connection.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_disconnect())
    }

    /// Returns `true` when the operation stopped because its token was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_cancelled())
    }
}

/// Why a field value could not be produced.
///
/// Any fetch error is reported to the master as the unknown value `U`.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The value is currently unavailable.
    #[error("Value unavailable: {0}")]
    Unavailable(String),

    /// The fetch observed cancellation.
    #[error("Fetch cancelled")]
    Cancelled,

    /// The value source failed.
    #[error(transparent)]
    Failed(#[from] BoxError),
}
