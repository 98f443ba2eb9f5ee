//! Core transport types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Enumerates the transports a node can listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// TCP sockets for network communication.
    Tcp,
    /// In-process duplex pipes, used by tests.
    Memory,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Represents the lifecycle state of a listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListenerState {
    /// Created but not yet bound.
    Unbound,
    /// Bound and accepting connections.
    Listening,
    /// Closed; the bound socket has been released.
    Closed,
    /// Binding failed.
    Failed {
        /// A description of the failure reason.
        reason: String,
    },
}

impl ListenerState {
    /// Returns `true` while the listener is bound.
    pub fn is_listening(&self) -> bool {
        matches!(self, Self::Listening)
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbound => write!(f, "unbound"),
            Self::Listening => write!(f, "listening"),
            Self::Closed => write!(f, "closed"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}
