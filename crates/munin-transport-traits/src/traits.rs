//! Core transport traits.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TransportResult;
use crate::metrics::AtomicMetrics;
use crate::types::{ListenerState, TransportType};

/// The accepting half of a transport.
///
/// A listener is created unbound, bound by [`Listener::start`], and hands out
/// one [`Client`] per inbound connection from [`Listener::accept`]. The node
/// orchestrator owns its listener exclusively, so the mutating operations take
/// `&mut self`.
#[async_trait]
pub trait Listener: Send + Sync + std::fmt::Debug {
    /// Returns the type of this transport.
    fn transport_type(&self) -> TransportType;

    /// Returns the current lifecycle state of the listener.
    fn state(&self) -> ListenerState;

    /// Returns the bound local endpoint, or `None` while not started.
    fn local_endpoint(&self) -> Option<SocketAddr>;

    /// Binds the listener and starts listening.
    ///
    /// Calling this on a listener that is already started is an
    /// [`InvalidState`](crate::TransportError::InvalidState) error.
    async fn start(&mut self) -> TransportResult<()>;

    /// Waits for the next inbound connection.
    ///
    /// Resolves with [`Cancelled`](crate::TransportError::Cancelled) when `cancel`
    /// fires before a connection arrives; no connection is consumed in that case.
    async fn accept(&mut self, cancel: &CancellationToken) -> TransportResult<Box<dyn Client>>;

    /// Stops listening and releases the bound socket. Idempotent.
    async fn close(&mut self) -> TransportResult<()>;

    /// Returns the metrics shared by this listener and every client it accepted.
    fn metrics(&self) -> Arc<AtomicMetrics>;
}

/// One accepted connection.
///
/// A disconnect initiated by the remote peer surfaces from [`Client::send`]
/// and [`Client::receive`] as
/// [`ClientDisconnected`](crate::TransportError::ClientDisconnected), never as a
/// generic I/O error.
#[async_trait]
pub trait Client: Send + Sync + std::fmt::Debug {
    /// Returns the type of this transport.
    fn transport_type(&self) -> TransportType;

    /// Returns the endpoint of the remote peer.
    fn remote_endpoint(&self) -> SocketAddr;

    /// Returns `true` until the connection is known to be closed.
    fn is_connected(&self) -> bool;

    /// Writes the whole buffer to the peer.
    async fn send(&mut self, bytes: &[u8], cancel: &CancellationToken) -> TransportResult<()>;

    /// Reads available bytes into `buffer`, returning how many were read.
    ///
    /// Never returns `Ok(0)` for a non-empty buffer: end of stream is reported
    /// as [`ClientDisconnected`](crate::TransportError::ClientDisconnected).
    async fn receive(
        &mut self,
        buffer: &mut [u8],
        cancel: &CancellationToken,
    ) -> TransportResult<usize>;

    /// Closes the connection. Idempotent.
    async fn disconnect(&mut self) -> TransportResult<()>;
}
