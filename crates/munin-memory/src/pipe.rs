//! Duplex-pipe listener, connector and client.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tracing::debug;

use munin_transport_traits::{
    AtomicMetrics, CancellationToken, Client, Listener, ListenerState, TransportError,
    TransportResult, TransportType,
};

/// Bytes buffered in each direction of a pipe before writes wait for the reader.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// The peer-side end of an in-memory connection.
pub type MemoryStream = DuplexStream;

#[derive(Debug)]
struct PendingConnection {
    stream: DuplexStream,
    remote: SocketAddr,
}

type Backlog = Arc<Mutex<Option<mpsc::UnboundedSender<PendingConnection>>>>;

/// Listener whose connections are opened through a [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryListener {
    local: SocketAddr,
    capacity: usize,
    /// Sender side is published to connectors while listening
    backlog: Backlog,
    incoming: Option<mpsc::UnboundedReceiver<PendingConnection>>,
    state: ListenerState,
    metrics: Arc<AtomicMetrics>,
}

/// Opens connections to a [`MemoryListener`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    capacity: usize,
    backlog: Backlog,
}

impl MemoryListener {
    /// Create an unbound listener reporting `127.0.0.1:4949` as its endpoint.
    #[must_use]
    pub fn new() -> (Self, MemoryConnector) {
        Self::with_local_endpoint(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 4949))
    }

    /// Create an unbound listener reporting `local` as its endpoint once started.
    #[must_use]
    pub fn with_local_endpoint(local: SocketAddr) -> (Self, MemoryConnector) {
        let backlog: Backlog = Arc::new(Mutex::new(None));
        let listener = Self {
            local,
            capacity: DEFAULT_PIPE_CAPACITY,
            backlog: Arc::clone(&backlog),
            incoming: None,
            state: ListenerState::Unbound,
            metrics: Arc::new(AtomicMetrics::default()),
        };
        let connector = MemoryConnector {
            capacity: DEFAULT_PIPE_CAPACITY,
            backlog,
        };
        (listener, connector)
    }
}

impl MemoryConnector {
    /// Opens a connection that the listener will see as coming from `remote`.
    ///
    /// Like a TCP connect against a listening socket, this succeeds as soon as
    /// the connection is queued; the listener picks it up on its next `accept`.
    pub fn connect(&self, remote: SocketAddr) -> TransportResult<MemoryStream> {
        let guard = self.backlog.lock();
        let sender = guard
            .as_ref()
            .ok_or_else(|| TransportError::InvalidState("memory listener not listening".into()))?;

        let (server_half, client_half) = tokio::io::duplex(self.capacity);
        sender
            .send(PendingConnection {
                stream: server_half,
                remote,
            })
            .map_err(|_| TransportError::InvalidState("memory listener closed".into()))?;

        debug!(%remote, "Queued in-memory connection");
        Ok(client_half)
    }

    /// Returns `true` while the listener accepts connections.
    pub fn is_listening(&self) -> bool {
        self.backlog.lock().is_some()
    }
}

#[async_trait]
impl Listener for MemoryListener {
    fn transport_type(&self) -> TransportType {
        TransportType::Memory
    }

    fn state(&self) -> ListenerState {
        self.state.clone()
    }

    fn local_endpoint(&self) -> Option<SocketAddr> {
        self.state.is_listening().then_some(self.local)
    }

    async fn start(&mut self) -> TransportResult<()> {
        match self.state {
            ListenerState::Listening => {
                return Err(TransportError::InvalidState(
                    "memory listener already started".into(),
                ));
            }
            ListenerState::Closed => {
                return Err(TransportError::InvalidState("memory listener closed".into()));
            }
            ListenerState::Unbound | ListenerState::Failed { .. } => {}
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.backlog.lock() = Some(tx);
        self.incoming = Some(rx);
        self.state = ListenerState::Listening;
        Ok(())
    }

    async fn accept(&mut self, cancel: &CancellationToken) -> TransportResult<Box<dyn Client>> {
        let incoming = self
            .incoming
            .as_mut()
            .ok_or_else(|| TransportError::InvalidState("memory listener not started".into()))?;

        let pending = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            pending = incoming.recv() => pending.ok_or_else(|| {
                TransportError::AcceptFailed("connection backlog closed".into())
            })?,
        };

        self.metrics.record_connection_opened();
        Ok(Box::new(MemoryClient {
            stream: Some(pending.stream),
            remote: pending.remote,
            metrics: Arc::clone(&self.metrics),
        }))
    }

    async fn close(&mut self) -> TransportResult<()> {
        // Dropping the receiver drops every queued server half, so waiting
        // peers observe EOF.
        self.backlog.lock().take();
        self.incoming.take();
        self.state = ListenerState::Closed;
        Ok(())
    }

    fn metrics(&self) -> Arc<AtomicMetrics> {
        Arc::clone(&self.metrics)
    }
}

/// The node-side end of an in-memory connection.
#[derive(Debug)]
pub struct MemoryClient {
    stream: Option<DuplexStream>,
    remote: SocketAddr,
    metrics: Arc<AtomicMetrics>,
}

impl MemoryClient {
    fn mark_closed(&mut self) {
        if self.stream.take().is_some() {
            self.metrics.record_connection_closed();
        }
    }
}

#[async_trait]
impl Client for MemoryClient {
    fn transport_type(&self) -> TransportType {
        TransportType::Memory
    }

    fn remote_endpoint(&self) -> SocketAddr {
        self.remote
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, bytes: &[u8], cancel: &CancellationToken) -> TransportResult<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(TransportError::ClientDisconnected)?;

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            result = stream.write_all(bytes) => result,
        };

        match result {
            Ok(()) => {
                self.metrics
                    .bytes_sent
                    .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                let err = TransportError::from_peer_io(&e);
                if err.is_disconnect() {
                    self.mark_closed();
                }
                Err(err)
            }
        }
    }

    async fn receive(
        &mut self,
        buffer: &mut [u8],
        cancel: &CancellationToken,
    ) -> TransportResult<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(TransportError::ClientDisconnected)?;

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            result = stream.read(buffer) => result,
        };

        match result {
            Ok(0) if !buffer.is_empty() => {
                self.mark_closed();
                Err(TransportError::ClientDisconnected)
            }
            Ok(n) => {
                self.metrics
                    .bytes_received
                    .fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            Err(e) => {
                let err = TransportError::from_peer_io(&e);
                if err.is_disconnect() {
                    self.mark_closed();
                }
                Err(err)
            }
        }
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            self.metrics.record_connection_closed();
        }
        Ok(())
    }
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        self.mark_closed();
    }
}
