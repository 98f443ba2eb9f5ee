//! TCP client (accepted connection) implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use munin_transport_traits::{
    AtomicMetrics, CancellationToken, Client, TransportError, TransportResult, TransportType,
};

/// One accepted TCP connection.
#[derive(Debug)]
pub struct TcpClient {
    /// Present until the connection is closed by either side
    stream: Option<TcpStream>,
    remote: SocketAddr,
    metrics: Arc<AtomicMetrics>,
}

impl TcpClient {
    pub(crate) fn new(stream: TcpStream, remote: SocketAddr, metrics: Arc<AtomicMetrics>) -> Self {
        Self {
            stream: Some(stream),
            remote,
            metrics,
        }
    }

    fn stream_mut(&mut self) -> TransportResult<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or(TransportError::ClientDisconnected)
    }

    /// Drops the socket after the peer went away.
    fn mark_closed(&mut self) {
        if self.stream.take().is_some() {
            self.metrics.record_connection_closed();
        }
    }
}

#[async_trait]
impl Client for TcpClient {
    fn transport_type(&self) -> TransportType {
        TransportType::Tcp
    }

    fn remote_endpoint(&self) -> SocketAddr {
        self.remote
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, bytes: &[u8], cancel: &CancellationToken) -> TransportResult<()> {
        let stream = self.stream_mut()?;

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            result = async {
                stream.write_all(bytes).await?;
                stream.flush().await
            } => result,
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
                    debug!(remote = %self.remote, "Peer closed connection during send");
                    self.mark_closed();
                    Err(err)
                } else {
                    Err(TransportError::SendFailed(e.to_string()))
                }
            }
        }
    }

    async fn receive(
        &mut self,
        buffer: &mut [u8],
        cancel: &CancellationToken,
    ) -> TransportResult<usize> {
        let stream = self.stream_mut()?;

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            result = stream.read(buffer) => result,
        };

        match result {
            Ok(0) if !buffer.is_empty() => {
                debug!(remote = %self.remote, "Peer closed connection");
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
                    Err(err)
                } else {
                    Err(TransportError::ReceiveFailed(e.to_string()))
                }
            }
        }
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        if let Some(mut stream) = self.stream.take() {
            // Best effort: the peer may already be gone
            let _ = stream.shutdown().await;
            self.metrics.record_connection_closed();
            debug!(remote = %self.remote, "TCP connection closed");
        }
        Ok(())
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.mark_closed();
    }
}
