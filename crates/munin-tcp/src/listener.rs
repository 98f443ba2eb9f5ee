//! TCP listener implementation.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use munin_transport_traits::{
    AtomicMetrics, CancellationToken, Client, Listener, ListenerState, TransportError,
    TransportResult, TransportType,
};

use crate::client::TcpClient;

/// The port registered for the munin node protocol.
pub const DEFAULT_PORT: u16 = 4949;

/// TCP listener that hands out one [`TcpClient`] per accepted connection.
#[derive(Debug)]
pub struct TcpListener {
    config: TcpConfig,
    /// Bound socket, present while listening
    listener: Option<tokio::net::TcpListener>,
    local_addr: Option<SocketAddr>,
    state: ListenerState,
    /// Shared with every accepted client (lock-free atomic)
    metrics: Arc<AtomicMetrics>,
}

impl TcpListener {
    /// Create an unbound listener for the given address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        TcpListenerBuilder::new().bind_addr(bind_addr).build()
    }

    /// Create an unbound listener from a configuration.
    #[must_use]
    pub fn with_config(config: TcpConfig) -> Self {
        Self {
            config,
            listener: None,
            local_addr: None,
            state: ListenerState::Unbound,
            metrics: Arc::new(AtomicMetrics::default()),
        }
    }

    /// Returns the configuration this listener binds with.
    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    /// Binds synchronously, preferring a dual-stack socket for the IPv6 wildcard.
    fn bind(&self) -> io::Result<std::net::TcpListener> {
        let addr = self.config.bind_addr;
        let wants_fallback =
            self.config.dual_stack && addr.is_ipv6() && addr.ip().is_unspecified();

        match std::net::TcpListener::bind(addr) {
            Ok(listener) => Ok(listener),
            Err(e) if wants_fallback && !is_fatal_bind_error(&e) => {
                let v4 = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, addr.port()));
                debug!(error = %e, fallback = %v4, "IPv6 wildcard bind failed, using IPv4 only");
                std::net::TcpListener::bind(v4)
            }
            Err(e) => Err(e),
        }
    }
}

/// Errors that an IPv4 fallback would only repeat.
fn is_fatal_bind_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::AddrInUse | io::ErrorKind::PermissionDenied
    )
}

#[async_trait]
impl Listener for TcpListener {
    fn transport_type(&self) -> TransportType {
        TransportType::Tcp
    }

    fn state(&self) -> ListenerState {
        self.state.clone()
    }

    fn local_endpoint(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    async fn start(&mut self) -> TransportResult<()> {
        match self.state {
            ListenerState::Listening => {
                return Err(TransportError::InvalidState(
                    "TCP listener already started".into(),
                ));
            }
            ListenerState::Closed => {
                return Err(TransportError::InvalidState("TCP listener closed".into()));
            }
            ListenerState::Unbound | ListenerState::Failed { .. } => {}
        }

        let bound = self
            .bind()
            .and_then(|std_listener| {
                std_listener.set_nonblocking(true)?;
                tokio::net::TcpListener::from_std(std_listener)
            })
            .map_err(|e| {
                self.state = ListenerState::Failed {
                    reason: e.to_string(),
                };
                TransportError::BindFailed(format!("{}: {e}", self.config.bind_addr))
            })?;

        let local_addr = bound.local_addr()?;
        info!(%local_addr, "TCP listener started");

        self.local_addr = Some(local_addr);
        self.listener = Some(bound);
        self.state = ListenerState::Listening;
        Ok(())
    }

    async fn accept(&mut self, cancel: &CancellationToken) -> TransportResult<Box<dyn Client>> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| TransportError::InvalidState("TCP listener not started".into()))?;

        let (stream, remote) = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            result = listener.accept() => {
                result.map_err(|e| TransportError::AcceptFailed(e.to_string()))?
            }
        };

        if self.config.nodelay
            && let Err(e) = stream.set_nodelay(true)
        {
            warn!(%remote, error = %e, "Failed to set TCP_NODELAY");
        }

        debug!(%remote, "Accepted TCP connection");
        self.metrics.record_connection_opened();
        Ok(Box::new(TcpClient::new(
            stream,
            remote,
            Arc::clone(&self.metrics),
        )))
    }

    async fn close(&mut self) -> TransportResult<()> {
        if self.listener.take().is_some() {
            info!(local_addr = ?self.local_addr, "TCP listener closed");
        }
        self.local_addr = None;
        self.state = ListenerState::Closed;
        Ok(())
    }

    fn metrics(&self) -> Arc<AtomicMetrics> {
        Arc::clone(&self.metrics)
    }
}

/// TCP listener configuration
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Fall back to `0.0.0.0` when the IPv6 wildcard cannot be bound
    pub dual_stack: bool,
    /// Disable Nagle's algorithm on accepted connections
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(Ipv4Addr::LOCALHOST.into(), DEFAULT_PORT),
            dual_stack: true,
            nodelay: true,
        }
    }
}

/// TCP listener builder
#[derive(Debug, Default)]
pub struct TcpListenerBuilder {
    config: TcpConfig,
}

impl TcpListenerBuilder {
    /// Create a new TCP listener builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: TcpConfig::default(),
        }
    }

    /// Set bind address
    #[must_use]
    pub const fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Enable or disable the IPv4 fallback for the IPv6 wildcard address
    #[must_use]
    pub const fn dual_stack(mut self, enabled: bool) -> Self {
        self.config.dual_stack = enabled;
        self
    }

    /// Enable or disable TCP_NODELAY on accepted connections
    #[must_use]
    pub const fn nodelay(mut self, enabled: bool) -> Self {
        self.config.nodelay = enabled;
        self
    }

    /// Build the (unbound) TCP listener
    #[must_use]
    pub fn build(self) -> TcpListener {
        TcpListener::with_config(self.config)
    }
}
