//! The node orchestrator: listener lifecycle and the accept loop.
//!
//! A node serves one session at a time. The listener lock is held from
//! `accept` until the accepted session has ended, so sessions never overlap
//! even when `accept_single` is called from several tasks.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use munin_transport_traits::{
    AtomicMetrics, CancellationToken, Client, Listener, TransportError, TransportMetrics,
};
use parking_lot::Mutex;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::access::{self, AccessRule};
use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use crate::plugin::PluginRegistry;
use crate::profile::NodeProfile;
use crate::protocol::{MuninProtocol, ProtocolHandler};
use crate::session::{self, Session, SessionEnd};

/// Default limit for one command line, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Constructed, not yet listening.
    Created,
    /// Listening, not yet in the accept loop.
    Started,
    /// Inside `run`, accepting sessions.
    Accepting,
    /// Listener closed.
    Stopped,
    /// Torn down; no further operation is valid.
    Disposed,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Accepting => "accepting",
            Self::Stopped => "stopped",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// A munin node that hosting code can start, run, stop and dispose.
#[async_trait]
pub trait Node: Send + Sync + fmt::Debug {
    /// The identity and plugins of this node.
    fn profile(&self) -> &NodeProfile;

    /// The current lifecycle state.
    fn state(&self) -> NodeState;

    /// The bound endpoint; `None` unless started.
    fn local_endpoint(&self) -> Option<SocketAddr>;

    /// Transport metrics of the node's listener.
    fn metrics(&self) -> TransportMetrics;

    /// Binds and starts listening.
    ///
    /// # Errors
    ///
    /// [`NodeError::InvalidState`] unless the node is freshly created, or the
    /// transport's bind error.
    async fn start(&self) -> NodeResult<()>;

    /// Accepts one connection and serves it to completion.
    ///
    /// A connection refused by the access rule is closed without a banner
    /// and counts as served.
    ///
    /// # Errors
    ///
    /// Cancellation of `cancel`, or [`Node::stop`] while waiting for a
    /// connection, is reported as a cancelled transport error only when
    /// `throw_if_cancelled` is set; otherwise it returns `Ok(())`.
    async fn accept_single(&self, throw_if_cancelled: bool, cancel: &CancellationToken)
    -> NodeResult<()>;

    /// Starts if needed, then accepts and serves sessions until `cancel` fires
    /// or [`Node::stop`] is called. Cancellation is a normal way to end the
    /// loop and returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Start errors, and accept failures other than cancellation.
    async fn run(&self, cancel: &CancellationToken) -> NodeResult<()>;

    /// Lets the current session finish, then stops accepting and closes the listener.
    ///
    /// # Errors
    ///
    /// [`NodeError::InvalidState`] after [`Node::dispose`].
    async fn stop(&self) -> NodeResult<()>;

    /// Stops and releases the listener. Idempotent.
    async fn dispose(&self);
}

/// The standard [`Node`] over any [`Listener`].
pub struct NodeServer {
    profile: Arc<NodeProfile>,
    handler: Arc<dyn ProtocolHandler>,
    access_rule: Option<Arc<dyn AccessRule>>,
    max_line_length: usize,
    /// Held across accept and the accepted session
    listener: tokio::sync::Mutex<Box<dyn Listener>>,
    metrics: Arc<AtomicMetrics>,
    state: Mutex<NodeState>,
    local_endpoint: Mutex<Option<SocketAddr>>,
    /// Graceful stop request
    shutdown: CancellationToken,
}

impl fmt::Debug for NodeServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeServer")
            .field("hostname", &self.profile.hostname())
            .field("state", &self.state())
            .field("local_endpoint", &self.local_endpoint())
            .field("access_rule", &self.access_rule)
            .finish_non_exhaustive()
    }
}

impl NodeServer {
    /// Creates a node serving the standard command set.
    pub fn new(
        profile: NodeProfile,
        listener: Box<dyn Listener>,
        access_rule: Option<Arc<dyn AccessRule>>,
    ) -> Self {
        let builder = Self::builder(profile, listener);
        match access_rule {
            Some(rule) => builder.access_rule(rule).build(),
            None => builder.build(),
        }
    }

    /// Starts building a node.
    pub fn builder(profile: NodeProfile, listener: Box<dyn Listener>) -> NodeServerBuilder {
        NodeServerBuilder::new(profile, listener)
    }

    fn set_state(&self, state: NodeState) {
        let mut current = self.state.lock();
        if *current != NodeState::Disposed {
            debug!(from = %*current, to = %state, "Node state changed");
            *current = state;
        }
    }

    fn require_listening(&self) -> NodeResult<()> {
        match self.state() {
            NodeState::Started | NodeState::Accepting => Ok(()),
            state => Err(NodeError::invalid_state(format!(
                "node is {state}, not listening"
            ))),
        }
    }

    /// Serves one accepted client, or turns it away.
    async fn serve_client(
        &self,
        mut client: Box<dyn Client>,
        cancel: &CancellationToken,
    ) -> NodeResult<()> {
        let remote = client.remote_endpoint();
        if !access::is_accepted(self.access_rule.as_deref(), &remote) {
            info!(%remote, "Connection refused by access rule");
            self.metrics.record_rejected();
            if let Err(e) = client.disconnect().await {
                debug!(%remote, error = %e, "Error closing refused connection");
            }
            return Ok(());
        }

        let mut session = Session::new(
            client,
            self.profile.encoding(),
            self.max_line_length,
            cancel.clone(),
        );
        let span = info_span!("session", session_id = %session.id(), %remote);
        let end = async {
            info!("Session started");
            let end = session::serve(self.handler.as_ref(), &mut session).await;
            session.close().await;
            info!(?end, "Session closed");
            end
        }
        .instrument(span)
        .await;

        match end {
            SessionEnd::Cancelled => Err(TransportError::Cancelled.into()),
            SessionEnd::Quit | SessionEnd::Disconnected | SessionEnd::Failed => Ok(()),
        }
    }

    async fn close_listener(&self, listener: &mut dyn Listener) {
        if let Err(e) = listener.close().await {
            warn!(error = %e, "Error closing listener");
        }
        *self.local_endpoint.lock() = None;
    }
}

#[async_trait]
impl Node for NodeServer {
    fn profile(&self) -> &NodeProfile {
        &self.profile
    }

    fn state(&self) -> NodeState {
        *self.state.lock()
    }

    fn local_endpoint(&self) -> Option<SocketAddr> {
        *self.local_endpoint.lock()
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }

    async fn start(&self) -> NodeResult<()> {
        let mut listener = self.listener.lock().await;
        match self.state() {
            NodeState::Created => {}
            state => {
                return Err(NodeError::invalid_state(format!(
                    "cannot start a node that is {state}"
                )));
            }
        }

        listener.start().await?;
        let local = listener.local_endpoint();
        *self.local_endpoint.lock() = local;
        self.set_state(NodeState::Started);
        info!(
            hostname = %self.profile.hostname(),
            local_endpoint = ?local,
            transport = %listener.transport_type(),
            "Munin node started"
        );
        Ok(())
    }

    async fn accept_single(
        &self,
        throw_if_cancelled: bool,
        cancel: &CancellationToken,
    ) -> NodeResult<()> {
        let mut listener = self.listener.lock().await;
        self.require_listening()?;

        let accepted = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(TransportError::Cancelled),
            accepted = listener.accept(cancel) => accepted,
        };
        let result = match accepted {
            Ok(client) => self.serve_client(client, cancel).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Err(e) if e.is_cancelled() && !throw_if_cancelled => Ok(()),
            other => other,
        }
    }

    async fn run(&self, cancel: &CancellationToken) -> NodeResult<()> {
        if self.state() == NodeState::Created {
            self.start().await?;
        }

        let mut listener = self.listener.lock().await;
        self.require_listening()?;
        self.set_state(NodeState::Accepting);
        info!("Accepting sessions");

        let result = loop {
            let accepted = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    info!("Stop requested, no longer accepting");
                    break Ok(());
                }
                accepted = listener.accept(cancel) => accepted,
            };

            match accepted {
                Ok(client) => match self.serve_client(client, cancel).await {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => break Ok(()),
                    Err(e) => break Err(e),
                },
                Err(e) if e.is_cancelled() => break Ok(()),
                Err(e) => {
                    error!(error = %e, "Accept failed");
                    break Err(e.into());
                }
            }
        };

        self.close_listener(&mut **listener).await;
        self.set_state(NodeState::Stopped);
        info!("Munin node stopped");
        result
    }

    async fn stop(&self) -> NodeResult<()> {
        if self.state() == NodeState::Disposed {
            return Err(NodeError::invalid_state("node is disposed"));
        }
        self.shutdown.cancel();

        let mut listener = self.listener.lock().await;
        self.close_listener(&mut **listener).await;
        self.set_state(NodeState::Stopped);
        Ok(())
    }

    async fn dispose(&self) {
        if self.state() == NodeState::Disposed {
            return;
        }
        self.shutdown.cancel();

        let mut listener = self.listener.lock().await;
        self.close_listener(&mut **listener).await;
        *self.state.lock() = NodeState::Disposed;
        debug!("Munin node disposed");
    }
}

/// Builder for [`NodeServer`]
pub struct NodeServerBuilder {
    profile: NodeProfile,
    listener: Box<dyn Listener>,
    access_rule: Option<Arc<dyn AccessRule>>,
    handler: Option<Arc<dyn ProtocolHandler>>,
    max_line_length: usize,
}

impl fmt::Debug for NodeServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeServerBuilder")
            .field("hostname", &self.profile.hostname())
            .field("listener", &self.listener)
            .field("access_rule", &self.access_rule)
            .field("max_line_length", &self.max_line_length)
            .finish_non_exhaustive()
    }
}

impl NodeServerBuilder {
    fn new(profile: NodeProfile, listener: Box<dyn Listener>) -> Self {
        Self {
            profile,
            listener,
            access_rule: None,
            handler: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Only serve connections the rule accepts
    #[must_use]
    pub fn access_rule(mut self, rule: Arc<dyn AccessRule>) -> Self {
        self.access_rule = Some(rule);
        self
    }

    /// Replace the standard command set
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn ProtocolHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set the longest accepted command line, in bytes
    #[must_use]
    pub const fn max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    /// Build the node
    #[must_use]
    pub fn build(self) -> NodeServer {
        let profile = Arc::new(self.profile);
        let handler = self
            .handler
            .unwrap_or_else(|| Arc::new(MuninProtocol::new(Arc::clone(&profile))));
        let metrics = self.listener.metrics();

        NodeServer {
            profile,
            handler,
            access_rule: self.access_rule,
            max_line_length: self.max_line_length,
            listener: tokio::sync::Mutex::new(self.listener),
            metrics,
            state: Mutex::new(NodeState::Created),
            local_endpoint: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Builds a TCP node from a configuration.
///
/// The configuration is validated first; nothing is bound until
/// [`Node::start`] or [`Node::run`].
///
/// # Errors
///
/// Returns [`NodeError::Configuration`] for an invalid configuration.
pub fn create_tcp_node(config: &NodeConfig, plugins: PluginRegistry) -> NodeResult<Arc<dyn Node>> {
    config.validate()?;

    let profile = NodeProfile::new(
        config.hostname.clone(),
        config.version.clone(),
        config.encoding,
        plugins,
    )?;
    let listener = munin_tcp::TcpListenerBuilder::new()
        .bind_addr(config.bind_addr()?)
        .build();

    let mut builder = NodeServer::builder(profile, Box::new(listener))
        .max_line_length(config.max_line_length);
    if let Some(rule) = config.access.build_rule()? {
        builder = builder.access_rule(rule);
    }
    Ok(Arc::new(builder.build()))
}
