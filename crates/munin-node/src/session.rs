//! One master connection: the client, its line reader and a response buffer.

use std::net::SocketAddr;

use munin_transport_traits::{CancellationToken, Client};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::encoding::TextEncoding;
use crate::error::{NodeError, NodeResult};
use crate::protocol::line::{Line, LineReader};
use crate::protocol::{CommandOutcome, ProtocolHandler};

/// The state of a single session.
///
/// Responses are assembled with [`Session::write_line`] and sent in one
/// piece by [`Session::flush`]; the buffer is reused for the next response.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    client: Box<dyn Client>,
    cancel: CancellationToken,
    encoding: TextEncoding,
    reader: LineReader,
    response: Vec<u8>,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The master sent `quit` or `.`.
    Quit,
    /// The master closed the connection.
    Disconnected,
    /// The session's token was cancelled.
    Cancelled,
    /// An I/O or handler error ended the session.
    Failed,
}

impl SessionEnd {
    fn from_error(err: &NodeError) -> Self {
        if err.is_disconnect() {
            Self::Disconnected
        } else if err.is_cancelled() {
            Self::Cancelled
        } else {
            warn!(error = %err, "Session failed");
            Self::Failed
        }
    }
}

impl Session {
    /// Wraps an accepted client.
    pub fn new(
        client: Box<dyn Client>,
        encoding: TextEncoding,
        max_line_length: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client,
            cancel,
            encoding,
            reader: LineReader::new(max_line_length),
            response: Vec::with_capacity(256),
        }
    }

    /// Unique id of this session, passed to session callbacks.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The remote endpoint of the master.
    pub fn remote_endpoint(&self) -> SocketAddr {
        self.client.remote_endpoint()
    }

    /// The wire encoding.
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Cancelled when the session must stop.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Appends `line` and a newline to the pending response.
    pub fn write_line(&mut self, line: &str) {
        self.encoding.encode_into(line, &mut self.response);
        self.response.push(b'\n');
    }

    /// Sends the pending response.
    ///
    /// # Errors
    ///
    /// Returns the transport error; a vanished peer is
    /// [`TransportError::ClientDisconnected`](munin_transport_traits::TransportError::ClientDisconnected).
    pub async fn flush(&mut self) -> NodeResult<()> {
        if self.response.is_empty() {
            return Ok(());
        }
        let result = self.client.send(&self.response, &self.cancel).await;
        self.response.clear();
        result.map_err(NodeError::from)
    }

    pub(crate) async fn read_line(&mut self) -> NodeResult<Line> {
        self.reader
            .read_line(self.client.as_mut(), &self.cancel)
            .await
            .map_err(NodeError::from)
    }

    /// Closes the connection, best effort.
    pub(crate) async fn close(&mut self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "Error closing client connection");
        }
    }
}

/// Runs a session to completion.
pub(crate) async fn serve(handler: &dyn ProtocolHandler, session: &mut Session) -> SessionEnd {
    // A session that never began is not ended.
    let end = match handler.begin_transaction(session).await {
        Ok(()) => {
            let end = command_loop(handler, session).await;
            if let Err(e) = handler.end_transaction(session).await {
                warn!(error = %e, "Session end hook failed");
            }
            end
        }
        Err(e) => SessionEnd::from_error(&e),
    };
    debug!(?end, "Session ended");
    end
}

async fn command_loop(handler: &dyn ProtocolHandler, session: &mut Session) -> SessionEnd {
    loop {
        let result = match session.read_line().await {
            Ok(Line::Complete(line)) => handler.handle_command(session, &line).await,
            Ok(Line::Overlong) => {
                debug!("Discarded overlong command line");
                handler
                    .handle_overlong_line(session)
                    .await
                    .map(|()| CommandOutcome::Continue)
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(CommandOutcome::Continue) => {}
            Ok(CommandOutcome::Quit) => return SessionEnd::Quit,
            Err(e) => return SessionEnd::from_error(&e),
        }
    }
}
