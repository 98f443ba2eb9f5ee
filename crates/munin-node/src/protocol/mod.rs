//! The munin text protocol.
//!
//! A session is a banner followed by request/response exchanges, one command
//! line per request. [`ProtocolHandler`] is the seam between the session loop
//! and the command semantics; [`MuninProtocol`] implements the standard
//! command set on top of a [`NodeProfile`](crate::NodeProfile).

mod command;
mod engine;
pub(crate) mod line;

use std::fmt;

use async_trait::async_trait;

use crate::error::NodeResult;
use crate::session::Session;

pub use engine::MuninProtocol;

/// Response to a line that is not a known command.
pub const UNKNOWN_COMMAND_RESPONSE: &str =
    "# Unknown command. Try cap, list, nodes, config, fetch, version or quit";

/// Response to `fetch` or `config` for a plugin that does not exist.
pub const UNKNOWN_SERVICE_RESPONSE: &str = "# Unknown service";

/// Terminates multi-line responses.
pub const END_OF_RESPONSE: &str = ".";

/// Whether the session continues after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Read the next command.
    Continue,
    /// Close the session.
    Quit,
}

/// Command semantics of a session.
///
/// The session loop calls [`begin_transaction`](Self::begin_transaction) once,
/// then [`handle_command`](Self::handle_command) per received line until the
/// handler returns [`CommandOutcome::Quit`] or the connection ends, and
/// finally [`end_transaction`](Self::end_transaction) if the session began.
#[async_trait]
pub trait ProtocolHandler: Send + Sync + fmt::Debug {
    /// Starts a session, typically by sending the banner.
    async fn begin_transaction(&self, session: &mut Session) -> NodeResult<()>;

    /// Ends a session. Runs only after a successful
    /// [`begin_transaction`](Self::begin_transaction), however the session
    /// ended afterwards, so it must not rely on the connection still being open.
    async fn end_transaction(&self, session: &mut Session) -> NodeResult<()> {
        let _ = session;
        Ok(())
    }

    /// Handles one command line, terminator removed.
    async fn handle_command(&self, session: &mut Session, line: &[u8]) -> NodeResult<CommandOutcome>;

    /// Handles a line that exceeded the configured length limit.
    async fn handle_overlong_line(&self, session: &mut Session) -> NodeResult<()> {
        session.write_line(UNKNOWN_COMMAND_RESPONSE);
        session.flush().await
    }
}
