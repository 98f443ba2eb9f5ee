//! # Munin Memory Transport
//!
//! An in-process [`Listener`]/[`Client`] pair built on [`tokio::io::duplex`].
//! It lets the protocol engine and the node orchestrator run end to end in
//! tests with no network stack involved, while still simulating the remote
//! endpoint that access rules inspect.
//!
//! ```rust,ignore
//! use munin_memory::MemoryListener;
//! use tokio::io::AsyncReadExt;
//!
//! let (listener, connector) = MemoryListener::new();
//! // hand `listener` to a node, start it, then:
//! let mut stream = connector.connect("127.0.0.1:50000".parse()?)?;
//! let mut banner = String::new();
//! stream.read_to_string(&mut banner).await?;
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

mod pipe;

pub use pipe::{
    DEFAULT_PIPE_CAPACITY, MemoryClient, MemoryConnector, MemoryListener, MemoryStream,
};

pub use munin_transport_traits::{
    CancellationToken, Client, Listener, ListenerState, TransportError, TransportResult,
    TransportType,
};
