//! # Munin TCP Transport
//!
//! TCP socket transport for the munin node.
//! This crate provides the [`Listener`] and [`Client`] implementations the
//! node orchestrator uses for real networking.
//!
//! ## Features
//!
//! - **Dual-stack binding**: the IPv6 wildcard address accepts IPv4 peers too,
//!   falling back to an IPv4-only socket when the host has no IPv6 support
//! - **Cancellation**: `accept`, `send` and `receive` race a [`CancellationToken`]
//! - **Disconnect detection**: peer resets and EOF surface as
//!   [`TransportError::ClientDisconnected`]
//! - **Metrics**: byte and connection counters shared by a listener and its clients
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use munin_tcp::TcpListenerBuilder;
//! use munin_transport_traits::{CancellationToken, Listener};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut listener = TcpListenerBuilder::new()
//!         .bind_addr("[::]:4949".parse()?)
//!         .build();
//!
//!     listener.start().await?;
//!     let client = listener.accept(&CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

mod client;
mod listener;

pub use client::TcpClient;
pub use listener::{DEFAULT_PORT, TcpConfig, TcpListener, TcpListenerBuilder};

// Re-export transport traits for convenience
pub use munin_transport_traits::{
    CancellationToken, Client, Listener, ListenerState, TransportError, TransportMetrics,
    TransportResult, TransportType,
};
