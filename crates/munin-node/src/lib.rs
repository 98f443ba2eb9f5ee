//! # Munin Node
//!
//! An embeddable munin node: the agent a munin master polls for metrics over
//! the line-oriented munin text protocol.
//!
//! ## Architecture
//!
//! - [`plugin`]: plugins, their graph attributes and value-producing fields
//! - [`protocol`]: the command set (`list`, `nodes`, `config`, `fetch`,
//!   `version`, `cap`, `quit`) behind the [`ProtocolHandler`] seam
//! - [`Node`]: binds a [`Listener`], applies the [`AccessRule`] and serves
//!   one session at a time until stopped
//! - [`NodeConfig`] and [`LoggingConfig`]: file/environment configuration
//!   and `tracing` setup
//!
//! Transports live in their own crates (`munin-tcp`, `munin-memory`) behind
//! the traits of `munin-transport-traits`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use munin_node::plugin::{Field, FieldValue, Plugin, PluginGraphAttributes, PluginRegistry};
//! use munin_node::{CancellationToken, NodeConfig, create_tcp_node};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::builder().hostname("node1.example.com").build()?;
//!
//!     let load = Plugin::new(
//!         "load",
//!         PluginGraphAttributes::builder("Load average", "system", "load").build()?,
//!         vec![
//!             Field::builder("load", "load")
//!                 .fetch(|| Ok(FieldValue::Number(0.42)))
//!                 .build()?,
//!         ],
//!     )?;
//!
//!     let node = create_tcp_node(&config, PluginRegistry::new().with_plugin(load)?)?;
//!     node.run(&CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(missing_debug_implementations, rust_2018_idioms, clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_panics_doc
)]

pub mod access;
pub mod config;
mod encoding;
mod error;
mod logging;
mod node;
pub mod plugin;
mod profile;
pub mod protocol;
mod session;

pub use access::{AccessRule, AllowList, AnyOf, FnRule, LoopbackOnly};
pub use config::{
    AccessConfig, ListenAddress, LogOutput, LogRotation, LoggingConfig, NodeConfig,
    NodeConfigBuilder,
};
pub use encoding::TextEncoding;
pub use error::{BoxError, FetchError, NodeError, NodeResult};
pub use logging::LoggingGuard;
pub use node::{
    DEFAULT_MAX_LINE_LENGTH, Node, NodeServer, NodeServerBuilder, NodeState, create_tcp_node,
};
pub use plugin::{Plugin, PluginRegistry, SessionCallback};
pub use profile::{DEFAULT_NODE_VERSION, NodeProfile};
pub use protocol::{CommandOutcome, MuninProtocol, ProtocolHandler};
pub use session::{Session, SessionEnd};

pub use munin_transport_traits::{
    CancellationToken, Client, Listener, ListenerState, TransportError, TransportMetrics,
    TransportResult, TransportType,
};
