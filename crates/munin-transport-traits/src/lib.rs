//! # Munin Transport Traits
//!
//! Core transport traits and types for the munin node.
//! This crate provides the abstractions that decouple the protocol engine and
//! the node orchestrator from any concrete socket implementation.
//!
//! ## Overview
//!
//! This crate defines:
//! - **Traits**: [`Listener`], [`Client`]
//! - **Types**: [`TransportType`], [`ListenerState`]
//! - **Errors**: [`TransportError`], [`TransportResult`]
//! - **Metrics**: [`TransportMetrics`], [`AtomicMetrics`]
//!
//! ## Usage
//!
//! Transport implementations depend on this crate and implement both traits:
//!
//! ```rust,ignore
//! use munin_transport_traits::{Client, Listener, TransportResult};
//! use async_trait::async_trait;
//!
//! struct MyListener { /* ... */ }
//!
//! #[async_trait]
//! impl Listener for MyListener {
//!     fn transport_type(&self) -> TransportType { /* ... */ }
//!     // ... other trait methods
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

mod error;
mod metrics;
mod traits;
mod types;

// Re-export all public items
pub use error::{TransportError, TransportResult};
pub use metrics::{AtomicMetrics, TransportMetrics};
pub use traits::{Client, Listener};
pub use types::{ListenerState, TransportType};

/// Re-exported so transport implementations and callers share one token type.
pub use tokio_util::sync::CancellationToken;
