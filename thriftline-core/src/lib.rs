//! Core abstractions for the Thriftline client layer.
//!
//! This crate owns everything that happens before a byte hits the wire:
//! the [`config::ClientConfig`] settings struct (file loading plus the
//! `THRIFTCLIENT_*` environment overlay) and the configuration resolver
//! that turns a URL-shaped transport description into a concrete
//! [`resolve::Resolved`] plan. All errors produced here are
//! [`ConfigError`]s and fire at construction time, never at first request.

pub mod config;
pub mod error;
pub mod resolve;

pub use config::ClientConfig;
pub use error::ConfigError;
pub use resolve::{
    resolve, ConnectionPolicy, ProtocolKind, Resolved, SslOptions, TransportKind, TransportSpec,
};
