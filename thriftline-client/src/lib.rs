//! Client-side plumbing for Thriftline.
//!
//! This crate turns a resolved configuration (see `thriftline-core`) into a
//! working Thrift client: the unified [`Channel`] over tcp/tls/unix/http,
//! the buffered/zlib/framed transport stack, protocol construction, and the
//! [`ThriftFacade`] that wraps a generated client together with its
//! connection-lifecycle helpers.
//!
//! # Concurrency
//!
//! A facade owns a single stateful transport/protocol/client triple. It is
//! not designed for concurrent use: exclusive access is expressed through
//! `&mut self` receivers, and sharing one facade across threads requires
//! external synchronization by the host application. Deployments that
//! handle requests in parallel should build one facade per worker.

pub mod channel;
pub mod facade;
pub mod stack;

pub use channel::Channel;
pub use facade::{autoconnect, ConnectionGuard, ThriftFacade};
pub use stack::{ClientInputProtocol, ClientOutputProtocol};
