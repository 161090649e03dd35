//! The client facade and its connection-lifecycle helpers.

use std::ops::{Deref, DerefMut};

use thriftline_core::{ClientConfig, ConfigError, ConnectionPolicy, Resolved};

use crate::channel::Channel;
use crate::stack::{self, ClientInputProtocol, ClientOutputProtocol};

/// One configured Thrift client plus the channel it talks through.
///
/// A facade is constructed once at application setup and lives for the
/// process: the channel is never recreated, only opened and closed
/// according to the connection policy. How a unit of work gets a live
/// connection depends on the `always_connect` flag:
///
/// - always-connect (the default): run the work through [`Self::call`],
///   which opens the channel before and closes it after, on every path;
/// - manual: open/close [`Self::transport`] yourself, or use
///   [`Self::connect`] for a scope-bound connection, or wrap the work with
///   [`autoconnect`].
pub struct ThriftFacade<C> {
    client: C,
    transport: Channel,
    policy: ConnectionPolicy,
}

impl<C> ThriftFacade<C> {
    /// Resolves `config` and constructs the facade in one step.
    pub fn from_config<F>(config: &ClientConfig, make_client: F) -> Result<Self, ConfigError>
    where
        F: FnOnce(ClientInputProtocol, ClientOutputProtocol) -> C,
    {
        let resolved = Resolved::from_config(config)?;
        Self::new(&resolved, make_client)
    }

    /// Constructs the facade from an already-resolved plan.
    ///
    /// `make_client` is the generated-client constructor, typically
    /// `|i, o| MyServiceSyncClient::new(i, o)`.
    pub fn new<F>(resolved: &Resolved, make_client: F) -> Result<Self, ConfigError>
    where
        F: FnOnce(ClientInputProtocol, ClientOutputProtocol) -> C,
    {
        let transport = Channel::from_resolved(&resolved.transport, &resolved.ssl)?;
        let read = stack::read_transport(transport.clone(), &resolved.policy);
        let write = stack::write_transport(transport.clone(), &resolved.policy);
        let (i_prot, o_prot) = stack::protocols(resolved.protocol, read, write)?;
        tracing::debug!(
            transport = ?resolved.transport,
            protocol = ?resolved.protocol,
            "thrift facade constructed"
        );
        Ok(ThriftFacade {
            client: make_client(i_prot, o_prot),
            transport,
            policy: resolved.policy,
        })
    }

    /// The call-ready generated client.
    pub fn client(&mut self) -> &mut C {
        &mut self.client
    }

    /// A handle to the underlying channel for manual `open()`/`close()`.
    pub fn transport(&self) -> Channel {
        self.transport.clone()
    }

    pub fn policy(&self) -> ConnectionPolicy {
        self.policy
    }

    /// Runs one unit of work against the client.
    ///
    /// In always-connect mode the channel is opened before the work and
    /// closed afterwards on every exit path; close failures are logged and
    /// never mask the work's own result. In manual mode the work runs
    /// against whatever connection state the caller has set up, and calls
    /// on a closed channel fail with a transport error.
    pub fn call<F, R, E>(&mut self, work: F) -> Result<R, E>
    where
        F: FnOnce(&mut C) -> Result<R, E>,
        E: From<thrift::Error>,
    {
        if !self.policy.always_connect {
            return work(&mut self.client);
        }
        self.transport.open()?;
        let result = work(&mut self.client);
        if let Err(e) = self.transport.close() {
            tracing::debug!(error = %e, "closing channel after call failed");
        }
        result
    }

    /// Opens the channel and returns a guard that closes it when dropped.
    ///
    /// The guard dereferences to the client, so a scope like
    /// `facade.connect()?.ping()` gets a live connection for exactly the
    /// duration of the scope, released on success, error and unwind alike.
    pub fn connect(&mut self) -> thrift::Result<ConnectionGuard<'_, C>> {
        self.transport.open()?;
        Ok(ConnectionGuard { facade: self })
    }
}

/// Scope-bound connection: open on creation, closed on drop.
pub struct ConnectionGuard<'a, C> {
    facade: &'a mut ThriftFacade<C>,
}

impl<C> ConnectionGuard<'_, C> {
    pub fn client(&mut self) -> &mut C {
        &mut self.facade.client
    }
}

impl<C> Deref for ConnectionGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.facade.client
    }
}

impl<C> DerefMut for ConnectionGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.facade.client
    }
}

impl<C> Drop for ConnectionGuard<'_, C> {
    fn drop(&mut self) {
        if let Err(e) = self.facade.transport.close() {
            tracing::debug!(error = %e, "closing channel on scope exit failed");
        }
    }
}

/// Wraps a unit of work with open/close bracketing.
///
/// The returned closure is the moral equivalent of decorating a request
/// handler: it acquires a connection, runs the work, and releases the
/// connection on every exit path. Under an always-connect policy it
/// delegates to [`ThriftFacade::call`], which already brackets each call,
/// so the connection is never opened twice.
pub fn autoconnect<C, F, R, E>(mut work: F) -> impl FnMut(&mut ThriftFacade<C>) -> Result<R, E>
where
    F: FnMut(&mut C) -> Result<R, E>,
    E: From<thrift::Error>,
{
    move |facade| {
        if facade.policy.always_connect {
            return facade.call(&mut work);
        }
        let mut guard = facade.connect()?;
        work(guard.client())
    }
}
