// ============================================
// File: crates/riffle-portal/src/rpc/proxy.rs
// ============================================
//! # Remote Handles
//!
//! ## Main Functionality
//! - `RemoteRef`: Raw (connection, object id) handle
//! - `CapabilityProxy`: What the host holds after a login; every operation
//!   on the peer's avatar goes through `call`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Dropping a handle does NOT release the remote object; call
//!   `release` / `logout` explicitly
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::fmt;

use riffle_common::{Identity, ObjectId};
use riffle_core::Value;

use crate::error::Result;
use crate::rpc::connection::Connection;

// ============================================
// RemoteRef
// ============================================

/// Handle to one object exported by the peer.
#[derive(Clone)]
pub struct RemoteRef {
    connection: Connection,
    target: ObjectId,
}

impl RemoteRef {
    pub(crate) fn new(connection: Connection, target: ObjectId) -> Self {
        Self { connection, target }
    }

    /// Object id in the peer's export table.
    #[must_use]
    pub fn target(&self) -> ObjectId {
        self.target
    }

    /// Connection carrying this handle.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Returns `true` while the connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.connection.is_closed()
    }

    /// Invokes `method` on the remote object.
    ///
    /// # Errors
    /// See [`Connection::call`].
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.connection.call(self.target, method, args).await
    }

    /// Drops the remote object on the peer's side.
    ///
    /// # Errors
    /// Returns `ConnectionClosed` if the connection is gone.
    pub fn release(&self) -> Result<()> {
        self.connection.release(self.target)
    }
}

impl fmt::Debug for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteRef")
            .field("connection", &self.connection.id())
            .field("peer", self.connection.peer_identity())
            .field("target", &self.target)
            .finish()
    }
}

// ============================================
// CapabilityProxy
// ============================================

/// Proxy for the peer's avatar.
///
/// Clones share the same remote handle. Calls are independent; no
/// ordering holds between two calls issued concurrently.
///
/// # Example
/// ```ignore
/// let proxy = portal.connect(peer_addr, &material).await?;
/// let pong = proxy.call("ping", vec![]).await?;
/// proxy.logout()?;
/// ```
#[derive(Debug, Clone)]
pub struct CapabilityProxy {
    remote: RemoteRef,
}

impl CapabilityProxy {
    /// Wraps a handle to the peer's avatar.
    #[must_use]
    pub fn new(remote: RemoteRef) -> Self {
        Self { remote }
    }

    /// Invokes `name` on the peer's avatar.
    ///
    /// # Errors
    /// - `RemoteCall` with the fault the peer reported
    /// - `ConnectionClosed` if the connection dropped before the answer
    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        self.remote.call(name, args).await
    }

    /// Explicit logout: the peer drops our session with it.
    ///
    /// # Errors
    /// Returns `ConnectionClosed` if the connection is already gone, in
    /// which case the peer has cleaned up on disconnect.
    pub fn logout(&self) -> Result<()> {
        self.remote.release()
    }

    /// Verified identity of the peer.
    #[must_use]
    pub fn peer_identity(&self) -> &Identity {
        self.remote.connection().peer_identity()
    }

    /// Returns `true` while the underlying connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.remote.is_connected()
    }

    /// Completes when the underlying connection closes.
    pub async fn closed(&self) {
        self.remote.connection().closed().await;
    }

    /// The raw handle.
    #[must_use]
    pub fn remote(&self) -> &RemoteRef {
        &self.remote
    }
}

// ============================================
// Tests
// ============================================
