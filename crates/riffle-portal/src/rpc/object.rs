// ============================================
// File: crates/riffle-portal/src/rpc/object.rs
// ============================================
//! # Exported Objects
//!
//! ## Main Functionality
//! - `Referenceable`: Anything that can sit in a connection's export table
//! - `CallContext`: What an object learns about the caller
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use async_trait::async_trait;

use riffle_common::{Identity, ObjectId};
use riffle_core::{RemoteFault, Value};

use crate::rpc::connection::Connection;
use crate::rpc::proxy::RemoteRef;

/// An object the peer can invoke methods on.
#[async_trait]
pub trait Referenceable: Send + Sync {
    /// Handles one inbound call.
    ///
    /// # Errors
    /// The returned fault is sent back to the caller verbatim.
    async fn invoke(
        &self,
        ctx: &CallContext,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, RemoteFault>;
}

/// Caller information handed to `Referenceable::invoke`.
#[derive(Debug, Clone)]
pub struct CallContext {
    connection: Connection,
}

impl CallContext {
    pub(crate) fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Connection the call arrived on.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Verified identity of the caller.
    #[must_use]
    pub fn peer_identity(&self) -> &Identity {
        self.connection.peer_identity()
    }

    /// Resolves a `Value::Remote` argument into a callable handle.
    ///
    /// # Errors
    /// Returns an `InvalidArguments` fault if `value` is not a remote handle.
    pub fn remote_arg(&self, value: &Value) -> Result<RemoteRef, RemoteFault> {
        value
            .as_remote()
            .map(|id| self.connection.remote_ref(id))
            .ok_or_else(|| {
                RemoteFault::invalid_arguments(format!(
                    "expected remote, got {}",
                    value.type_name()
                ))
            })
    }

    /// Handle to an object exported by the caller.
    #[must_use]
    pub fn remote_ref(&self, id: ObjectId) -> RemoteRef {
        self.connection.remote_ref(id)
    }
}
