// ============================================
// File: crates/riffle-portal/src/services/avatar.rs
// ============================================
//! # Avatar
//!
//! ## Creation Reason
//! An avatar is this side's live session object for one authenticated
//! peer. The peer invokes it through its `CapabilityProxy`; the host
//! finds it again through `Portal::connection_for_name`.
//!
//! ## Main Functionality
//! - `AvatarHandler`: Application behaviour plugged in by a realm factory
//! - `Avatar`: Identity, lifecycle state, remote handle, owning realm
//!
//! ## Lifecycle
//! ```text
//! ┌─────────┐ attach ┌──────────┐ initialize ok ┌─────────────┐
//! │ Created │ ─────► │ Attached │ ────────────► │ Initialized │
//! └────┬────┘        └────┬─────┘               └──────┬──────┘
//!      │                  │ initialize failed          │ logout /
//!      │                  ▼                            │ disconnect
//!      │            ┌──────────┐ ◄─────────────────────┘
//!      └──────────► │ Detached │   (absorbing)
//!                   └──────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Only `Realm` moves an avatar forward; `detach` may run from anywhere
//! - `detach` releases the peer's avatar so the peer tears its side down
//!   too; after a disconnect that release is a no-op
//!
//! ## Last Modified
//! v0.1.0 - Initial avatar implementation

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use riffle_common::Identity;
use riffle_core::{RemoteFault, Value};

use crate::error::{PortalError, Result};
use crate::rpc::{CallContext, CapabilityProxy, Referenceable, RemoteRef};
use crate::services::realm::Realm;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

// ============================================
// AvatarState
// ============================================

/// Lifecycle state of an avatar. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AvatarState {
    /// Built by the realm factory, not yet bound to a peer.
    Created,
    /// Bound to the peer's remote avatar.
    Attached,
    /// `initialize` succeeded; the avatar is (or was) registered.
    Initialized,
    /// Torn down. Terminal.
    Detached,
}

// ============================================
// AvatarHandler
// ============================================

/// Application behaviour behind an avatar.
///
/// One handler instance is created per avatar by the realm's factory.
///
/// # Example
/// ```ignore
/// struct Device;
///
/// #[async_trait]
/// impl AvatarHandler for Device {
///     async fn invoke(&self, _: &Avatar, method: &str, _: Vec<Value>)
///         -> Result<Value, RemoteFault>
///     {
///         match method {
///             "ping" => Ok("pong".into()),
///             other => Err(RemoteFault::no_such_method(other)),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait AvatarHandler: Send + Sync {
    /// Called once the avatar holds the peer's remote handle.
    fn attached(&self, _avatar: &Avatar) {}

    /// Runs before the avatar becomes visible in its realm. May call the
    /// peer through `avatar.peer()`.
    ///
    /// # Errors
    /// Any error aborts the login; nothing is registered.
    async fn initialize(&self, _avatar: &Avatar) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handles a call from the peer.
    ///
    /// # Errors
    /// The fault is returned to the peer's `CapabilityProxy::call`.
    async fn invoke(
        &self,
        avatar: &Avatar,
        method: &str,
        args: Vec<Value>,
    ) -> std::result::Result<Value, RemoteFault>;

    /// Called once when the avatar is detached.
    fn detached(&self, _avatar: &Avatar) {}
}

// ============================================
// Avatar
// ============================================

/// Live session object for one authenticated peer.
pub struct Avatar {
    serial: u64,
    identity: Identity,
    realm: Weak<Realm>,
    remote: RwLock<Option<RemoteRef>>,
    state: Mutex<AvatarState>,
    handler: Arc<dyn AvatarHandler>,
    created_at: Instant,
}

impl Avatar {
    pub(crate) fn new(identity: Identity, realm: Weak<Realm>, handler: Arc<dyn AvatarHandler>) -> Self {
        Self {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            identity,
            realm,
            remote: RwLock::new(None),
            state: Mutex::new(AvatarState::Created),
            handler,
            created_at: Instant::now(),
        }
    }

    // ========================================
    // Accessors
    // ========================================

    /// Identity of the peer this avatar represents.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Process-unique serial; distinguishes two sessions of one identity.
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> AvatarState {
        *self.state.lock()
    }

    /// Returns `true` once detached.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.state() == AvatarState::Detached
    }

    /// Owning realm, while it exists.
    #[must_use]
    pub fn realm(&self) -> Option<Arc<Realm>> {
        self.realm.upgrade()
    }

    /// Time since construction.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Proxy to the peer's avatar, while attached.
    #[must_use]
    pub fn peer(&self) -> Option<CapabilityProxy> {
        self.remote.read().clone().map(CapabilityProxy::new)
    }

    /// Calls `method` on the peer's avatar.
    ///
    /// # Errors
    /// `ConnectionClosed` when not attached, otherwise as
    /// [`CapabilityProxy::call`].
    pub async fn call_peer(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let peer = self.peer().ok_or(PortalError::ConnectionClosed)?;
        peer.call(method, args).await
    }

    // ========================================
    // Lifecycle
    // ========================================

    pub(crate) fn attach(&self, remote: RemoteRef) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != AvatarState::Created {
                return Err(PortalError::initialization(
                    &self.identity,
                    format!("cannot attach avatar in state {:?}", *state),
                ));
            }
            *self.remote.write() = Some(remote);
            *state = AvatarState::Attached;
        }
        debug!(identity = %self.identity, serial = self.serial, "Avatar attached");
        self.handler.attached(self);
        Ok(())
    }

    pub(crate) async fn initialize(&self) -> anyhow::Result<()> {
        self.handler.initialize(self).await?;

        let mut state = self.state.lock();
        match *state {
            AvatarState::Attached => {
                *state = AvatarState::Initialized;
                Ok(())
            }
            other => anyhow::bail!("avatar left Attached during initialize (now {other:?})"),
        }
    }

    /// Tears the avatar down. Returns `false` if it already was.
    pub(crate) fn detach(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state == AvatarState::Detached {
                return false;
            }
            *state = AvatarState::Detached;
        }

        if let Some(remote) = self.remote.write().take() {
            if remote.is_connected() {
                let _ = remote.release();
            }
        }
        debug!(identity = %self.identity, serial = self.serial, "Avatar detached");
        self.handler.detached(self);
        true
    }
}

#[async_trait]
impl Referenceable for Avatar {
    async fn invoke(
        &self,
        _ctx: &CallContext,
        method: &str,
        args: Vec<Value>,
    ) -> std::result::Result<Value, RemoteFault> {
        if self.is_detached() {
            return Err(RemoteFault::invalid_state(format!(
                "avatar for '{}' is detached",
                self.identity
            )));
        }
        self.handler.invoke(self, method, args).await
    }
}

impl fmt::Debug for Avatar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Avatar")
            .field("serial", &self.serial)
            .field("identity", &self.identity)
            .field("state", &self.state())
            .field("attached", &self.remote.read().is_some())
            .field("age", &self.created_at.elapsed())
            .finish()
    }
}

// ============================================
// Tests
// ============================================
