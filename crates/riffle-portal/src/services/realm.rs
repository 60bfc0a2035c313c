// ============================================
// File: crates/riffle-portal/src/services/realm.rs
// ============================================
//! # Realm
//!
//! ## Creation Reason
//! Groups the peers a portal routes to one avatar type. A realm builds
//! avatars with its factory and tracks which of them are live.
//!
//! ## Main Functionality
//! - `request_partial_avatar`: Construct only
//! - `request_avatar` / `register_avatar`: Attach, initialize, register
//! - `connection_closed`: Remove a session from the live set
//! - `connection_for_name`: Look up the live session of an identity
//!
//! ## Registration Flow
//! ```text
//! factory(identity) ──► Avatar(Created)
//!                          │ attach(remote)
//!                          ▼
//!                       Avatar(Attached)
//!                          │ initialize (bounded)
//!              ┌───────────┴───────────┐
//!              ▼ ok                    ▼ err / timeout
//!   insert into live set          detach, nothing kept
//!   return (avatar, LogoutHandle)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The live set is keyed by identity; a second session for the same
//!   identity replaces the first in the set
//! - `connection_closed` compares serials so a stale session cannot evict
//!   its replacement
//!
//! ## Last Modified
//! v0.1.0 - Initial realm implementation

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use riffle_common::Identity;

use crate::error::{PortalError, Result};
use crate::rpc::RemoteRef;
use crate::services::avatar::{Avatar, AvatarHandler};
use crate::services::logout::LogoutHandle;

/// Builds the handler behind each new avatar of a realm.
pub type AvatarFactory = Arc<dyn Fn(&Identity) -> Arc<dyn AvatarHandler> + Send + Sync>;

// ============================================
// Realm
// ============================================

/// Avatar factory plus the set of live avatars it produced.
pub struct Realm {
    name: String,
    factory: AvatarFactory,
    initialize_timeout: Duration,
    connections: DashMap<Identity, Arc<Avatar>>,
    weak_self: Weak<Realm>,
}

impl Realm {
    /// Creates a realm.
    ///
    /// `initialize_timeout` bounds every avatar's `initialize` hook.
    pub fn new(name: impl Into<String>, factory: AvatarFactory, initialize_timeout: Duration) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|weak_self| Self {
            name,
            factory,
            initialize_timeout,
            connections: DashMap::new(),
            weak_self: weak_self.clone(),
        })
    }

    /// Realm name, for logging.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    // ========================================
    // Avatar Construction
    // ========================================

    /// Builds an avatar for `identity` without attaching or registering it.
    #[must_use]
    pub fn request_partial_avatar(&self, identity: &Identity) -> Arc<Avatar> {
        let handler = (self.factory)(identity);
        let avatar = Arc::new(Avatar::new(identity.clone(), self.weak_self.clone(), handler));
        debug!(realm = %self.name, identity = %identity, serial = avatar.serial(), "Avatar created");
        avatar
    }

    /// Builds, attaches, initializes and registers an avatar.
    ///
    /// # Errors
    /// Returns `Initialization` if `initialize` fails or times out; the
    /// avatar is then detached and never registered.
    pub async fn request_avatar(
        &self,
        identity: &Identity,
        remote: RemoteRef,
    ) -> Result<(Arc<Avatar>, LogoutHandle)> {
        let avatar = self.request_partial_avatar(identity);
        self.register_avatar(avatar, remote).await
    }

    /// Attaches, initializes and registers an avatar built by
    /// `request_partial_avatar`.
    ///
    /// # Errors
    /// See [`Realm::request_avatar`].
    pub async fn register_avatar(
        &self,
        avatar: Arc<Avatar>,
        remote: RemoteRef,
    ) -> Result<(Arc<Avatar>, LogoutHandle)> {
        let identity = avatar.identity().clone();

        if let Err(e) = avatar.attach(remote) {
            avatar.detach();
            return Err(e);
        }

        let failure = match tokio::time::timeout(self.initialize_timeout, avatar.initialize()).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(_) => Some(format!(
                "initialize timed out after {}ms",
                self.initialize_timeout.as_millis()
            )),
        };
        if let Some(reason) = failure {
            warn!(realm = %self.name, identity = %identity, reason = %reason, "Avatar initialization failed");
            avatar.detach();
            return Err(PortalError::initialization(&identity, reason));
        }

        if let Some(previous) = self.connections.insert(identity.clone(), Arc::clone(&avatar)) {
            warn!(
                realm = %self.name,
                identity = %identity,
                previous = previous.serial(),
                serial = avatar.serial(),
                "Replacing live session"
            );
        }
        info!(realm = %self.name, identity = %identity, serial = avatar.serial(), "Session created");

        let logout = LogoutHandle::new(Arc::clone(&avatar));
        Ok((avatar, logout))
    }

    // ========================================
    // Live Set
    // ========================================

    /// Removes `avatar` from the live set. No-op if it is not the entry
    /// registered for its identity.
    pub fn connection_closed(&self, avatar: &Avatar) {
        let removed = self
            .connections
            .remove_if(avatar.identity(), |_, live| live.serial() == avatar.serial())
            .is_some();
        if removed {
            info!(realm = %self.name, identity = %avatar.identity(), serial = avatar.serial(), "Session removed");
        }
    }

    /// Live avatar for `identity`, if any.
    #[must_use]
    pub fn connection_for_name(&self, identity: &Identity) -> Option<Arc<Avatar>> {
        self.connections.get(identity).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of all live avatars.
    #[must_use]
    pub fn connections(&self) -> Vec<Arc<Avatar>> {
        self.connections.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Number of live avatars.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl fmt::Debug for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Realm")
            .field("name", &self.name)
            .field("connections", &self.connections.len())
            .field("initialize_timeout", &self.initialize_timeout)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
