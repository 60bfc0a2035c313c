// ============================================
// File: crates/riffle-portal/src/services/logout.rs
// ============================================
//! # Logout Handle
//!
//! ## Creation Reason
//! A session ends either because the peer logs out or because the
//! transport drops, and both can happen at once. `LogoutHandle` turns
//! the two triggers into exactly one cleanup.
//!
//! ## ⚠️ Important Note for Next Developer
//! - The fired flag is shared by every clone; hand clones to each trigger
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::services::avatar::Avatar;

/// Single-fire cleanup bound to one avatar.
#[derive(Clone)]
pub struct LogoutHandle {
    inner: Arc<LogoutInner>,
}

struct LogoutInner {
    fired: AtomicBool,
    avatar: Arc<Avatar>,
}

impl LogoutHandle {
    pub(crate) fn new(avatar: Arc<Avatar>) -> Self {
        Self {
            inner: Arc::new(LogoutInner {
                fired: AtomicBool::new(false),
                avatar,
            }),
        }
    }

    /// Removes the avatar from its realm and detaches it.
    ///
    /// Returns `true` for the call that did the work, `false` for every
    /// later call on this handle or any clone.
    pub fn logout(&self) -> bool {
        if self.inner.fired.swap(true, Ordering::SeqCst) {
            return false;
        }

        let avatar = &self.inner.avatar;
        if let Some(realm) = avatar.realm() {
            realm.connection_closed(avatar);
        }
        avatar.detach();

        info!(
            identity = %avatar.identity(),
            serial = avatar.serial(),
            session_secs = avatar.age().as_secs(),
            "Session ended"
        );
        true
    }

    /// Returns `true` once `logout` has run.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// The avatar this handle cleans up.
    #[must_use]
    pub fn avatar(&self) -> &Arc<Avatar> {
        &self.inner.avatar
    }
}

impl fmt::Debug for LogoutHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogoutHandle")
            .field("identity", self.inner.avatar.identity())
            .field("serial", &self.inner.avatar.serial())
            .field("fired", &self.is_fired())
            .finish()
    }
}

// ============================================
// Tests
// ============================================
